//! Feed payloads and the decoder that reads them.
//!
//! A feed is an ephemeral snapshot of products and their store offers. It is
//! decoded once per ingestion run and discarded. The decoder tolerates a
//! source that is mid-write by re-reading it a few times while the content
//! is empty or syntactically broken.

use std::{
  future::Future,
  io,
  path::{Path, PathBuf},
  str::FromStr,
  time::Duration,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::{DecodeError, ValueError, catalog::DEFAULT_CONDITION};

/// Read attempts before a transient failure becomes final.
pub const DEFAULT_ATTEMPTS: u32 = 4;

/// Pause between read attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

// ─── Payload ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
  pub source:   String,
  pub products: Vec<FeedProduct>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedProduct {
  pub name:        String,
  pub brand:       String,
  #[serde(default)]
  pub category:    String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub image_url:   String,
  #[serde(default)]
  pub offers:      Vec<FeedOffer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedOffer {
  pub store_name: String,
  /// Kept as raw JSON numbers so an unrepresentable value only fails its
  /// own offer; see [`FeedOffer::decimal_price`].
  pub price:      Number,
  #[serde(default)]
  pub rating:     Option<Number>,
  pub url:        String,
  #[serde(default = "default_condition")]
  pub condition:  String,
}

fn default_condition() -> String { DEFAULT_CONDITION.to_owned() }

impl FeedOffer {
  pub fn decimal_price(&self) -> Result<Decimal, ValueError> { to_decimal("price", &self.price) }

  pub fn decimal_rating(&self) -> Result<Option<Decimal>, ValueError> {
    self.rating.as_ref().map(|r| to_decimal("rating", r)).transpose()
  }
}

/// Exact decimal value of a JSON number, accepting exponent notation.
fn to_decimal(field: &'static str, value: &Number) -> Result<Decimal, ValueError> {
  let text = value.to_string();
  Decimal::from_str(&text)
    .or_else(|_| Decimal::from_scientific(&text))
    .map_err(|_| ValueError { field, value: value.clone() })
}

impl Feed {
  pub fn offer_count(&self) -> usize {
    self.products.iter().map(|p| p.offers.len()).sum()
  }
}

// ─── Single-shot decode ──────────────────────────────────────────────────────

/// Classify and parse one payload.
///
/// Whitespace-only input is [`DecodeError::Empty`], invalid JSON is
/// [`DecodeError::Malformed`], and JSON of the wrong shape is
/// [`DecodeError::SchemaMismatch`].
pub fn decode(bytes: &[u8]) -> Result<Feed, DecodeError> {
  let trimmed = bytes.trim_ascii();
  if trimmed.is_empty() {
    return Err(DecodeError::Empty);
  }

  let value: serde_json::Value =
    serde_json::from_slice(trimmed).map_err(DecodeError::Malformed)?;

  serde_json::from_value(value).map_err(DecodeError::SchemaMismatch)
}

// ─── Sources ─────────────────────────────────────────────────────────────────

/// Somewhere a raw feed payload can be (re-)read from.
pub trait FeedSource: Send + Sync {
  /// Human-readable location, used in logs.
  fn describe(&self) -> String;

  /// Read the full payload.
  fn read(&self) -> impl Future<Output = io::Result<Vec<u8>>> + Send + '_;
}

/// A feed file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileFeed {
  path: PathBuf,
}

impl FileFeed {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }
}

impl FeedSource for FileFeed {
  fn describe(&self) -> String { self.path.display().to_string() }

  async fn read(&self) -> io::Result<Vec<u8>> { tokio::fs::read(&self.path).await }
}

/// An in-memory payload, e.g. an uploaded document.
#[derive(Debug, Clone)]
pub struct BytesFeed {
  label: String,
  bytes: Vec<u8>,
}

impl BytesFeed {
  pub fn new(label: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
    Self { label: label.into(), bytes: bytes.into() }
  }
}

impl FeedSource for BytesFeed {
  fn describe(&self) -> String { self.label.clone() }

  async fn read(&self) -> io::Result<Vec<u8>> { Ok(self.bytes.clone()) }
}

// ─── Retrying decoder ────────────────────────────────────────────────────────

/// Reads and decodes a [`FeedSource`], retrying transient failures.
#[derive(Debug, Clone, Copy)]
pub struct FeedDecoder {
  attempts: u32,
  backoff:  Duration,
}

impl Default for FeedDecoder {
  fn default() -> Self { Self { attempts: DEFAULT_ATTEMPTS, backoff: DEFAULT_BACKOFF } }
}

impl FeedDecoder {
  /// `attempts` is clamped to at least one.
  pub fn new(attempts: u32, backoff: Duration) -> Self {
    Self { attempts: attempts.max(1), backoff }
  }

  /// Read `source` until it decodes, a non-transient error occurs, or the
  /// attempt budget runs out. Each attempt re-reads the whole payload.
  pub async fn load<F: FeedSource>(&self, source: &F) -> Result<Feed, DecodeError> {
    let mut attempt = 1;
    loop {
      let bytes = source.read().await?;
      match decode(&bytes) {
        Ok(feed) => return Ok(feed),
        Err(err) if err.is_transient() && attempt < self.attempts => {
          tracing::debug!(
            source = %source.describe(),
            attempt,
            reason = err.reason(),
            "feed not ready, retrying"
          );
          attempt += 1;
          tokio::time::sleep(self.backoff).await;
        }
        Err(err) => return Err(err),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  };

  use rust_decimal_macros::dec;

  use super::*;

  const SAMPLE: &str = r#"{
    "source": "demo",
    "products": [
      {
        "name": "Pixel 9",
        "brand": "Google",
        "category": "phones",
        "description": "",
        "imageUrl": "https://img.example/pixel9.png",
        "offers": [
          { "storeName": "Amazon", "price": 799.99, "rating": 4.6, "url": "https://a.example/p9" },
          { "storeName": "Best Buy", "price": 779, "rating": null, "url": "https://b.example/p9", "condition": "Refurbished" }
        ]
      },
      { "name": "XPS 13", "brand": "Dell" }
    ]
  }"#;

  /// Yields the queued payloads in order, repeating the last one.
  struct Scripted {
    payloads: Mutex<Vec<Vec<u8>>>,
    reads:    AtomicUsize,
  }

  impl Scripted {
    fn new(payloads: &[&str]) -> Self {
      Self {
        payloads: Mutex::new(payloads.iter().rev().map(|p| p.as_bytes().to_vec()).collect()),
        reads:    AtomicUsize::new(0),
      }
    }
  }

  impl FeedSource for Scripted {
    fn describe(&self) -> String { "scripted".into() }

    async fn read(&self) -> io::Result<Vec<u8>> {
      self.reads.fetch_add(1, Ordering::SeqCst);
      let mut queue = self.payloads.lock().unwrap();
      if queue.len() > 1 {
        Ok(queue.pop().unwrap())
      } else {
        Ok(queue.last().cloned().unwrap_or_default())
      }
    }
  }

  fn fast() -> FeedDecoder { FeedDecoder::new(DEFAULT_ATTEMPTS, Duration::from_millis(1)) }

  #[test]
  fn decodes_full_payload() {
    let feed = decode(SAMPLE.as_bytes()).unwrap();
    assert_eq!(feed.source, "demo");
    assert_eq!(feed.products.len(), 2);
    assert_eq!(feed.offer_count(), 2);

    let pixel = &feed.products[0];
    assert_eq!(pixel.image_url, "https://img.example/pixel9.png");
    assert_eq!(pixel.offers[0].decimal_price().unwrap(), dec!(799.99));
    assert_eq!(pixel.offers[0].decimal_rating().unwrap(), Some(dec!(4.6)));
    assert_eq!(pixel.offers[0].condition, "New");
    assert_eq!(pixel.offers[1].decimal_rating().unwrap(), None);
    assert_eq!(pixel.offers[1].condition, "Refurbished");

    let xps = &feed.products[1];
    assert_eq!(xps.category, "");
    assert!(xps.offers.is_empty());
  }

  #[test]
  fn oversized_numbers_decode_but_do_not_convert() {
    let feed = decode(
      br#"{"source":"d","products":[{"name":"n","brand":"b","offers":[
        {"storeName":"s","price":1e30,"url":"u"},
        {"storeName":"s","price":2.5e2,"rating":4,"url":"v"}
      ]}]}"#,
    )
    .unwrap();
    let offers = &feed.products[0].offers;

    let err = offers[0].decimal_price().unwrap_err();
    assert_eq!(err.field, "price");
    assert_eq!(err.to_string(), "price 1e30 cannot be represented as a decimal");

    assert_eq!(offers[1].decimal_price().unwrap(), dec!(250));
    assert_eq!(offers[1].decimal_rating().unwrap(), Some(dec!(4)));
  }

  #[test]
  fn whitespace_is_empty() {
    assert!(matches!(decode(b""), Err(DecodeError::Empty)));
    assert!(matches!(decode(b" \n\t "), Err(DecodeError::Empty)));
  }

  #[test]
  fn broken_json_is_malformed() {
    let err = decode(br#"{"source": "demo", "products": ["#).unwrap_err();
    assert!(matches!(err, DecodeError::Malformed(_)));
    assert_eq!(err.reason(), "malformed");
  }

  #[test]
  fn missing_fields_are_schema_mismatch() {
    let no_products = decode(br#"{"source": "demo"}"#).unwrap_err();
    assert_eq!(no_products.reason(), "schema-mismatch");

    let no_price = decode(
      br#"{"source":"d","products":[{"name":"n","brand":"b","offers":[{"storeName":"s","url":"u"}]}]}"#,
    )
    .unwrap_err();
    assert_eq!(no_price.reason(), "schema-mismatch");

    let wrong_type = decode(br#"[1, 2, 3]"#).unwrap_err();
    assert_eq!(wrong_type.reason(), "schema-mismatch");
  }

  #[tokio::test]
  async fn load_retries_until_payload_is_complete() {
    let source = Scripted::new(&["", r#"{"source": "demo", "prod"#, SAMPLE]);
    let feed = fast().load(&source).await.unwrap();
    assert_eq!(feed.source, "demo");
    assert_eq!(source.reads.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn load_gives_up_after_attempt_budget() {
    let source = Scripted::new(&["   "]);
    let err = fast().load(&source).await.unwrap_err();
    assert!(matches!(err, DecodeError::Empty));
    assert_eq!(source.reads.load(Ordering::SeqCst), DEFAULT_ATTEMPTS as usize);
  }

  #[tokio::test]
  async fn load_does_not_retry_schema_mismatch() {
    let source = Scripted::new(&[r#"{"products": []}"#]);
    let err = fast().load(&source).await.unwrap_err();
    assert_eq!(err.reason(), "schema-mismatch");
    assert_eq!(source.reads.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn load_reports_unreadable_file() {
    let source = FileFeed::new("/nonexistent/comparehub/feed.json");
    let err = fast().load(&source).await.unwrap_err();
    assert!(matches!(err, DecodeError::Unreadable(_)));
  }
}
