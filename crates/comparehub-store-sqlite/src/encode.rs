//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 strings in UTC (microsecond
//! precision), so they order correctly as text. Decimals are stored as
//! their canonical string form. Specs are compact JSON.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use comparehub_core::catalog::{Offer, ProductSpecs, SpecValue};
use rust_decimal::Decimal;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Decimal ─────────────────────────────────────────────────────────────────

pub fn encode_decimal(d: Decimal) -> String { d.normalize().to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s)?) }

// ─── Specs ───────────────────────────────────────────────────────────────────

pub fn encode_specs(specs: &SpecValue) -> Result<String> { Ok(serde_json::to_string(specs)?) }

pub fn decode_specs(s: &str) -> Result<SpecValue> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list for [`RawOffer`], joined with the owning store.
pub const OFFER_SELECT: &str = "
  SELECT o.offer_id, o.product_id, o.store_id, s.name,
         o.price, o.rating, o.url, o.condition, o.active, o.last_seen
  FROM offers o
  JOIN stores s ON s.store_id = o.store_id";

/// Raw values read from an `offers` row joined with `stores`.
pub struct RawOffer {
  pub offer_id:   i64,
  pub product_id: i64,
  pub store_id:   i64,
  pub store_name: String,
  pub price:      String,
  pub rating:     Option<String>,
  pub url:        String,
  pub condition:  String,
  pub active:     bool,
  pub last_seen:  String,
}

impl RawOffer {
  /// Map a row selected with [`OFFER_SELECT`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      offer_id:   row.get(0)?,
      product_id: row.get(1)?,
      store_id:   row.get(2)?,
      store_name: row.get(3)?,
      price:      row.get(4)?,
      rating:     row.get(5)?,
      url:        row.get(6)?,
      condition:  row.get(7)?,
      active:     row.get(8)?,
      last_seen:  row.get(9)?,
    })
  }

  pub fn into_offer(self) -> Result<Offer> {
    Ok(Offer {
      offer_id:   self.offer_id,
      product_id: self.product_id,
      store_id:   self.store_id,
      store_name: self.store_name,
      price:      decode_decimal(&self.price)?,
      rating:     self.rating.as_deref().map(decode_decimal).transpose()?,
      url:        self.url,
      condition:  self.condition,
      active:     self.active,
      last_seen:  decode_dt(&self.last_seen)?,
    })
  }
}

/// Raw values read from a `product_specs` row.
pub struct RawSpecs {
  pub product_id:   i64,
  pub specs_json:   String,
  pub last_updated: String,
}

impl RawSpecs {
  pub fn into_specs(self) -> Result<ProductSpecs> {
    Ok(ProductSpecs {
      product_id:   self.product_id,
      specs:        decode_specs(&self.specs_json)?,
      last_updated: decode_dt(&self.last_updated)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use rust_decimal_macros::dec;

  use super::*;

  #[test]
  fn timestamps_sort_as_text() {
    let whole = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let later = whole + chrono::Duration::milliseconds(500);

    let (a, b) = (encode_dt(whole), encode_dt(later));
    assert_eq!(a.len(), b.len());
    assert!(a < b);
    assert_eq!(decode_dt(&b).unwrap(), later);
  }

  #[test]
  fn decimals_use_canonical_form() {
    assert_eq!(encode_decimal(dec!(799.990)), "799.99");
    assert_eq!(decode_decimal("4.8").unwrap(), dec!(4.8));
    assert!(decode_decimal("cheap").is_err());
  }
}
