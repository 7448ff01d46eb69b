//! Catalog entities: products, stores, offers and product specs.
//!
//! Products and stores are keyed by natural business identity and are only
//! ever inserted or updated. Offers are the only rows whose activeness
//! changes over time, and that is managed by the reconciler.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type ProductId = i64;
pub type StoreId = i64;
pub type OfferId = i64;

// ─── Products ────────────────────────────────────────────────────────────────

/// A canonical product. Identity is the `(name, brand)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
  pub product_id:  ProductId,
  pub name:        String,
  pub brand:       String,
  /// Always a normalized label, see [`crate::category::normalize`].
  pub category:    String,
  pub description: String,
  pub image_url:   String,
}

/// Input for an insert-or-update of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
  pub name:        String,
  pub brand:       String,
  pub category:    String,
  pub description: String,
  pub image_url:   String,
}

// ─── Stores ──────────────────────────────────────────────────────────────────

/// A retailer. `name` is stored as first seen; matching uses `match_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
  pub store_id:  StoreId,
  pub name:      String,
  pub match_key: String,
}

/// Lower-cased store name with all whitespace removed.
///
/// `"Best Buy"`, `"BestBuy"` and `" bestbuy "` share one key.
pub fn store_match_key(name: &str) -> String {
  name
    .chars()
    .filter(|c| !c.is_whitespace())
    .flat_map(char::to_lowercase)
    .collect()
}

// ─── Offers ──────────────────────────────────────────────────────────────────

/// Condition tag assumed when none is given.
pub const DEFAULT_CONDITION: &str = "New";

/// A priced listing of one product at one store. Identity is
/// `(product_id, store_id, url)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
  pub offer_id:   OfferId,
  pub product_id: ProductId,
  pub store_id:   StoreId,
  pub store_name: String,
  pub price:      Decimal,
  /// 0–5 scale; `None` when the store publishes no rating.
  pub rating:     Option<Decimal>,
  pub url:        String,
  pub condition:  String,
  pub active:     bool,
  pub last_seen:  DateTime<Utc>,
}

/// Input for an offer upsert. `active` and `last_seen` are set by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOffer {
  pub product_id: ProductId,
  pub store_id:   StoreId,
  pub price:      Decimal,
  pub rating:     Option<Decimal>,
  pub url:        String,
  pub condition:  String,
}

// ─── Specs ───────────────────────────────────────────────────────────────────

/// An opaque structured value attached to a product.
///
/// Mirrors JSON without exposing a dynamically typed map in the public API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecValue {
  Null,
  Bool(bool),
  Number(serde_json::Number),
  String(String),
  Array(Vec<SpecValue>),
  Object(BTreeMap<String, SpecValue>),
}

impl SpecValue {
  /// Look up a key when `self` is an object.
  pub fn get(&self, key: &str) -> Option<&SpecValue> {
    match self {
      Self::Object(map) => map.get(key),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Number(n) => n.as_i64(),
      Self::String(s) => s.trim().parse().ok(),
      _ => None,
    }
  }
}

/// The specs blob for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSpecs {
  pub product_id:   ProductId,
  pub specs:        SpecValue,
  pub last_updated: DateTime<Utc>,
}

impl ProductSpecs {
  /// Review count published in the specs, if any.
  pub fn review_count(&self) -> Option<i64> {
    self.specs.get("review_count").and_then(SpecValue::as_i64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn match_key_ignores_case_and_whitespace() {
    assert_eq!(store_match_key("Best Buy"), "bestbuy");
    assert_eq!(store_match_key("BestBuy"), "bestbuy");
    assert_eq!(store_match_key("  best\tbuy "), "bestbuy");
    assert_eq!(store_match_key("ASUS"), "asus");
  }

  #[test]
  fn spec_value_parses_nested_json() {
    let raw = r#"{"ram":"16GB","review_count":1250,"ports":["usb-c",null],"oled":true}"#;
    let specs: SpecValue = serde_json::from_str(raw).unwrap();

    assert_eq!(specs.get("ram"), Some(&SpecValue::String("16GB".into())));
    assert_eq!(specs.get("oled"), Some(&SpecValue::Bool(true)));
    assert_eq!(specs.get("review_count").and_then(SpecValue::as_i64), Some(1250));
    match specs.get("ports") {
      Some(SpecValue::Array(items)) => {
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], SpecValue::Null);
      }
      other => panic!("expected array, got {other:?}"),
    }
    assert!(specs.get("missing").is_none());
  }

  #[test]
  fn review_count_accepts_numeric_strings() {
    let specs = ProductSpecs {
      product_id:   1,
      specs:        serde_json::from_str(r#"{"review_count":" 42 "}"#).unwrap(),
      last_updated: Utc::now(),
    };
    assert_eq!(specs.review_count(), Some(42));
  }
}
