//! Offer filters, sort modes and paging for read paths.

use std::{collections::BTreeSet, fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  catalog::{DEFAULT_CONDITION, Offer, store_match_key},
};

/// Stores allowed when a caller does not name any.
pub const DEFAULT_ALLOWED_STORES: &[&str] = &[
  "Amazon",
  "BestBuy",
  "Walmart",
  "Apple",
  "Samsung",
  "Google",
  "OnePlus",
  "Motorola",
  "Xiaomi",
  "Lenovo",
  "ASUS",
  "Dell",
  "HP",
  "Microsoft",
  "LG",
  "Framework",
  "JBL",
  "Acer",
];

pub const DEFAULT_PAGE_SIZE: u32 = 24;

// ─── Caller-facing filter ────────────────────────────────────────────────────

/// Filter as supplied by a caller. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfferFilter {
  #[serde(default)]
  pub stores:     Vec<String>,
  pub condition:  Option<String>,
  pub min_price:  Option<Decimal>,
  pub max_price:  Option<Decimal>,
  pub min_rating: Option<Decimal>,
}

impl OfferFilter {
  /// Fill in defaults and validate bounds.
  pub fn resolve(&self) -> Result<ResolvedFilter> {
    if let (Some(min), Some(max)) = (self.min_price, self.max_price)
      && min > max
    {
      return Err(Error::Validation(format!(
        "min price {min} is greater than max price {max}"
      )));
    }
    if let Some(rating) = self.min_rating
      && (rating < Decimal::ZERO || rating > Decimal::from(5))
    {
      return Err(Error::Validation(format!(
        "min rating {rating} is outside 0..=5"
      )));
    }

    Ok(ResolvedFilter {
      stores:     resolve_stores(&self.stores),
      condition:  normalize_condition(self.condition.as_deref()),
      min_price:  self.min_price,
      max_price:  self.max_price,
      min_rating: self.min_rating,
    })
  }
}

/// Split a comma-separated store list as accepted on the command line.
pub fn parse_store_list(raw: &str) -> Vec<String> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
    .collect()
}

/// De-duplicate case-insensitively, falling back to the default allow-list.
fn resolve_stores(requested: &[String]) -> Vec<String> {
  let mut seen = BTreeSet::new();
  let stores: Vec<String> = requested
    .iter()
    .map(|s| s.trim())
    .filter(|s| !s.is_empty())
    .filter(|s| seen.insert(s.to_lowercase()))
    .map(str::to_owned)
    .collect();

  if stores.is_empty() {
    DEFAULT_ALLOWED_STORES.iter().map(|s| (*s).to_owned()).collect()
  } else {
    stores
  }
}

/// `"New"` for blank input or any casing of `new`; otherwise verbatim.
pub fn normalize_condition(raw: Option<&str>) -> String {
  match raw.map(str::trim) {
    None | Some("") => DEFAULT_CONDITION.to_owned(),
    Some(c) if c.eq_ignore_ascii_case(DEFAULT_CONDITION) => DEFAULT_CONDITION.to_owned(),
    Some(c) => c.to_owned(),
  }
}

// ─── Resolved filter ─────────────────────────────────────────────────────────

/// A filter with defaults applied. Produced by [`OfferFilter::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedFilter {
  /// Allowed store names as given (or the defaults).
  pub stores:     Vec<String>,
  pub condition:  String,
  pub min_price:  Option<Decimal>,
  pub max_price:  Option<Decimal>,
  pub min_rating: Option<Decimal>,
}

impl ResolvedFilter {
  /// Match keys of the allowed stores.
  pub fn store_keys(&self) -> BTreeSet<String> {
    self
      .stores
      .iter()
      .map(|s| store_match_key(s))
      .filter(|k| !k.is_empty())
      .collect()
  }

  /// The part of the filter a store can evaluate itself.
  pub fn scope(&self) -> OfferScope {
    OfferScope {
      condition:  self.condition.clone(),
      store_keys: self.store_keys().into_iter().collect(),
    }
  }

  pub fn has_bounds(&self) -> bool {
    self.min_price.is_some() || self.max_price.is_some() || self.min_rating.is_some()
  }

  /// Whether `offer` is a candidate for best offer: active, of the
  /// requested condition and at an allowed store. Bounds are not checked.
  pub fn admits(&self, offer: &Offer, store_keys: &BTreeSet<String>) -> bool {
    offer.active
      && offer.condition == self.condition
      && store_keys.contains(&store_match_key(&offer.store_name))
  }

  /// Whether `offer` satisfies the price and rating bounds. A missing
  /// rating fails a `min_rating` bound.
  pub fn within_bounds(&self, offer: &Offer) -> bool {
    self.min_price.is_none_or(|min| offer.price >= min)
      && self.max_price.is_none_or(|max| offer.price <= max)
      && self
        .min_rating
        .is_none_or(|min| offer.rating.is_some_and(|r| r >= min))
  }
}

/// Active-offer selection criteria pushed down to a [`CatalogStore`].
///
/// [`CatalogStore`]: crate::store::CatalogStore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferScope {
  pub condition:  String,
  pub store_keys: Vec<String>,
}

// ─── Sorting and paging ──────────────────────────────────────────────────────

/// Ordering of product lists. Never affects which offer is "best".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
  #[default]
  PriceAsc,
  PriceDesc,
  RatingDesc,
}

impl FromStr for SortMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "" | "low" | "price" | "price_asc" | "price-asc" => Ok(Self::PriceAsc),
      "high" | "price_desc" | "price-desc" => Ok(Self::PriceDesc),
      "rating" | "rating_desc" | "rating-desc" => Ok(Self::RatingDesc),
      other => Err(format!("unknown sort mode: {other:?}")),
    }
  }
}

impl fmt::Display for SortMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::PriceAsc => "low",
      Self::PriceDesc => "high",
      Self::RatingDesc => "rating",
    })
  }
}

/// A 1-based page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
  pub number: u32,
  pub size:   u32,
}

impl Default for Page {
  fn default() -> Self { Self { number: 1, size: DEFAULT_PAGE_SIZE } }
}

impl Page {
  /// Page 0 is treated as page 1; size 0 as the default size.
  pub fn new(number: u32, size: u32) -> Self {
    Self {
      number: number.max(1),
      size:   if size == 0 { DEFAULT_PAGE_SIZE } else { size },
    }
  }

  pub fn offset(&self) -> usize { (self.number.max(1) as usize - 1) * self.size as usize }

  pub fn limit(&self) -> usize { self.size as usize }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use rust_decimal_macros::dec;

  use super::*;

  fn offer(store: &str, price: Decimal, rating: Option<Decimal>) -> Offer {
    Offer {
      offer_id:   1,
      product_id: 1,
      store_id:   1,
      store_name: store.into(),
      price,
      rating,
      url:        "https://shop.example/p".into(),
      condition:  "New".into(),
      active:     true,
      last_seen:  Utc::now(),
    }
  }

  #[test]
  fn empty_filter_uses_defaults() {
    let f = OfferFilter::default().resolve().unwrap();
    assert_eq!(f.condition, "New");
    assert_eq!(f.stores.len(), DEFAULT_ALLOWED_STORES.len());
    assert!(f.store_keys().contains("bestbuy"));
    assert!(!f.has_bounds());
  }

  #[test]
  fn stores_are_deduplicated_case_insensitively() {
    let f = OfferFilter {
      stores: vec!["Amazon".into(), " amazon ".into(), "".into(), "Best Buy".into()],
      ..Default::default()
    }
    .resolve()
    .unwrap();
    assert_eq!(f.stores, vec!["Amazon".to_owned(), "Best Buy".to_owned()]);
  }

  #[test]
  fn blank_store_list_falls_back_to_defaults() {
    let f = OfferFilter { stores: vec!["  ".into()], ..Default::default() }
      .resolve()
      .unwrap();
    assert_eq!(f.stores.len(), DEFAULT_ALLOWED_STORES.len());
  }

  #[test]
  fn condition_defaults_and_passthrough() {
    assert_eq!(normalize_condition(None), "New");
    assert_eq!(normalize_condition(Some("  ")), "New");
    assert_eq!(normalize_condition(Some("NEW")), "New");
    assert_eq!(normalize_condition(Some("Refurbished")), "Refurbished");
    assert_eq!(normalize_condition(Some("used")), "used");
  }

  #[test]
  fn store_spelling_variants_match() {
    let catalog_offer = offer("BestBuy", dec!(10), None);
    for spelling in ["Best Buy", "BestBuy", "bestbuy"] {
      let f = OfferFilter { stores: vec![spelling.into()], ..Default::default() }
        .resolve()
        .unwrap();
      assert!(f.admits(&catalog_offer, &f.store_keys()), "{spelling}");
    }
  }

  #[test]
  fn bounds_are_inclusive() {
    let f = OfferFilter {
      stores: vec!["Amazon".into()],
      min_price: Some(dec!(100)),
      max_price: Some(dec!(200)),
      min_rating: Some(dec!(4.0)),
      ..Default::default()
    }
    .resolve()
    .unwrap();
    let keys = f.store_keys();

    assert!(f.within_bounds(&offer("Amazon", dec!(100), Some(dec!(4.0)))));
    assert!(f.within_bounds(&offer("Amazon", dec!(200), Some(dec!(5)))));
    assert!(!f.within_bounds(&offer("Amazon", dec!(99.99), Some(dec!(5)))));
    assert!(!f.within_bounds(&offer("Amazon", dec!(200.01), Some(dec!(5)))));
    assert!(!f.within_bounds(&offer("Amazon", dec!(150), Some(dec!(3.9)))));
    assert!(!f.within_bounds(&offer("Amazon", dec!(150), None)));

    // Candidacy ignores bounds.
    assert!(f.admits(&offer("Amazon", dec!(10), None), &keys));
  }

  #[test]
  fn inactive_or_wrong_condition_is_rejected() {
    let f = OfferFilter { stores: vec!["Amazon".into()], ..Default::default() }
      .resolve()
      .unwrap();
    let keys = f.store_keys();

    let mut inactive = offer("Amazon", dec!(10), None);
    inactive.active = false;
    assert!(!f.admits(&inactive, &keys));

    let mut used = offer("Amazon", dec!(10), None);
    used.condition = "Used".into();
    assert!(!f.admits(&used, &keys));
  }

  #[test]
  fn inverted_price_bounds_are_rejected() {
    let err = OfferFilter {
      min_price: Some(dec!(500)),
      max_price: Some(dec!(100)),
      ..Default::default()
    }
    .resolve()
    .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[test]
  fn sort_mode_parses_aliases() {
    assert_eq!("low".parse::<SortMode>().unwrap(), SortMode::PriceAsc);
    assert_eq!("HIGH".parse::<SortMode>().unwrap(), SortMode::PriceDesc);
    assert_eq!("rating".parse::<SortMode>().unwrap(), SortMode::RatingDesc);
    assert!("cheapest".parse::<SortMode>().is_err());

    // The CLI prints defaults with Display and parses them back.
    for mode in [SortMode::PriceAsc, SortMode::PriceDesc, SortMode::RatingDesc] {
      assert_eq!(mode.to_string().parse::<SortMode>().unwrap(), mode);
    }
  }

  #[test]
  fn page_offsets() {
    assert_eq!(Page::default().offset(), 0);
    assert_eq!(Page::new(3, 10).offset(), 20);
    assert_eq!(Page::new(0, 0), Page::default());
    assert_eq!(parse_store_list(" Amazon, ,Best Buy,"), vec!["Amazon", "Best Buy"]);
  }
}
