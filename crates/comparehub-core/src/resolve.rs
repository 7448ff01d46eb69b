//! Offer resolution: picking and ordering offers under a filter.
//!
//! Every read path goes through these functions so that "best offer" means
//! the same thing everywhere. Orderings are total; the order rows arrive in
//! from storage never leaks into results.

use std::{
  cmp::Ordering,
  collections::{BTreeMap, BTreeSet},
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
  catalog::{Offer, ProductId},
  filter::{ResolvedFilter, SortMode},
};

// ─── Ordering ────────────────────────────────────────────────────────────────

/// Total order on offers: price ascending, then rating descending with
/// missing ratings last, then store name (case-insensitive), then offer id.
pub fn offer_order(a: &Offer, b: &Offer) -> Ordering {
  a.price
    .cmp(&b.price)
    .then_with(|| rating_desc(a.rating, b.rating))
    .then_with(|| a.store_name.to_lowercase().cmp(&b.store_name.to_lowercase()))
    .then_with(|| a.offer_id.cmp(&b.offer_id))
}

/// Higher ratings first, `None` after every rating.
fn rating_desc(a: Option<Decimal>, b: Option<Decimal>) -> Ordering {
  match (a, b) {
    (Some(a), Some(b)) => b.cmp(&a),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  }
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// Offers passing `filter`, bounds included, best first.
pub fn offers_for<I>(offers: I, filter: &ResolvedFilter) -> Vec<Offer>
where
  I: IntoIterator<Item = Offer>,
{
  let keys = filter.store_keys();
  let mut matching: Vec<Offer> = offers
    .into_iter()
    .filter(|o| filter.admits(o, &keys) && filter.within_bounds(o))
    .collect();
  matching.sort_by(offer_order);
  matching
}

/// The best offer of one product under `filter`, if any.
///
/// The best is chosen among active offers of the requested condition at
/// allowed stores; price and rating bounds then apply to that offer alone.
/// A bound never promotes a worse offer to best.
pub fn best_offer<'a, I>(offers: I, filter: &ResolvedFilter) -> Option<Offer>
where
  I: IntoIterator<Item = &'a Offer>,
{
  let keys = filter.store_keys();
  offers
    .into_iter()
    .filter(|o| filter.admits(o, &keys))
    .min_by(|a, b| offer_order(a, b))
    .filter(|o| filter.within_bounds(o))
    .cloned()
}

/// Best offer for each of `product_ids`, resolved independently.
///
/// Every requested id appears in the result, with `None` when nothing
/// matches. Offers for other products are ignored.
pub fn best_offers<'a, I>(
  product_ids: &[ProductId],
  offers: I,
  filter: &ResolvedFilter,
) -> BTreeMap<ProductId, Option<Offer>>
where
  I: IntoIterator<Item = &'a Offer>,
{
  let mut by_product: BTreeMap<ProductId, Vec<&Offer>> = product_ids
    .iter()
    .map(|id| (*id, Vec::new()))
    .collect();
  for offer in offers {
    if let Some(bucket) = by_product.get_mut(&offer.product_id) {
      bucket.push(offer);
    }
  }

  by_product
    .into_iter()
    .map(|(id, bucket)| (id, best_offer(bucket, filter)))
    .collect()
}

/// Group offers by product and order each group best first.
pub fn group_offers<I>(offers: I, filter: &ResolvedFilter) -> BTreeMap<ProductId, Vec<Offer>>
where
  I: IntoIterator<Item = Offer>,
{
  let mut grouped: BTreeMap<ProductId, Vec<Offer>> = BTreeMap::new();
  for offer in offers_for(offers, filter) {
    grouped.entry(offer.product_id).or_default().push(offer);
  }
  grouped
}

// ─── Best-offer view ─────────────────────────────────────────────────────────

/// The representative offer shown next to a product.
///
/// A product without a matching offer gets the empty placeholder: blank
/// `source` and no price.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestOffer {
  /// Store name, empty for the placeholder.
  pub source:   String,
  pub price:    Option<Decimal>,
  pub rating:   Option<Decimal>,
  pub url:      Option<String>,
  pub offer_id: Option<i64>,
}

impl BestOffer {
  pub fn placeholder() -> Self { Self::default() }

  pub fn is_placeholder(&self) -> bool { self.price.is_none() }
}

impl From<Option<&Offer>> for BestOffer {
  fn from(offer: Option<&Offer>) -> Self {
    match offer {
      Some(o) => Self {
        source:   o.store_name.clone(),
        price:    Some(o.price),
        rating:   o.rating,
        url:      Some(o.url.clone()),
        offer_id: Some(o.offer_id),
      },
      None => Self::placeholder(),
    }
  }
}

// ─── Product ordering ────────────────────────────────────────────────────────

/// Order `(product_id, best)` pairs for a product list.
///
/// Products without a best offer (or without a rating, for
/// [`SortMode::RatingDesc`]) sort last; ties break on product id.
pub fn product_order(
  mode: SortMode,
  a: (ProductId, &BestOffer),
  b: (ProductId, &BestOffer),
) -> Ordering {
  let primary = match mode {
    SortMode::PriceAsc => none_last(a.1.price, b.1.price, |x, y| x.cmp(y)),
    SortMode::PriceDesc => none_last(a.1.price, b.1.price, |x, y| y.cmp(x)),
    SortMode::RatingDesc => rating_desc(a.1.rating, b.1.rating)
      .then_with(|| none_last(a.1.price, b.1.price, |x, y| x.cmp(y))),
  };
  primary.then_with(|| a.0.cmp(&b.0))
}

fn none_last<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
  match (a, b) {
    (Some(a), Some(b)) => cmp(&a, &b),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  }
}

/// Ids present in `ids`, de-duplicated and in ascending order.
pub fn distinct_ids(ids: &[ProductId]) -> Vec<ProductId> {
  ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use rust_decimal_macros::dec;

  use super::*;
  use crate::filter::OfferFilter;

  fn offer(id: i64, product: ProductId, store: &str, price: Decimal, rating: Option<Decimal>) -> Offer {
    Offer {
      offer_id: id,
      product_id: product,
      store_id: id,
      store_name: store.into(),
      price,
      rating,
      url: format!("https://{store}.example/{id}"),
      condition: "New".into(),
      active: true,
      last_seen: Utc::now(),
    }
  }

  fn any_store() -> ResolvedFilter {
    OfferFilter {
      stores: vec!["Amazon".into(), "BestBuy".into(), "Walmart".into()],
      ..Default::default()
    }
    .resolve()
    .unwrap()
  }

  #[test]
  fn rating_breaks_price_ties() {
    let offers = vec![
      offer(1, 7, "Amazon", dec!(100), Some(dec!(4.0))),
      offer(2, 7, "Walmart", dec!(100), Some(dec!(4.8))),
    ];
    let best = best_offer(&offers, &any_store()).unwrap();
    assert_eq!(best.offer_id, 2);
  }

  #[test]
  fn missing_rating_sorts_after_rated() {
    let offers = vec![
      offer(1, 7, "Amazon", dec!(100), None),
      offer(2, 7, "Walmart", dec!(100), Some(dec!(1.0))),
    ];
    assert_eq!(best_offer(&offers, &any_store()).unwrap().offer_id, 2);
  }

  #[test]
  fn lowest_price_wins_over_rating() {
    let offers = vec![
      offer(1, 7, "Amazon", dec!(99.99), None),
      offer(2, 7, "Walmart", dec!(100), Some(dec!(5))),
    ];
    assert_eq!(best_offer(&offers, &any_store()).unwrap().offer_id, 1);
  }

  #[test]
  fn full_ties_are_deterministic() {
    let a = offer(5, 7, "walmart", dec!(50), Some(dec!(4)));
    let b = offer(3, 7, "Amazon", dec!(50), Some(dec!(4)));
    let c = offer(4, 7, "Amazon", dec!(50), Some(dec!(4)));

    let forward = offers_for(vec![a.clone(), b.clone(), c.clone()], &any_store());
    let backward = offers_for(vec![c, b, a], &any_store());
    let ids: Vec<_> = forward.iter().map(|o| o.offer_id).collect();
    assert_eq!(ids, vec![3, 4, 5]);
    assert_eq!(forward, backward);
  }

  #[test]
  fn filtered_out_offers_yield_none() {
    let offers = vec![offer(1, 7, "Target", dec!(10), None)];
    assert!(best_offer(&offers, &any_store()).is_none());
    assert!(offers_for(offers, &any_store()).is_empty());
  }

  #[test]
  fn bounds_apply_after_best_is_chosen() {
    let offers = vec![
      offer(1, 7, "Amazon", dec!(50), Some(dec!(3))),
      offer(2, 7, "Walmart", dec!(150), Some(dec!(5))),
    ];
    let bounded = |f: OfferFilter| {
      OfferFilter { stores: vec!["Amazon".into(), "Walmart".into()], ..f }
        .resolve()
        .unwrap()
    };

    let min_price = bounded(OfferFilter { min_price: Some(dec!(100)), ..Default::default() });
    assert!(best_offer(&offers, &min_price).is_none());

    let min_rating = bounded(OfferFilter { min_rating: Some(dec!(4)), ..Default::default() });
    assert!(best_offer(&offers, &min_rating).is_none());

    let max_price = bounded(OfferFilter { max_price: Some(dec!(60)), ..Default::default() });
    assert_eq!(best_offer(&offers, &max_price).map(|o| o.offer_id), Some(1));

    // Row listings still show the offers that fit the bounds.
    let rows = offers_for(offers, &min_price);
    assert_eq!(rows.iter().map(|o| o.offer_id).collect::<Vec<_>>(), vec![2]);
  }

  #[test]
  fn best_offers_covers_every_requested_id() {
    let offers = vec![
      offer(1, 7, "Amazon", dec!(20), None),
      offer(2, 7, "BestBuy", dec!(15), None),
      offer(3, 8, "Amazon", dec!(30), None),
    ];
    let best = best_offers(&[7, 9], &offers, &any_store());

    assert_eq!(best.len(), 2);
    assert_eq!(best[&7].as_ref().map(|o| o.offer_id), Some(2));
    assert!(best[&9].is_none());
    assert!(!best.contains_key(&8));
  }

  #[test]
  fn placeholder_for_missing_offer() {
    let placeholder = BestOffer::from(None);
    assert!(placeholder.is_placeholder());
    assert_eq!(placeholder.source, "");

    let o = offer(1, 7, "Amazon", dec!(20), Some(dec!(4.5)));
    let best = BestOffer::from(Some(&o));
    assert_eq!(best.source, "Amazon");
    assert_eq!(best.price, Some(dec!(20)));
    assert_eq!(best.url.as_deref(), Some("https://Amazon.example/1"));
  }

  #[test]
  fn product_order_modes() {
    let cheap = BestOffer { price: Some(dec!(10)), rating: Some(dec!(3)), ..Default::default() };
    let pricey = BestOffer { price: Some(dec!(90)), rating: Some(dec!(5)), ..Default::default() };
    let none = BestOffer::placeholder();

    let mut rows = vec![(3, &none), (2, &pricey), (1, &cheap)];

    rows.sort_by(|a, b| product_order(SortMode::PriceAsc, *a, *b));
    assert_eq!(rows.iter().map(|r| r.0).collect::<Vec<_>>(), vec![1, 2, 3]);

    rows.sort_by(|a, b| product_order(SortMode::PriceDesc, *a, *b));
    assert_eq!(rows.iter().map(|r| r.0).collect::<Vec<_>>(), vec![2, 1, 3]);

    rows.sort_by(|a, b| product_order(SortMode::RatingDesc, *a, *b));
    assert_eq!(rows.iter().map(|r| r.0).collect::<Vec<_>>(), vec![2, 1, 3]);
  }

  #[test]
  fn distinct_ids_sorts_and_dedups() {
    assert_eq!(distinct_ids(&[9, 7, 9]), vec![7, 9]);
  }
}
