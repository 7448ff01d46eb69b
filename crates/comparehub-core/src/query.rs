//! The query service: the contract exposed to transport layers.
//!
//! [`Catalog`] wraps a [`CatalogStore`] and answers list, detail, offers,
//! compare and top-deals queries through the offer resolver. It also
//! carries the administrative operations (manual inserts and the
//! on-demand reconciliation trigger). Callers are assumed to be authorized.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  catalog::{NewOffer, NewProduct, Offer, Product, ProductId, ProductSpecs, SpecValue},
  category,
  feed::FeedSource,
  filter::{OfferFilter, Page, SortMode, normalize_condition},
  reconcile::{ReconcileReport, Reconciler},
  resolve::{self, BestOffer, distinct_ids, product_order},
  store::{CatalogStore, ProductQuery},
};

pub const DEFAULT_TOP_DEALS: usize = 20;

// ─── Views ───────────────────────────────────────────────────────────────────

/// A product row in a list, with its resolved best offer.
#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
  #[serde(flatten)]
  pub product:      Product,
  pub best_offer:   BestOffer,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub review_count: Option<i64>,
}

/// A product with every matching offer, best first.
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
  #[serde(flatten)]
  pub product:       Product,
  pub offers:        Vec<Offer>,
  pub best_offer:    BestOffer,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub specs:         Option<SpecValue>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub specs_updated: Option<DateTime<Utc>>,
}

impl ProductDetail {
  /// `offers` must already be filtered and ordered best first; `best` is
  /// resolved separately since bounds may hide it from `offers`.
  fn new(
    product: Product,
    offers: Vec<Offer>,
    best: Option<&Offer>,
    specs: Option<ProductSpecs>,
  ) -> Self {
    let best_offer = BestOffer::from(best);
    let (specs, specs_updated) = match specs {
      Some(s) => (Some(s.specs), Some(s.last_updated)),
      None => (None, None),
    };
    Self { product, offers, best_offer, specs, specs_updated }
  }
}

/// One column of a side-by-side comparison.
pub type ProductComparison = ProductDetail;

/// Administrative offer input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminOffer {
  pub product_id: ProductId,
  pub store_name: String,
  pub price:      Decimal,
  pub rating:     Option<Decimal>,
  pub url:        String,
  pub condition:  Option<String>,
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// Read and admin operations over a catalog.
pub struct Catalog<S> {
  store:      Arc<S>,
  reconciler: Arc<Reconciler<S>>,
}

impl<S> Clone for Catalog<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), reconciler: Arc::clone(&self.reconciler) }
  }
}

impl<S: CatalogStore> Catalog<S> {
  pub fn new(reconciler: Arc<Reconciler<S>>) -> Self {
    Self { store: Arc::clone(reconciler.store()), reconciler }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn reconciler(&self) -> &Arc<Reconciler<S>> { &self.reconciler }

  // ── Reads ─────────────────────────────────────────────────────────────

  /// One page of products with their best offers.
  ///
  /// Bounds apply to each product's best offer: when the filter has price
  /// or rating bounds, products whose best offer is missing or out of
  /// bounds are left out. Without bounds, offer-less products are listed
  /// with an empty best offer.
  pub async fn list_products(
    &self,
    query: &ProductQuery,
    filter: &OfferFilter,
    sort: SortMode,
    page: Page,
  ) -> Result<Vec<ProductSummary>> {
    let filter = filter.resolve()?;
    let query = effective_query(query);

    let products = self.store.search_products(&query).await.map_err(Error::store)?;
    let ids: Vec<ProductId> = products.iter().map(|p| p.product_id).collect();
    let scope = filter.scope();
    let offers = self.store.active_offers(&ids, &scope).await.map_err(Error::store)?;
    let best = resolve::best_offers(&ids, &offers, &filter);

    let mut rows: Vec<(Product, BestOffer)> = products
      .into_iter()
      .map(|p| {
        let best = BestOffer::from(best.get(&p.product_id).and_then(Option::as_ref));
        (p, best)
      })
      .filter(|(_, best)| !filter.has_bounds() || !best.is_placeholder())
      .collect();
    rows.sort_by(|a, b| product_order(sort, (a.0.product_id, &a.1), (b.0.product_id, &b.1)));

    let rows: Vec<(Product, BestOffer)> =
      rows.into_iter().skip(page.offset()).take(page.limit()).collect();
    Ok(self.summaries(rows).await)
  }

  /// A product with its matching offers and optional specs.
  pub async fn get_product(&self, id: ProductId, filter: &OfferFilter) -> Result<ProductDetail> {
    let filter = filter.resolve()?;
    let product = self
      .store
      .get_product(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NotFound(id))?;

    let ids = [id];
    let scope = filter.scope();
    let offers = self.store.active_offers(&ids, &scope).await.map_err(Error::store)?;
    let best = resolve::best_offer(&offers, &filter);
    let offers = resolve::offers_for(offers, &filter);
    let specs = self.specs_for(&ids).await.remove(&id);
    Ok(ProductDetail::new(product, offers, best.as_ref(), specs))
  }

  /// Matching offers of a product, best first. Unknown ids yield no offers.
  pub async fn get_offers(&self, id: ProductId, filter: &OfferFilter) -> Result<Vec<Offer>> {
    let filter = filter.resolve()?;
    let ids = [id];
    let scope = filter.scope();
    let offers = self.store.active_offers(&ids, &scope).await.map_err(Error::store)?;
    Ok(resolve::offers_for(offers, &filter))
  }

  /// The best offer of a product, if any and if it fits the bounds.
  pub async fn best_offer(&self, id: ProductId, filter: &OfferFilter) -> Result<Option<Offer>> {
    let filter = filter.resolve()?;
    let ids = [id];
    let scope = filter.scope();
    let offers = self.store.active_offers(&ids, &scope).await.map_err(Error::store)?;
    Ok(resolve::best_offer(&offers, &filter))
  }

  /// Best matching offer for each id; every id is present in the result.
  pub async fn best_offers(
    &self,
    ids: &[ProductId],
    filter: &OfferFilter,
  ) -> Result<BTreeMap<ProductId, Option<Offer>>> {
    let filter = filter.resolve()?;
    let ids = distinct_ids(ids);
    let scope = filter.scope();
    let offers = self.store.active_offers(&ids, &scope).await.map_err(Error::store)?;
    Ok(resolve::best_offers(&ids, &offers, &filter))
  }

  /// Side-by-side view of two or more products.
  ///
  /// Ids are de-duplicated; fewer than two distinct ids is a validation
  /// error. Ids that do not exist are left out of the result. A product
  /// without matching offers is returned with an empty best offer.
  pub async fn compare_products(
    &self,
    ids: &[ProductId],
    filter: &OfferFilter,
  ) -> Result<Vec<ProductComparison>> {
    if let Some(bad) = ids.iter().find(|id| **id <= 0) {
      return Err(Error::Validation(format!("invalid product id: {bad}")));
    }
    let ids = distinct_ids(ids);
    if ids.len() < 2 {
      return Err(Error::Validation("select at least 2 product ids".into()));
    }
    let filter = filter.resolve()?;

    let products = self.store.get_products(&ids).await.map_err(Error::store)?;
    let mut specs = self.specs_for(&ids).await;
    let scope = filter.scope();
    let offers = self.store.active_offers(&ids, &scope).await.map_err(Error::store)?;
    let best = resolve::best_offers(&ids, &offers, &filter);
    let mut grouped = resolve::group_offers(offers, &filter);

    Ok(
      products
        .into_iter()
        .map(|p| {
          let id = p.product_id;
          let offers = grouped.remove(&id).unwrap_or_default();
          let best = best.get(&id).and_then(Option::as_ref);
          ProductDetail::new(p, offers, best, specs.remove(&id))
        })
        .collect(),
    )
  }

  /// Products with a best offer, cheapest first.
  pub async fn top_deals(&self, filter: &OfferFilter, limit: usize) -> Result<Vec<ProductSummary>> {
    let filter = filter.resolve()?;
    let products = self
      .store
      .search_products(&ProductQuery::default())
      .await
      .map_err(Error::store)?;
    let ids: Vec<ProductId> = products.iter().map(|p| p.product_id).collect();
    let scope = filter.scope();
    let offers = self.store.active_offers(&ids, &scope).await.map_err(Error::store)?;
    let best = resolve::best_offers(&ids, &offers, &filter);

    let mut rows: Vec<(Product, BestOffer)> = products
      .into_iter()
      .filter_map(|p| {
        let offer = best.get(&p.product_id).and_then(Option::as_ref)?;
        Some((p, BestOffer::from(Some(offer))))
      })
      .collect();
    rows.sort_by(|a, b| {
      product_order(SortMode::PriceAsc, (a.0.product_id, &a.1), (b.0.product_id, &b.1))
    });
    rows.truncate(limit);
    Ok(self.summaries(rows).await)
  }

  // ── Admin ─────────────────────────────────────────────────────────────

  /// Decode `source` and reconcile it into the catalog now.
  pub async fn trigger_reconcile<F: FeedSource>(&self, source: &F) -> Result<ReconcileReport> {
    Ok(self.reconciler.run(source).await?)
  }

  /// Insert or update a product by `(name, brand)`. The category is
  /// normalized like feed input.
  pub async fn add_product(&self, mut input: NewProduct) -> Result<Product> {
    input.name = input.name.trim().to_owned();
    if input.name.is_empty() {
      return Err(Error::Validation("product name is required".into()));
    }
    input.category = category::normalize(&input.category);
    self.store.upsert_product(input).await.map_err(Error::store)
  }

  /// Insert or refresh an offer for an existing product.
  pub async fn add_offer(&self, input: AdminOffer) -> Result<Offer> {
    let store_name = input.store_name.trim().to_owned();
    let url = input.url.trim().to_owned();
    if store_name.is_empty() || url.is_empty() {
      return Err(Error::Validation("store name and url are required".into()));
    }
    if input.price <= Decimal::ZERO {
      return Err(Error::Validation(format!("price must be positive, got {}", input.price)));
    }
    if let Some(rating) = input.rating
      && (rating < Decimal::ZERO || rating > Decimal::from(5))
    {
      return Err(Error::Validation(format!("rating {rating} is outside 0..=5")));
    }

    self.require_product(input.product_id).await?;
    let store = self.store.upsert_store(store_name).await.map_err(Error::store)?;
    let offer = NewOffer {
      product_id: input.product_id,
      store_id:   store.store_id,
      price:      input.price,
      rating:     input.rating,
      url,
      condition:  normalize_condition(input.condition.as_deref()),
    };
    self
      .store
      .upsert_offer(offer, self.reconciler.now())
      .await
      .map_err(Error::store)
  }

  /// Replace the specs blob of an existing product.
  pub async fn upsert_specs(&self, product_id: ProductId, specs: SpecValue) -> Result<ProductSpecs> {
    self.require_product(product_id).await?;
    self
      .store
      .upsert_specs(product_id, specs, self.reconciler.now())
      .await
      .map_err(Error::store)
  }

  // ── Helpers ───────────────────────────────────────────────────────────

  async fn require_product(&self, id: ProductId) -> Result<Product> {
    self
      .store
      .get_product(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NotFound(id))
  }

  /// Specs keyed by product. A failed lookup degrades to "no specs".
  async fn specs_for(&self, ids: &[ProductId]) -> BTreeMap<ProductId, ProductSpecs> {
    if ids.is_empty() {
      return BTreeMap::new();
    }
    match self.store.get_specs(ids).await {
      Ok(specs) => specs.into_iter().map(|s| (s.product_id, s)).collect(),
      Err(err) => {
        tracing::warn!(error = %err, "specs lookup failed, continuing without specs");
        BTreeMap::new()
      }
    }
  }

  async fn summaries(&self, rows: Vec<(Product, BestOffer)>) -> Vec<ProductSummary> {
    let ids: Vec<ProductId> = rows.iter().map(|(p, _)| p.product_id).collect();
    let specs = self.specs_for(&ids).await;
    rows
      .into_iter()
      .map(|(product, best_offer)| ProductSummary {
        review_count: specs.get(&product.product_id).and_then(ProductSpecs::review_count),
        product,
        best_offer,
      })
      .collect()
  }
}

/// Drop blank and `"all"` filters and normalize the category.
fn effective_query(query: &ProductQuery) -> ProductQuery {
  fn meaningful(v: &Option<String>) -> Option<String> {
    v.as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
      .map(str::to_owned)
  }

  ProductQuery {
    text:     meaningful(&query.text),
    category: meaningful(&query.category).map(|c| category::normalize(&c)),
    brand:    meaningful(&query.brand),
  }
}
