//! The `CatalogStore` trait and its query type.
//!
//! The trait is implemented by storage backends (e.g.
//! `comparehub-store-sqlite`). The reconciler and the query service depend
//! on this abstraction only. Implementations must enforce uniqueness of
//! `(name, brand)` for products, `name` for stores and
//! `(product_id, store_id, url)` for offers, and must make each upsert a
//! single atomic statement.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  catalog::{NewOffer, NewProduct, Offer, Product, ProductId, ProductSpecs, SpecValue, Store},
  filter::OfferScope,
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`CatalogStore::search_products`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
  /// Case-insensitive substring over product name and brand.
  pub text:     Option<String>,
  /// Exact (normalized) category.
  pub category: Option<String>,
  /// Brand, compared case-insensitively.
  pub brand:    Option<String>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a catalog storage backend.
///
/// Products and stores are never deleted. Offers are never deleted either;
/// they are deactivated by [`deactivate_stale`](Self::deactivate_stale).
pub trait CatalogStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert a product, or overwrite category/description/image of the
  /// existing product with the same `(name, brand)`.
  fn upsert_product(
    &self,
    input: NewProduct,
  ) -> impl Future<Output = Result<Product, Self::Error>> + Send + '_;

  /// Insert a store by name; an existing store is returned unchanged.
  fn upsert_store(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Store, Self::Error>> + Send + '_;

  /// Insert an offer as active with `last_seen = seen_at`, or overwrite
  /// price/rating/condition of the existing `(product, store, url)` offer,
  /// reactivating it and refreshing `last_seen`.
  fn upsert_offer(
    &self,
    input: NewOffer,
    seen_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Offer, Self::Error>> + Send + '_;

  /// Mark every active offer with `last_seen < cutoff` inactive. Returns the
  /// number of offers deactivated. Idempotent.
  fn deactivate_stale(
    &self,
    cutoff: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Replace the specs blob of a product.
  fn upsert_specs(
    &self,
    product_id: ProductId,
    specs: SpecValue,
    updated_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<ProductSpecs, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Retrieve a product by id. Returns `None` if not found.
  fn get_product(
    &self,
    id: ProductId,
  ) -> impl Future<Output = Result<Option<Product>, Self::Error>> + Send + '_;

  /// Retrieve the products among `ids` that exist, ordered by id.
  fn get_products<'a>(
    &'a self,
    ids: &'a [ProductId],
  ) -> impl Future<Output = Result<Vec<Product>, Self::Error>> + Send + 'a;

  /// All products matching `query`, ordered by id.
  fn search_products<'a>(
    &'a self,
    query: &'a ProductQuery,
  ) -> impl Future<Output = Result<Vec<Product>, Self::Error>> + Send + 'a;

  /// Active offers of `product_ids` with the scope's condition at one of
  /// the scope's stores (by match key). No ordering is guaranteed.
  fn active_offers<'a>(
    &'a self,
    product_ids: &'a [ProductId],
    scope: &'a OfferScope,
  ) -> impl Future<Output = Result<Vec<Offer>, Self::Error>> + Send + 'a;

  /// Every offer of a product, active or not, ordered by id.
  fn all_offers(
    &self,
    product_id: ProductId,
  ) -> impl Future<Output = Result<Vec<Offer>, Self::Error>> + Send + '_;

  /// Specs of the products among `ids` that have any.
  fn get_specs<'a>(
    &'a self,
    ids: &'a [ProductId],
  ) -> impl Future<Output = Result<Vec<ProductSpecs>, Self::Error>> + Send + 'a;
}
