//! The catalog reconciler: merges a decoded feed into the store.
//!
//! Every product and offer is upserted by its natural key, so applying the
//! same feed twice only refreshes `last_seen`. Offers that no run has
//! refreshed within the staleness window are deactivated by a global sweep
//! at the end of every run, whatever source they came from.
//!
//! Failures are scoped: a decode failure aborts the run before any write; a
//! failed upsert skips that one item; the sweep runs regardless.

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  DecodeError, UpsertError,
  catalog::{NewOffer, NewProduct, Offer, Product, ProductId, StoreId},
  category,
  clock::Clock,
  error::Entity,
  feed::{Feed, FeedDecoder, FeedOffer, FeedProduct, FeedSource},
  filter::normalize_condition,
  store::CatalogStore,
};

/// Offers not refreshed for this long are considered gone.
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(10 * 60);

// ─── Report ──────────────────────────────────────────────────────────────────

/// Which feed item an outcome refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemKey {
  Product {
    name:  String,
    brand: String,
  },
  Offer {
    product: String,
    brand:   String,
    store:   String,
    url:     String,
  },
}

impl ItemKey {
  fn product(name: &str, brand: &str) -> Self {
    Self::Product { name: name.to_owned(), brand: brand.to_owned() }
  }

  fn offer(name: &str, brand: &str, offer: &FeedOffer) -> Self {
    Self::Offer {
      product: name.to_owned(),
      brand:   brand.to_owned(),
      store:   offer.store_name.clone(),
      url:     offer.url.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
  Succeeded,
  Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
  pub item:   ItemKey,
  #[serde(flatten)]
  pub status: ItemStatus,
}

/// Result of the staleness sweep that closes every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepOutcome {
  Completed { cutoff: DateTime<Utc>, deactivated: u64 },
  Failed { cutoff: DateTime<Utc>, reason: String },
}

/// What a reconciliation run did, item by item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
  pub run_id:      Uuid,
  pub source:      String,
  pub started_at:  DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub items:       Vec<ItemOutcome>,
  /// Distinct `(product, store, url)` offers refreshed by this run.
  pub offers_seen: usize,
  pub sweep:       SweepOutcome,
}

impl ReconcileReport {
  pub fn succeeded(&self) -> usize {
    self
      .items
      .iter()
      .filter(|i| i.status == ItemStatus::Succeeded)
      .count()
  }

  /// Skipped items with their reasons.
  pub fn skipped(&self) -> impl Iterator<Item = (&ItemKey, &str)> {
    self.items.iter().filter_map(|i| match &i.status {
      ItemStatus::Skipped { reason } => Some((&i.item, reason.as_str())),
      ItemStatus::Succeeded => None,
    })
  }

  pub fn deactivated(&self) -> u64 {
    match self.sweep {
      SweepOutcome::Completed { deactivated, .. } => deactivated,
      SweepOutcome::Failed { .. } => 0,
    }
  }

  /// No item skipped and the sweep completed.
  pub fn is_clean(&self) -> bool {
    self.skipped().next().is_none() && matches!(self.sweep, SweepOutcome::Completed { .. })
  }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Applies feeds to a [`CatalogStore`].
///
/// Holds no per-run state, so one instance can serve the periodic task and
/// on-demand triggers at the same time.
pub struct Reconciler<S> {
  store:            Arc<S>,
  clock:            Arc<dyn Clock>,
  decoder:          FeedDecoder,
  staleness_window: Duration,
}

impl<S: CatalogStore> Reconciler<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
    Self {
      store,
      clock,
      decoder: FeedDecoder::default(),
      staleness_window: DEFAULT_STALENESS_WINDOW,
    }
  }

  pub fn with_staleness_window(mut self, window: Duration) -> Self {
    self.staleness_window = window;
    self
  }

  pub fn with_decoder(mut self, decoder: FeedDecoder) -> Self {
    self.decoder = decoder;
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

  /// Decode `source` and reconcile it. A decode failure returns before the
  /// store is touched.
  pub async fn run<F: FeedSource>(&self, source: &F) -> Result<ReconcileReport, DecodeError> {
    let feed = match self.decoder.load(source).await {
      Ok(feed) => feed,
      Err(err) => {
        tracing::error!(
          source = %source.describe(),
          reason = err.reason(),
          error = %err,
          "feed rejected, catalog left untouched"
        );
        return Err(err);
      }
    };
    Ok(self.reconcile(feed).await)
  }

  /// Merge `feed` into the catalog, then sweep stale offers.
  pub async fn reconcile(&self, feed: Feed) -> ReconcileReport {
    let run_id = Uuid::new_v4();
    let now = self.clock.now();
    tracing::info!(
      %run_id,
      source = %feed.source,
      products = feed.products.len(),
      offers = feed.offer_count(),
      "reconciling feed"
    );

    let mut items = Vec::new();
    let mut seen: HashSet<(ProductId, StoreId, String)> = HashSet::new();
    for entry in feed.products {
      self.apply_product(run_id, entry, now, &mut items, &mut seen).await;
    }

    let sweep = self.sweep(now).await;
    let report = ReconcileReport {
      run_id,
      source: feed.source,
      started_at: now,
      finished_at: self.clock.now(),
      items,
      offers_seen: seen.len(),
      sweep,
    };

    tracing::info!(
      %run_id,
      succeeded = report.succeeded(),
      skipped = report.skipped().count(),
      offers_seen = report.offers_seen,
      deactivated = report.deactivated(),
      "reconciliation finished"
    );
    report
  }

  /// Deactivate every offer last seen before `now - window`.
  pub async fn sweep(&self, now: DateTime<Utc>) -> SweepOutcome {
    let window = chrono::Duration::from_std(self.staleness_window).unwrap_or(chrono::Duration::MAX);
    let cutoff = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);

    match self.store.deactivate_stale(cutoff).await {
      Ok(deactivated) => {
        tracing::debug!(%cutoff, deactivated, "staleness sweep done");
        SweepOutcome::Completed { cutoff, deactivated }
      }
      Err(err) => {
        tracing::warn!(%cutoff, error = %err, "staleness sweep failed");
        SweepOutcome::Failed { cutoff, reason: err.to_string() }
      }
    }
  }

  async fn apply_product(
    &self,
    run_id: Uuid,
    entry: FeedProduct,
    now: DateTime<Utc>,
    items: &mut Vec<ItemOutcome>,
    seen: &mut HashSet<(ProductId, StoreId, String)>,
  ) {
    let FeedProduct { name, brand, category, description, image_url, offers } = entry;
    let input = NewProduct {
      name: name.clone(),
      brand: brand.clone(),
      category: category::normalize(&category),
      description,
      image_url,
    };

    let product = match self.store.upsert_product(input).await {
      Ok(product) => {
        items.push(ItemOutcome {
          item:   ItemKey::product(&name, &brand),
          status: ItemStatus::Succeeded,
        });
        product
      }
      Err(err) => {
        let err = UpsertError::new(Entity::Product, err);
        tracing::warn!(%run_id, %name, %brand, error = %err, "skipping product");
        items.push(ItemOutcome {
          item:   ItemKey::product(&name, &brand),
          status: ItemStatus::Skipped { reason: err.to_string() },
        });
        for offer in &offers {
          items.push(ItemOutcome {
            item:   ItemKey::offer(&name, &brand, offer),
            status: ItemStatus::Skipped { reason: format!("product not stored: {err}") },
          });
        }
        return;
      }
    };

    for offer in offers {
      let item = ItemKey::offer(&name, &brand, &offer);
      match self.apply_offer(&product, offer, now).await {
        Ok(stored) => {
          tracing::debug!(%run_id, offer_id = stored.offer_id, "offer refreshed");
          seen.insert((stored.product_id, stored.store_id, stored.url));
          items.push(ItemOutcome { item, status: ItemStatus::Succeeded });
        }
        Err(err) => {
          tracing::warn!(%run_id, product_id = product.product_id, error = %err, "skipping offer");
          items.push(ItemOutcome {
            item,
            status: ItemStatus::Skipped { reason: err.to_string() },
          });
        }
      }
    }
  }

  async fn apply_offer(
    &self,
    product: &Product,
    offer: FeedOffer,
    now: DateTime<Utc>,
  ) -> Result<Offer, UpsertError> {
    let price = offer.decimal_price().map_err(|e| UpsertError::new(Entity::Offer, e))?;
    let rating = offer.decimal_rating().map_err(|e| UpsertError::new(Entity::Offer, e))?;

    let store = self
      .store
      .upsert_store(offer.store_name)
      .await
      .map_err(|e| UpsertError::new(Entity::Store, e))?;

    let input = NewOffer {
      product_id: product.product_id,
      store_id:   store.store_id,
      price,
      rating,
      url:        offer.url,
      condition:  normalize_condition(Some(&offer.condition)),
    };
    self
      .store
      .upsert_offer(input, now)
      .await
      .map_err(|e| UpsertError::new(Entity::Offer, e))
  }
}
