//! [`SqliteCatalog`], the SQLite implementation of [`CatalogStore`].

use std::{path::Path, rc::Rc};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, functions::FunctionFlags, types::Value};

use comparehub_core::{
  catalog::{
    NewOffer, NewProduct, Offer, Product, ProductId, ProductSpecs, SpecValue, Store,
    store_match_key,
  },
  filter::OfferScope,
  store::{CatalogStore, ProductQuery},
};

use crate::{
  Error, Result,
  encode::{
    OFFER_SELECT, RawOffer, RawSpecs, encode_decimal, encode_dt, encode_specs,
  },
  schema::SCHEMA,
};

const PRODUCT_COLUMNS: &str = "product_id, name, brand, category, description, image_url";

fn product_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
  Ok(Product {
    product_id:  row.get(0)?,
    name:        row.get(1)?,
    brand:       row.get(2)?,
    category:    row.get(3)?,
    description: row.get(4)?,
    image_url:   row.get(5)?,
  })
}

/// Bind a list of values for use with `IN rarray(?N)`.
fn id_array(ids: &[ProductId]) -> Rc<Vec<Value>> {
  Rc::new(ids.iter().copied().map(Value::from).collect())
}

fn text_array(items: &[String]) -> Rc<Vec<Value>> {
  Rc::new(items.iter().cloned().map(Value::from).collect())
}

/// SQL name of [`fold_case`]. SQLite's own `lower()` only folds ASCII.
const FOLD_CASE: &str = "fold_case";

/// Case folding shared by search patterns and the registered SQL function.
fn fold_case(text: &str) -> String { text.to_lowercase() }

/// Register [`FOLD_CASE`] on `conn`.
fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    FOLD_CASE,
    1,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| Ok(ctx.get::<Option<String>>(0)?.as_deref().map(fold_case)),
  )
}

/// Escape `LIKE` metacharacters; pairs with `ESCAPE '\'`.
fn like_pattern(text: &str) -> String {
  let mut out = String::with_capacity(text.len() + 2);
  out.push('%');
  for c in fold_case(text).chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('%');
  out
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A CompareHub catalog backed by a single SQLite file.
///
/// Clones share one background connection.
#[derive(Clone)]
pub struct SqliteCatalog {
  conn: tokio_rusqlite::Connection,
}

impl SqliteCatalog {
  /// Open (or create) a catalog at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    tracing::debug!(path = %path.as_ref().display(), "opening catalog");
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open a private in-memory catalog.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        rusqlite::vtab::array::load_module(conn)?;
        register_functions(conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteCatalog {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn upsert_product(&self, input: NewProduct) -> Result<Product> {
    let product = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "INSERT INTO products (name, brand, category, description, image_url)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (name, brand) DO UPDATE SET
             category    = excluded.category,
             description = excluded.description,
             image_url   = excluded.image_url
           RETURNING {PRODUCT_COLUMNS}"
        );
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![
                input.name,
                input.brand,
                input.category,
                input.description,
                input.image_url,
              ],
              product_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    product.ok_or(Error::MissingRow("product"))
  }

  async fn upsert_store(&self, name: String) -> Result<Store> {
    let match_key = store_match_key(&name);

    let store = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "INSERT INTO stores (name, match_key) VALUES (?1, ?2)
               ON CONFLICT (name) DO UPDATE SET name = excluded.name
               RETURNING store_id, name, match_key",
              rusqlite::params![name, match_key],
              |row| {
                Ok(Store {
                  store_id:  row.get(0)?,
                  name:      row.get(1)?,
                  match_key: row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    store.ok_or(Error::MissingRow("store"))
  }

  async fn upsert_offer(&self, input: NewOffer, seen_at: DateTime<Utc>) -> Result<Offer> {
    let price_str  = encode_decimal(input.price);
    let rating_str = input.rating.map(encode_decimal);
    let seen_str   = encode_dt(seen_at);

    let raw: Option<RawOffer> = self
      .conn
      .call(move |conn| {
        let offer_id: i64 = conn.query_row(
          "INSERT INTO offers (
             product_id, store_id, price, rating, url, condition, active, last_seen
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)
           ON CONFLICT (product_id, store_id, url) DO UPDATE SET
             price     = excluded.price,
             rating    = excluded.rating,
             condition = excluded.condition,
             active    = 1,
             last_seen = excluded.last_seen
           RETURNING offer_id",
          rusqlite::params![
            input.product_id,
            input.store_id,
            price_str,
            rating_str,
            input.url,
            input.condition,
            seen_str,
          ],
          |row| row.get(0),
        )?;

        let sql = format!("{OFFER_SELECT} WHERE o.offer_id = ?1");
        Ok(
          conn
            .query_row(&sql, rusqlite::params![offer_id], RawOffer::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.ok_or(Error::MissingRow("offer"))?.into_offer()
  }

  async fn deactivate_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
    let cutoff_str = encode_dt(cutoff);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE offers SET active = 0 WHERE active = 1 AND last_seen < ?1",
          rusqlite::params![cutoff_str],
        )?)
      })
      .await?;

    tracing::debug!(%cutoff, changed, "stale offers deactivated");
    Ok(changed as u64)
  }

  async fn upsert_specs(
    &self,
    product_id: ProductId,
    specs:      SpecValue,
    updated_at: DateTime<Utc>,
  ) -> Result<ProductSpecs> {
    let specs_str = encode_specs(&specs)?;
    let at_str    = encode_dt(updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO product_specs (product_id, specs_json, last_updated)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (product_id) DO UPDATE SET
             specs_json   = excluded.specs_json,
             last_updated = excluded.last_updated",
          rusqlite::params![product_id, specs_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(ProductSpecs { product_id, specs, last_updated: updated_at })
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
    let product = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = ?1");
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id], product_from_row)
            .optional()?,
        )
      })
      .await?;

    Ok(product)
  }

  async fn get_products<'a>(&'a self, ids: &'a [ProductId]) -> Result<Vec<Product>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let ids = ids.to_vec();

    let products = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {PRODUCT_COLUMNS} FROM products
           WHERE product_id IN rarray(?1)
           ORDER BY product_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![id_array(&ids)], product_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(products)
  }

  async fn search_products<'a>(&'a self, query: &'a ProductQuery) -> Result<Vec<Product>> {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut params: Vec<String> = Vec::new();

    if let Some(text) = &query.text {
      params.push(like_pattern(text));
      clauses.push(
        "(fold_case(name) LIKE ?{n} ESCAPE '\\' OR fold_case(brand) LIKE ?{n} ESCAPE '\\')",
      );
    }
    if let Some(category) = &query.category {
      params.push(category.clone());
      clauses.push("category = ?{n}");
    }
    if let Some(brand) = &query.brand {
      params.push(fold_case(brand));
      clauses.push("fold_case(brand) = ?{n}");
    }

    let where_sql = if clauses.is_empty() {
      String::new()
    } else {
      let parts: Vec<String> = clauses
        .iter()
        .enumerate()
        .map(|(i, c)| c.replace("{n}", &(i + 1).to_string()))
        .collect();
      format!("WHERE {}", parts.join(" AND "))
    };

    let products = self
      .conn
      .call(move |conn| {
        let sql =
          format!("SELECT {PRODUCT_COLUMNS} FROM products {where_sql} ORDER BY product_id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), product_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(products)
  }

  async fn active_offers<'a>(
    &'a self,
    product_ids: &'a [ProductId],
    scope:       &'a OfferScope,
  ) -> Result<Vec<Offer>> {
    if product_ids.is_empty() || scope.store_keys.is_empty() {
      return Ok(Vec::new());
    }
    let ids        = product_ids.to_vec();
    let store_keys = scope.store_keys.clone();
    let condition  = scope.condition.clone();

    let raws: Vec<RawOffer> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "{OFFER_SELECT}
           WHERE o.active = 1
             AND o.product_id IN rarray(?1)
             AND s.match_key IN rarray(?2)
             AND o.condition = ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![id_array(&ids), text_array(&store_keys), condition],
            RawOffer::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawOffer::into_offer).collect()
  }

  async fn all_offers(&self, product_id: ProductId) -> Result<Vec<Offer>> {
    let raws: Vec<RawOffer> = self
      .conn
      .call(move |conn| {
        let sql = format!("{OFFER_SELECT} WHERE o.product_id = ?1 ORDER BY o.offer_id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![product_id], RawOffer::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawOffer::into_offer).collect()
  }

  async fn get_specs<'a>(&'a self, ids: &'a [ProductId]) -> Result<Vec<ProductSpecs>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let ids = ids.to_vec();

    let raws: Vec<RawSpecs> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT product_id, specs_json, last_updated FROM product_specs
           WHERE product_id IN rarray(?1)
           ORDER BY product_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_array(&ids)], |row| {
            Ok(RawSpecs {
              product_id:   row.get(0)?,
              specs_json:   row.get(1)?,
              last_updated: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSpecs::into_specs).collect()
  }
}
