//! Error types for `comparehub-core`.

use std::fmt;

use thiserror::Error;

use crate::catalog::ProductId;

#[derive(Debug, Error)]
pub enum Error {
  #[error("feed decode failed: {0}")]
  Decode(#[from] DecodeError),

  #[error("product not found: {0}")]
  NotFound(ProductId),

  #[error("invalid request: {0}")]
  Validation(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why a feed payload could not be turned into a [`Feed`](crate::feed::Feed).
///
/// Any of these aborts the ingestion run before the catalog is touched.
#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("feed is empty")]
  Empty,

  #[error("feed is not valid json: {0}")]
  Malformed(#[source] serde_json::Error),

  #[error("feed does not match the expected shape: {0}")]
  SchemaMismatch(#[source] serde_json::Error),

  #[error("feed could not be read: {0}")]
  Unreadable(#[from] std::io::Error),
}

impl DecodeError {
  /// Short machine-friendly reason tag.
  pub fn reason(&self) -> &'static str {
    match self {
      Self::Empty => "empty",
      Self::Malformed(_) => "malformed",
      Self::SchemaMismatch(_) => "schema-mismatch",
      Self::Unreadable(_) => "unreadable",
    }
  }

  /// Whether re-reading the source might produce a different result.
  pub(crate) fn is_transient(&self) -> bool {
    matches!(self, Self::Empty | Self::Malformed(_))
  }
}

/// Which catalog row an [`UpsertError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
  Product,
  Store,
  Offer,
}

impl fmt::Display for Entity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Product => "product",
      Self::Store => "store",
      Self::Offer => "offer",
    })
  }
}

/// A storage failure on a single row during reconciliation.
///
/// Never fatal to a run: the item is skipped and reported.
#[derive(Debug, Error)]
#[error("{entity} upsert failed: {source}")]
pub struct UpsertError {
  pub entity: Entity,
  #[source]
  pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl UpsertError {
  pub fn new<E>(entity: Entity, source: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self { entity, source: Box::new(source) }
  }
}

/// A feed number that has no exact catalog representation.
#[derive(Debug, Error)]
#[error("{field} {value} cannot be represented as a decimal")]
pub struct ValueError {
  pub field: &'static str,
  pub value: serde_json::Number,
}
