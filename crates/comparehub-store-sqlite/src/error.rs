//! Error type for `comparehub-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("decimal parse error: {0}")]
  Decimal(#[from] rust_decimal::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A write that must return a row returned none.
  #[error("{0} row missing after write")]
  MissingRow(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
