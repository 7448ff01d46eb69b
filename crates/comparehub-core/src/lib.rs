//! Core types and engine for the CompareHub offer catalog.
//!
//! This crate holds the reconciliation engine (feed decoding, upserts,
//! staleness sweep) and the offer resolver used by every read path. It is
//! free of database and HTTP dependencies; storage backends implement
//! [`store::CatalogStore`].

pub mod catalog;
pub mod category;
pub mod clock;
pub mod error;
pub mod feed;
pub mod filter;
pub mod query;
pub mod reconcile;
pub mod resolve;
pub mod schedule;
pub mod store;

pub use error::{DecodeError, Error, Result, UpsertError, ValueError};
