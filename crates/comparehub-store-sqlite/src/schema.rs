//! SQL schema for the CompareHub SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS products (
    product_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    brand       TEXT NOT NULL DEFAULT '',
    category    TEXT NOT NULL DEFAULT 'Other',  -- always normalized
    description TEXT NOT NULL DEFAULT '',
    image_url   TEXT NOT NULL DEFAULT '',
    UNIQUE (name, brand)
);

CREATE TABLE IF NOT EXISTS stores (
    store_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL UNIQUE,
    match_key TEXT NOT NULL       -- lower-cased, whitespace removed
);

-- price and rating are decimal strings.
CREATE TABLE IF NOT EXISTS offers (
    offer_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL REFERENCES products(product_id),
    store_id   INTEGER NOT NULL REFERENCES stores(store_id),
    price      TEXT NOT NULL CHECK (CAST(price AS REAL) > 0),
    rating     TEXT CHECK (rating IS NULL OR CAST(rating AS REAL) BETWEEN 0 AND 5),
    url        TEXT NOT NULL,
    condition  TEXT NOT NULL DEFAULT 'New',
    active     INTEGER NOT NULL DEFAULT 1,
    last_seen  TEXT NOT NULL,     -- fixed-width RFC 3339 UTC, sortable as text
    UNIQUE (product_id, store_id, url)
);

CREATE TABLE IF NOT EXISTS product_specs (
    product_id   INTEGER PRIMARY KEY REFERENCES products(product_id),
    specs_json   TEXT NOT NULL,
    last_updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS stores_match_key_idx ON stores(match_key);
CREATE INDEX IF NOT EXISTS offers_product_idx   ON offers(product_id);
CREATE INDEX IF NOT EXISTS offers_last_seen_idx ON offers(last_seen) WHERE active = 1;

PRAGMA user_version = 1;
";
