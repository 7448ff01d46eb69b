//! `comparehub`: ingestion daemon and catalog queries.
//!
//! Reads `comparehub.toml` (or the path given with `--config`) and
//! `COMPAREHUB_*` environment variables, opens the SQLite catalog and runs
//! one command. Query commands print JSON on stdout.
//!
//! # Usage
//!
//! ```
//! comparehub run
//! comparehub sync --feed ./feed.json
//! comparehub products --category laptops --sort high --stores "Amazon,Best Buy"
//! comparehub compare 7,9 --condition refurbished
//! ```

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use comparehub_core::{
  catalog::{NewProduct, SpecValue},
  clock::SystemClock,
  feed::FileFeed,
  filter::{DEFAULT_PAGE_SIZE, OfferFilter, Page, SortMode, parse_store_list},
  query::{AdminOffer, Catalog, DEFAULT_TOP_DEALS},
  reconcile::Reconciler,
  schedule::IngestScheduler,
  store::ProductQuery,
};
use comparehub_store_sqlite::SqliteCatalog;
use rust_decimal::Decimal;
use serde::Serialize;
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "comparehub", version, about = "CompareHub catalog engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "comparehub.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run the periodic ingestion daemon until interrupted.
  Run,

  /// Reconcile the feed once and print the report.
  Sync {
    /// Feed file; defaults to `feed_path` from the settings.
    #[arg(long)]
    feed: Option<PathBuf>,
  },

  /// List products with their best offers.
  Products {
    /// Case-insensitive text matched against name and brand.
    #[arg(short, long)]
    query:     Option<String>,
    #[arg(long)]
    category:  Option<String>,
    #[arg(long)]
    brand:     Option<String>,
    /// low, high or rating.
    #[arg(long, default_value_t = SortMode::PriceAsc)]
    sort:      SortMode,
    #[arg(long, default_value_t = 1)]
    page:      u32,
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,
    #[command(flatten)]
    filter:    FilterArgs,
  },

  /// Show one product with its offers and specs.
  Product {
    id:     i64,
    #[command(flatten)]
    filter: FilterArgs,
  },

  /// List the matching offers of a product, best first.
  Offers {
    id:     i64,
    #[command(flatten)]
    filter: FilterArgs,
  },

  /// Compare two or more products side by side.
  Compare {
    /// Comma-separated product ids.
    #[arg(value_delimiter = ',', num_args = 1..)]
    ids:    Vec<i64>,
    #[command(flatten)]
    filter: FilterArgs,
  },

  /// Cheapest products that have a matching offer.
  TopDeals {
    #[arg(long, default_value_t = DEFAULT_TOP_DEALS)]
    limit:  usize,
    #[command(flatten)]
    filter: FilterArgs,
  },

  /// Insert or update a product by name and brand.
  AddProduct {
    #[arg(long)]
    name:        String,
    #[arg(long, default_value = "")]
    brand:       String,
    #[arg(long, default_value = "")]
    category:    String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "")]
    image_url:   String,
  },

  /// Insert or refresh an offer for an existing product.
  AddOffer {
    #[arg(long)]
    product_id: i64,
    #[arg(long)]
    store:      String,
    #[arg(long)]
    price:      Decimal,
    #[arg(long)]
    rating:     Option<Decimal>,
    #[arg(long)]
    url:        String,
    #[arg(long)]
    condition:  Option<String>,
  },

  /// Replace the specs of a product with a JSON document.
  SetSpecs {
    id:   i64,
    /// Inline JSON, or `@path` to read it from a file.
    json: String,
  },
}

/// Offer filter flags shared by the read commands.
#[derive(Args)]
struct FilterArgs {
  /// Comma-separated store names; defaults to the built-in allow-list.
  #[arg(long)]
  stores:     Option<String>,
  /// Offer condition; defaults to New.
  #[arg(long)]
  condition:  Option<String>,
  #[arg(long)]
  min_price:  Option<Decimal>,
  #[arg(long)]
  max_price:  Option<Decimal>,
  #[arg(long)]
  min_rating: Option<Decimal>,
}

impl From<FilterArgs> for OfferFilter {
  fn from(args: FilterArgs) -> Self {
    Self {
      stores:     args.stores.as_deref().map(parse_store_list).unwrap_or_default(),
      condition:  args.condition,
      min_price:  args.min_price,
      max_price:  args.max_price,
      min_rating: args.min_rating,
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store = SqliteCatalog::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open catalog at {:?}", settings.store_path))?;
  let reconciler = Reconciler::new(Arc::new(store), Arc::new(SystemClock))
    .with_staleness_window(settings.staleness_window());
  let catalog = Catalog::new(Arc::new(reconciler));

  match cli.command {
    Command::Run => run_daemon(&settings, &catalog).await?,
    Command::Sync { feed } => {
      let feed = FileFeed::new(feed.unwrap_or_else(|| settings.feed_path.clone()));
      let report = catalog
        .trigger_reconcile(&feed)
        .await
        .with_context(|| format!("sync from {} failed", feed.path().display()))?;
      print_json(&report)?;
    }
    Command::Products { query, category, brand, sort, page, page_size, filter } => {
      let query = ProductQuery { text: query, category, brand };
      let rows = catalog
        .list_products(&query, &filter.into(), sort, Page::new(page, page_size))
        .await?;
      print_json(&rows)?;
    }
    Command::Product { id, filter } => {
      print_json(&catalog.get_product(id, &filter.into()).await?)?;
    }
    Command::Offers { id, filter } => {
      print_json(&catalog.get_offers(id, &filter.into()).await?)?;
    }
    Command::Compare { ids, filter } => {
      print_json(&catalog.compare_products(&ids, &filter.into()).await?)?;
    }
    Command::TopDeals { limit, filter } => {
      print_json(&catalog.top_deals(&filter.into(), limit).await?)?;
    }
    Command::AddProduct { name, brand, category, description, image_url } => {
      let product = catalog
        .add_product(NewProduct { name, brand, category, description, image_url })
        .await?;
      print_json(&product)?;
    }
    Command::AddOffer { product_id, store, price, rating, url, condition } => {
      let offer = catalog
        .add_offer(AdminOffer { product_id, store_name: store, price, rating, url, condition })
        .await?;
      print_json(&offer)?;
    }
    Command::SetSpecs { id, json } => {
      let raw = match json.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
          .with_context(|| format!("reading specs file {path}"))?,
        None => json,
      };
      let specs: SpecValue = serde_json::from_str(&raw).context("specs are not valid json")?;
      print_json(&catalog.upsert_specs(id, specs).await?)?;
    }
  }

  Ok(())
}

/// Run the scheduler until Ctrl-C.
async fn run_daemon(settings: &Settings, catalog: &Catalog<SqliteCatalog>) -> anyhow::Result<()> {
  if !settings.sync_enabled {
    tracing::warn!("sync is disabled; set sync_enabled = true or COMPAREHUB_SYNC_ENABLED=true");
    return Ok(());
  }

  let feed = Arc::new(FileFeed::new(settings.feed_path.clone()));
  let handle = IngestScheduler::new(
    Arc::clone(catalog.reconciler()),
    feed,
    settings.sync_interval(),
  )
  .start();

  tokio::signal::ctrl_c()
    .await
    .context("failed to listen for ctrl-c")?;
  tracing::info!("shutting down");
  handle.stop().await;
  Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  let out = serde_json::to_string_pretty(value).context("failed to encode output")?;
  println!("{out}");
  Ok(())
}
