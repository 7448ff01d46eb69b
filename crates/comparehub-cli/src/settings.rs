//! Runtime settings, layered from an optional TOML file and `COMPAREHUB_*`
//! environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use comparehub_core::{reconcile::DEFAULT_STALENESS_WINDOW, schedule::DEFAULT_SYNC_INTERVAL};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  #[serde(default = "default_store_path")]
  pub store_path:            PathBuf,
  #[serde(default = "default_feed_path")]
  pub feed_path:             PathBuf,
  /// The `run` daemon refuses to start unless this is set.
  #[serde(default)]
  pub sync_enabled:          bool,
  #[serde(default = "default_sync_interval")]
  pub sync_interval_secs:    u64,
  #[serde(default = "default_staleness_window")]
  pub staleness_window_secs: u64,
}

fn default_store_path() -> PathBuf { PathBuf::from("comparehub.db") }

fn default_feed_path() -> PathBuf { PathBuf::from("feed.json") }

fn default_sync_interval() -> u64 { DEFAULT_SYNC_INTERVAL.as_secs() }

fn default_staleness_window() -> u64 { DEFAULT_STALENESS_WINDOW.as_secs() }

impl Settings {
  /// Read `path` (if it exists) and overlay the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings: Settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("COMPAREHUB"))
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?
      .try_deserialize()
      .context("failed to deserialise settings")?;

    Ok(Self {
      store_path: expand_tilde(&settings.store_path),
      feed_path: expand_tilde(&settings.feed_path),
      ..settings
    })
  }

  pub fn sync_interval(&self) -> Duration { Duration::from_secs(self.sync_interval_secs) }

  pub fn staleness_window(&self) -> Duration { Duration::from_secs(self.staleness_window_secs) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let settings = Settings::load(Path::new("/nonexistent/comparehub.toml")).unwrap();
    assert_eq!(settings.sync_interval(), Duration::from_secs(120));
    assert_eq!(settings.staleness_window(), Duration::from_secs(600));
  }

  #[test]
  fn tilde_is_expanded() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(
      expand_tilde(Path::new("~/data/catalog.db")),
      PathBuf::from(home).join("data/catalog.db")
    );
    assert_eq!(expand_tilde(Path::new("/abs/x.db")), PathBuf::from("/abs/x.db"));
  }
}
