//! Periodic ingestion.
//!
//! [`IngestScheduler`] runs one reconciliation as soon as it starts and then
//! one per interval until stopped. On-demand runs go straight through
//! [`Reconciler::run`] and may overlap with a scheduled run; every write is
//! an upsert by natural key, so overlapping runs are safe (last write wins).

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use crate::{feed::FeedSource, reconcile::Reconciler, store::CatalogStore};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Owns the configuration of the periodic ingestion task.
pub struct IngestScheduler<S, F> {
  reconciler: Arc<Reconciler<S>>,
  source:     Arc<F>,
  interval:   Duration,
}

impl<S, F> IngestScheduler<S, F>
where
  S: CatalogStore + 'static,
  F: FeedSource + 'static,
{
  /// A zero `interval` is raised to one millisecond.
  pub fn new(reconciler: Arc<Reconciler<S>>, source: Arc<F>, interval: Duration) -> Self {
    Self { reconciler, source, interval: interval.max(Duration::from_millis(1)) }
  }

  /// Spawn the task on the current tokio runtime.
  pub fn start(self) -> IngestHandle {
    let (shutdown, mut stop) = watch::channel(false);
    let Self { reconciler, source, interval } = self;
    tracing::info!(
      source = %source.describe(),
      interval_secs = interval.as_secs(),
      "ingestion scheduler started"
    );

    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        tokio::select! {
          _ = ticker.tick() => {
            // Decode failures are already logged by the reconciler.
            let _ = reconciler.run(source.as_ref()).await;
          }
          changed = stop.changed() => {
            if changed.is_err() || *stop.borrow() {
              break;
            }
          }
        }
      }
      tracing::info!("ingestion scheduler stopped");
    });

    IngestHandle { shutdown, task }
  }
}

/// Handle to a running [`IngestScheduler`].
///
/// A run in progress when [`stop`](Self::stop) is called is allowed to
/// finish.
pub struct IngestHandle {
  shutdown: watch::Sender<bool>,
  task:     JoinHandle<()>,
}

impl IngestHandle {
  /// Signal the task to stop and wait for it.
  pub async fn stop(self) {
    let _ = self.shutdown.send(true);
    if let Err(err) = self.task.await {
      tracing::warn!(error = %err, "ingestion task ended abnormally");
    }
  }
}
