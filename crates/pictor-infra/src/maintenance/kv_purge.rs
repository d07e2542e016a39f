use std::sync::Arc;
use std::time::Duration;

use pictor_db::PgKeyValueStore;
use tokio::time::{interval, MissedTickBehavior};

/// Periodically deletes expired `kv_entries` rows.
///
/// Reads already ignore expired rows, so a missed run only costs table space.
#[derive(Clone)]
pub struct KvPurgeTask {
    store: PgKeyValueStore,
    every: Duration,
}

impl KvPurgeTask {
    pub fn new(store: PgKeyValueStore, every: Duration) -> Self {
        Self { store, every }
    }

    /// Start the purge loop. Returns a JoinHandle for graceful shutdown.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match self.store.purge_expired().await {
                    Ok(0) => tracing::trace!("No expired kv entries to purge"),
                    Ok(count) => tracing::debug!(count, "Purged expired kv entries"),
                    Err(e) => tracing::warn!(error = %e, "Failed to purge expired kv entries"),
                }
            }
        })
    }
}
