//! Background expiry sweep
//!
//! `MemoryStore` already hides expired entries on access; the sweep keeps
//! memory bounded when keys are written once and never touched again (login
//! counters from one-off clients, refresh tokens nobody redeems).

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::ephemeral::MemoryStore;

/// Spawn a task that purges expired entries every `interval`.
pub fn spawn_sweep_task(store: Arc<MemoryStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick, nothing can have expired yet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_cycle(&store).await;
        }
    })
}

async fn sweep_cycle(store: &MemoryStore) {
    let purged = store.purge_expired().await;
    if purged > 0 {
        debug!(purged, "swept expired ephemeral entries");
    }
}
