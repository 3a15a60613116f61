//! Background reclamation of expired store entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::MemoryStore;

/// Periodically purge expired entries from `store` until `shutdown` flips to `true`.
///
/// Expiry is already enforced lazily on access; the sweep only bounds memory
/// held by keys that are never touched again.
pub fn spawn_expiry_sweeper<V>(
    store: Arc<MemoryStore<V>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = store.purge_expired();
                    if purged > 0 {
                        debug!(purged, remaining = store.len(), "Purged expired entries");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    })
}
