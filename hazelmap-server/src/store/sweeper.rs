//! Background purge of expired entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::EntryStore;

/// Periodically purges expired entries of a store.
///
/// Reads already treat expired entries as absent; the sweep makes sure
/// entries nobody reads again are still dropped and their `Expired` event
/// published. The task stops when the sweeper is shut down or dropped.
#[derive(Debug)]
pub struct ExpirySweeper {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Spawns the sweep task on the current tokio runtime.
    ///
    /// Outside a runtime no task is spawned and expired entries are purged on
    /// access only.
    pub fn spawn(store: Arc<EntryStore>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(run(store, interval, cancel.clone()))),
            Err(_) => {
                tracing::warn!(
                    map = %store.name(),
                    "no tokio runtime; expiry sweep disabled"
                );
                None
            }
        };
        Self { cancel, handle }
    }

    /// Returns `true` while the sweep task is running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the sweep task and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(store: Arc<EntryStore>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(map = %store.name(), purged, "purged expired entries");
                }
            }
        }
    }
    tracing::trace!(map = %store.name(), "expiry sweep stopped");
}
