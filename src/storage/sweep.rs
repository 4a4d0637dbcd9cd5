//! Expiry Sweep
//!
//! Background task that periodically removes expired entries from a
//! backend's heap. Expiry is judged against a single instant captured at
//! the start of each pass, so every entry in one sweep sees the same "now".

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

use super::memory::Entry;

/// Periodic expiry scan over a shared entry heap.
///
/// The sweeper never holds a global lock for a full scan: `retain` works
/// shard by shard, so callers contend at most on the shard currently being
/// inspected. Shutdown arrives on a watch channel and the owning backend
/// joins the task handle before its `close` returns.
pub(crate) struct Sweeper {
    heap: Arc<DashMap<String, Entry>>,
    interval: Duration,
}

impl Sweeper {
    pub(crate) fn new(heap: Arc<DashMap<String, Entry>>, interval: Duration) -> Self {
        Self { heap, interval }
    }

    /// Run the sweep loop until the shutdown signal flips.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        debug!(interval = ?self.interval, "sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let removed = self.sweep_once();
                    if removed > 0 {
                        debug!(removed, "swept expired entries");
                    }
                }
            }
        }
    }

    /// One pass: capture "now", drop every entry expired strictly before it.
    fn sweep_once(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        self.heap.retain(|_, entry| match entry.expires_at {
            Some(deadline) if deadline < now => {
                removed += 1;
                false
            }
            _ => true,
        });
        removed
    }

    /// Spawn the sweep loop as a background task.
    pub(crate) fn spawn(
        heap: Arc<DashMap<String, Entry>>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let sweeper = Self::new(heap, interval);
        tokio::spawn(sweeper.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Duration as ChronoDuration;

    fn entry(expires_at: Option<chrono::DateTime<Utc>>) -> Entry {
        Entry {
            value: Bytes::from_static(b"v"),
            expires_at,
        }
    }

    #[test]
    fn test_sweep_once_removes_only_expired() {
        let heap = Arc::new(DashMap::new());
        heap.insert("dead".to_string(), entry(Some(Utc::now() - ChronoDuration::seconds(5))));
        heap.insert("live".to_string(), entry(Some(Utc::now() + ChronoDuration::seconds(60))));
        heap.insert("forever".to_string(), entry(None));

        let sweeper = Sweeper::new(heap.clone(), Duration::from_millis(500));
        assert_eq!(sweeper.sweep_once(), 1);

        assert!(!heap.contains_key("dead"));
        assert!(heap.contains_key("live"));
        assert!(heap.contains_key("forever"));
    }
}
