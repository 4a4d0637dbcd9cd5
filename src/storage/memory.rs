//! In-Memory Expiring Map Backend
//!
//! Reference implementation of the storage contract: a sharded concurrent
//! map plus one background sweep task per backend instance.
//!
//! Reads never check expiry. An entry whose deadline has passed stays
//! visible to `has`/`get`/`mget` until the next sweep tick removes it; the
//! contract promises eventual removal within one sweep interval, not strict
//! per-access enforcement.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{KvError, Result};

use super::contract::{validate_keys, Storage};
use super::sweep::Sweeper;
use super::Item;

/// Stored representation of an item inside one backend.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) value: Bytes,
    pub(crate) expires_at: Option<DateTime<Utc>>,
}

fn default_sweep_interval_ms() -> u64 {
    500
}

/// Configuration for the in-memory driver.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Sweep tick interval in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

/// In-process expiring key-value store.
///
/// The heap is shared between caller operations and the sweep task; DashMap
/// shard locks keep both sides from ever blocking on a whole-map lock.
#[derive(Debug)]
pub struct MemoryStorage {
    heap: Arc<DashMap<String, Entry>>,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStorage {
    /// Create the backend and start its sweep task.
    pub fn open(config: &MemoryConfig) -> Self {
        let shards = (num_cpus::get() * 4).next_power_of_two();
        let heap = Arc::new(DashMap::with_shard_amount(shards));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let sweeper = Sweeper::spawn(
            heap.clone(),
            Duration::from_millis(config.sweep_interval_ms),
            shutdown_rx,
        );

        Self {
            heap,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Number of entries currently held, swept or not.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn has(&self, keys: &[String]) -> Result<HashMap<String, bool>> {
        validate_keys(keys)?;

        let mut m = HashMap::new();
        for key in keys {
            if self.heap.contains_key(key) {
                m.insert(key.clone(), true);
            }
        }
        Ok(m)
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        // catches keys like "  "
        if key.trim().is_empty() {
            return Err(KvError::EmptyKey);
        }
        Ok(self.heap.get(key).map(|entry| entry.value.clone()))
    }

    async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Bytes>> {
        validate_keys(keys)?;

        let mut m = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.heap.get(key) {
                m.insert(key.clone(), entry.value.clone());
            }
        }
        Ok(m)
    }

    async fn set(&self, items: &[Item]) -> Result<()> {
        if items.is_empty() {
            return Err(KvError::NoKeys);
        }

        for item in items {
            if item.is_empty() {
                return Err(KvError::EmptyItem);
            }
            if item.key.trim().is_empty() {
                return Err(KvError::EmptyKey);
            }
            // parse before insert so a malformed TTL never commits the item
            let expires_at = item.expires_at()?;

            self.heap.insert(
                item.key.clone(),
                Entry {
                    value: item.value.clone(),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn mexpire(&self, items: &[Item]) -> Result<()> {
        for item in items {
            if item.ttl.is_empty() || item.key.trim().is_empty() {
                return Err(KvError::EmptyTtl);
            }
            let expires_at = item.expires_at()?;

            // keys not already present are ignored; only the deadline moves
            if let Some(mut entry) = self.heap.get_mut(&item.key) {
                entry.expires_at = expires_at;
            }
        }
        Ok(())
    }

    async fn ttl(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        validate_keys(keys)?;

        let mut m = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.heap.get(key) {
                if let Some(deadline) = entry.expires_at {
                    m.insert(key.clone(), deadline.to_rfc3339());
                }
            }
        }
        Ok(m)
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        validate_keys(keys)?;

        for key in keys {
            self.heap.remove(key);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // ignore send errors: on a second close the task is already gone
        let _ = self.shutdown.send(true);

        let sweeper = self.sweeper.lock().take();
        if let Some(handle) = sweeper {
            if handle.await.is_err() {
                warn!("sweeper task panicked during shutdown");
            }
        }

        self.heap.clear();
        Ok(())
    }
}
