//! Storage Contract
//!
//! The operation set every backend implements, addressed through the
//! registry by logical name. Operations are async so networked adapters can
//! block on IO; cancellation is dropping the future, and the gateway applies
//! its request deadline with `tokio::time::timeout`.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{KvError, Result};

use super::Item;

/// One abstract key-value storage.
///
/// Missing keys are data, not failures: `get` returns `None` and the
/// multi-key reads omit absent keys from their result maps. Expired entries
/// are removed eventually by a background sweep, not on access, so a key
/// whose TTL has passed may still read as present until the next sweep tick.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Check which of the given keys are present.
    ///
    /// Present keys map to `true`; absent keys are omitted from the map.
    async fn has(&self, keys: &[String]) -> Result<HashMap<String, bool>>;

    /// Load the value stored under `key`, or `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Load multiple values. Keys with no stored value are omitted.
    async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Bytes>>;

    /// Upsert each item, last writer wins.
    ///
    /// Items are validated one at a time before they mutate state; the batch
    /// is not atomic, so items ahead of a failing one stay committed.
    async fn set(&self, items: &[Item]) -> Result<()>;

    /// Overwrite the expiry of the keys named by each item.
    ///
    /// The item's value field is ignored and the stored value is retained.
    /// Keys that are not present are silently ignored.
    async fn mexpire(&self, items: &[Item]) -> Result<()>;

    /// Report the expiry timestamp for each key that exists and has a TTL.
    ///
    /// Keys without a TTL, like absent keys, are omitted. Backends without
    /// TTL introspection fail every call with `KvError::Unsupported`.
    async fn ttl(&self, keys: &[String]) -> Result<HashMap<String, String>>;

    /// Remove the named keys. Absent keys are not an error.
    async fn delete(&self, keys: &[String]) -> Result<()>;

    /// Release backend resources and stop the background sweep, waiting for
    /// the sweep task to exit. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Validate a key list before any lookup or mutation happens.
///
/// Rejects an empty list with `NoKeys` and any key that trims to the empty
/// string with `EmptyKey`. Trimming is validation-only; stored keys keep
/// their original form.
pub fn validate_keys(keys: &[String]) -> Result<()> {
    if keys.is_empty() {
        return Err(KvError::NoKeys);
    }
    for key in keys {
        if key.trim().is_empty() {
            return Err(KvError::EmptyKey);
        }
    }
    Ok(())
}
