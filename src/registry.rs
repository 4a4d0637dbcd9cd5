//! Storage Registry and Dispatch
//!
//! Named backend instances built once at startup, looked up by logical
//! name, with concurrent fan-out of writes across several backends.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::config::DriverConfig;
use crate::error::{KvError, Result};
use crate::storage::{FileStorage, Item, MemoryStorage, Storage};

/// Immutable-after-init map from logical store name to backend instance.
///
/// The registry owns routing only: backends are created here from their
/// driver configuration and their lifecycle ends when `close`/`close_all`
/// routes the contract's `close` to them.
#[derive(Debug)]
pub struct Registry {
    storages: HashMap<String, Arc<dyn Storage>>,
}

impl Registry {
    /// Instantiate every configured driver and register it under its name.
    pub fn open(configs: &HashMap<String, DriverConfig>) -> Result<Self> {
        if configs.is_empty() {
            return Err(KvError::NoConfig);
        }

        let mut storages: HashMap<String, Arc<dyn Storage>> = HashMap::new();
        for (name, driver) in configs {
            driver.validate()?;
            let storage: Arc<dyn Storage> = match driver {
                DriverConfig::Memory(cfg) => Arc::new(MemoryStorage::open(cfg)),
                DriverConfig::File(cfg) => Arc::new(FileStorage::open(cfg)?),
            };
            info!(storage = %name, driver = driver.kind(), "registered storage backend");
            storages.insert(name.clone(), storage);
        }

        Ok(Self { storages })
    }

    /// Build a registry from pre-constructed backends.
    pub fn with_storages(storages: HashMap<String, Arc<dyn Storage>>) -> Result<Self> {
        if storages.is_empty() {
            return Err(KvError::NoConfig);
        }
        Ok(Self { storages })
    }

    /// Resolve a logical name to its backend.
    pub fn get(&self, name: &str) -> Result<&Arc<dyn Storage>> {
        self.storages
            .get(name)
            .ok_or_else(|| KvError::UnknownStorage(name.to_string()))
    }

    /// Registered storage names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.storages.keys().map(|name| name.as_str())
    }

    /// Fan a batch of items out to every named backend concurrently.
    ///
    /// Every target name is resolved before any write starts, so a typo'd
    /// name fails the request with zero mutations. One independent task runs
    /// per backend; all tasks are awaited regardless of individual outcomes
    /// and the first error encountered is reported. Partial success across
    /// backends is possible and is not rolled back.
    pub async fn set_all(&self, targets: &[String], items: &[Item]) -> Result<()> {
        if targets.is_empty() {
            return Err(KvError::NoStorages);
        }

        let mut backends = Vec::with_capacity(targets.len());
        for name in targets {
            backends.push((name.clone(), self.get(name)?.clone()));
        }

        let tasks: Vec<_> = backends
            .into_iter()
            .map(|(name, backend)| {
                let items = items.to_vec();
                tokio::spawn(async move {
                    let result = backend.set(&items).await;
                    (name, result)
                })
            })
            .collect();

        let mut first_err = None;
        for joined in join_all(tasks).await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(e))) => {
                    warn!(storage = %name, error = %e, "fan-out set failed");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "fan-out task aborted");
                    if first_err.is_none() {
                        first_err = Some(KvError::Engine(e.to_string()));
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Route `close` to one backend.
    pub async fn close(&self, name: &str) -> Result<()> {
        self.get(name)?.close().await
    }

    /// Close every backend, logging rather than propagating failures so one
    /// stuck backend cannot keep the rest from shutting down.
    pub async fn close_all(&self) {
        for (name, storage) in &self.storages {
            if let Err(e) = storage.close().await {
                warn!(storage = %name, error = %e, "error closing storage");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryConfig;
    use async_trait::async_trait;
    use bytes::Bytes;

    /// Backend whose engine is unreachable.
    #[derive(Debug)]
    struct UnreachableStorage;

    #[async_trait]
    impl Storage for UnreachableStorage {
        async fn has(&self, _keys: &[String]) -> Result<HashMap<String, bool>> {
            Err(KvError::Engine("connection refused".to_string()))
        }
        async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
            Err(KvError::Engine("connection refused".to_string()))
        }
        async fn mget(&self, _keys: &[String]) -> Result<HashMap<String, Bytes>> {
            Err(KvError::Engine("connection refused".to_string()))
        }
        async fn set(&self, _items: &[Item]) -> Result<()> {
            Err(KvError::Engine("connection refused".to_string()))
        }
        async fn mexpire(&self, _items: &[Item]) -> Result<()> {
            Err(KvError::Engine("connection refused".to_string()))
        }
        async fn ttl(&self, _keys: &[String]) -> Result<HashMap<String, String>> {
            Err(KvError::Unsupported("ttl"))
        }
        async fn delete(&self, _keys: &[String]) -> Result<()> {
            Err(KvError::Engine("connection refused".to_string()))
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn memory() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::open(&MemoryConfig::default()))
    }

    fn registry_of(entries: Vec<(&str, Arc<dyn Storage>)>) -> Registry {
        let storages = entries
            .into_iter()
            .map(|(name, storage)| (name.to_string(), storage))
            .collect();
        Registry::with_storages(storages).unwrap()
    }

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_registry_rejected() {
        let err = Registry::with_storages(HashMap::new()).unwrap_err();
        assert!(matches!(err, KvError::NoConfig));

        let err = Registry::open(&HashMap::new()).unwrap_err();
        assert!(matches!(err, KvError::NoConfig));
    }

    #[tokio::test]
    async fn test_unknown_storage() {
        let registry = registry_of(vec![("hot", memory())]);
        let err = registry.get("cold").unwrap_err();
        assert!(matches!(err, KvError::UnknownStorage(name) if name == "cold"));
    }

    #[tokio::test]
    async fn test_fan_out_reaches_all_backends() {
        let registry = registry_of(vec![("a", memory()), ("b", memory())]);
        registry
            .set_all(&targets(&["a", "b"]), &[Item::new("key", "value")])
            .await
            .unwrap();

        for name in ["a", "b"] {
            let value = registry.get(name).unwrap().get("key").await.unwrap();
            assert_eq!(value, Some(Bytes::from_static(b"value")));
        }
    }

    #[tokio::test]
    async fn test_fan_out_partial_failure_reports_error() {
        let registry = registry_of(vec![
            ("a", memory()),
            ("b", memory()),
            ("down", Arc::new(UnreachableStorage)),
        ]);

        let err = registry
            .set_all(&targets(&["a", "down", "b"]), &[Item::new("key", "value")])
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::Engine(_)));

        // the healthy backends still hold the item
        for name in ["a", "b"] {
            let value = registry.get(name).unwrap().get("key").await.unwrap();
            assert_eq!(value, Some(Bytes::from_static(b"value")));
        }
    }

    #[tokio::test]
    async fn test_fan_out_unknown_target_writes_nothing() {
        let registry = registry_of(vec![("a", memory())]);

        let err = registry
            .set_all(&targets(&["a", "typo"]), &[Item::new("key", "value")])
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::UnknownStorage(_)));

        // resolution happens before any write
        let value = registry.get("a").unwrap().get("key").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_fan_out_requires_targets() {
        let registry = registry_of(vec![("a", memory())]);
        let err = registry.set_all(&[], &[Item::new("k", "v")]).await.unwrap_err();
        assert!(matches!(err, KvError::NoStorages));
    }

    #[tokio::test]
    async fn test_ttl_unsupported_passthrough() {
        let registry = registry_of(vec![("down", Arc::new(UnreachableStorage) as Arc<dyn Storage>)]);
        let err = registry
            .get("down")
            .unwrap()
            .ttl(&targets(&["key"]))
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::Unsupported("ttl")));
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = registry_of(vec![("a", memory()), ("b", memory())]);
        registry.close_all().await;
        registry.close("a").await.unwrap();
    }
}
