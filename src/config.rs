//! Service Configuration
//!
//! One TOML document configures the gateway and every named storage. Each
//! `[storages.<name>]` table is tagged with its driver and carries that
//! driver's own parameters. Correctness-critical fields have no fallback:
//! a missing bucket fails validation instead of guessing a default.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1"
//! port = 6390
//!
//! [storages.sessions]
//! driver = "memory"
//! sweep_interval_ms = 500
//!
//! [storages.assets]
//! driver = "file"
//! dir = "./data"
//! bucket = "assets"
//! ```

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{KvError, Result};
use crate::server;
use crate::storage::{FileConfig, MemoryConfig};

/// Driver-specific configuration, tagged by driver kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum DriverConfig {
    Memory(MemoryConfig),
    File(FileConfig),
}

impl DriverConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            DriverConfig::Memory(_) => "memory",
            DriverConfig::File(_) => "file",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            DriverConfig::Memory(_) => Ok(()),
            DriverConfig::File(cfg) => cfg.validate(),
        }
    }
}

/// Whole-service configuration: gateway plus named storages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: server::Config,

    #[serde(default)]
    pub storages: HashMap<String, DriverConfig>,
}

impl ServiceConfig {
    /// Parse a TOML document. Validation is a separate step so callers can
    /// apply command-line overrides in between.
    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Reject configurations the registry cannot be built from.
    pub fn validate(&self) -> Result<()> {
        if self.storages.is_empty() {
            return Err(KvError::NoConfig);
        }
        for driver in self.storages.values() {
            driver.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let raw = r#"
            [server]
            bind = "127.0.0.1"
            port = 7000
            request_timeout_secs = 5

            [storages.sessions]
            driver = "memory"
            sweep_interval_ms = 250

            [storages.assets]
            driver = "file"
            dir = "./data"
            file = "assets.db"
            bucket = "assets"
        "#;

        let config = ServiceConfig::from_toml(raw).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.request_timeout_secs, 5);
        assert_eq!(config.storages.len(), 2);

        match &config.storages["sessions"] {
            DriverConfig::Memory(cfg) => assert_eq!(cfg.sweep_interval_ms, 250),
            other => panic!("wrong driver: {}", other.kind()),
        }
        match &config.storages["assets"] {
            DriverConfig::File(cfg) => assert_eq!(cfg.bucket, "assets"),
            other => panic!("wrong driver: {}", other.kind()),
        }
    }

    #[test]
    fn test_defaults_fill_in() {
        let raw = r#"
            [storages.cache]
            driver = "memory"
        "#;

        let config = ServiceConfig::from_toml(raw).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.port, server::Config::default().port);
        match &config.storages["cache"] {
            DriverConfig::Memory(cfg) => assert_eq!(cfg.sweep_interval_ms, 500),
            other => panic!("wrong driver: {}", other.kind()),
        }
    }

    #[test]
    fn test_no_storages_rejected() {
        let config = ServiceConfig::from_toml("").unwrap();
        assert!(matches!(config.validate(), Err(KvError::NoConfig)));
    }

    #[test]
    fn test_file_driver_requires_bucket() {
        let raw = r#"
            [storages.assets]
            driver = "file"
            dir = "./data"
        "#;

        let config = ServiceConfig::from_toml(raw).unwrap();
        assert!(matches!(
            config.validate(),
            Err(KvError::BucketShouldBeSet)
        ));
    }
}
