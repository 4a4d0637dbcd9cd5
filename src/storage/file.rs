//! File-Backed Bucket Storage
//!
//! Persistent embedded backend. All entries live in a concurrent map; every
//! mutation appends a record to a bucket-scoped log file so the map can be
//! rebuilt on open. The expiry index is kept beside the data map and the
//! sweep appends tombstones, so expired keys stay dead across restarts.
//!
//! Log format: `RCKF` magic, version byte, length-prefixed bucket name,
//! then records. Record: op byte (1 = set, 2 = delete), length-prefixed
//! key, and for sets a length-prefixed value and TTL string (empty TTL =
//! never expires). `close` compacts the log down to the live entries.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
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
use tokio::time::interval;
use tracing::{debug, warn};

use crate::error::{KvError, Result};

use super::contract::{validate_keys, Storage};
use super::Item;

const MAGIC: &[u8] = b"RCKF";
const VERSION: u8 = 1;

const REC_SET: u8 = 1;
const REC_DEL: u8 = 2;

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_file() -> String {
    "keyrack.db".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Configuration for the file driver.
///
/// `bucket` has no default: a persistent namespace must be named explicitly
/// or initialization fails.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    /// Directory holding the log file. Created if missing.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Log file name inside `dir`.
    #[serde(default = "default_file")]
    pub file: String,

    /// Bucket name stored in the file header. Required.
    #[serde(default)]
    pub bucket: String,

    /// Sweep tick interval in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl FileConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(KvError::BucketShouldBeSet);
        }
        Ok(())
    }

    fn path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }
}

type SharedLog = Arc<Mutex<BufWriter<File>>>;

/// Persistent bucket-scoped key-value store.
#[derive(Debug)]
pub struct FileStorage {
    data: Arc<DashMap<String, Bytes>>,
    expiries: Arc<DashMap<String, DateTime<Utc>>>,
    log: SharedLog,
    path: PathBuf,
    bucket: String,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FileStorage {
    /// Open (or create) the log file for the configured bucket, replay it
    /// into memory and start the sweep task.
    pub fn open(config: &FileConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.dir)?;

        let path = config.path();
        let data = Arc::new(DashMap::new());
        let expiries = Arc::new(DashMap::new());

        if path.exists() {
            replay(&path, &config.bucket, &data, &expiries)?;
        } else {
            let file = File::create(&path)?;
            let mut writer = BufWriter::new(file);
            write_header(&mut writer, &config.bucket)?;
            writer.flush()?;
        }

        let file = OpenOptions::new().append(true).open(&path)?;
        let log: SharedLog = Arc::new(Mutex::new(BufWriter::new(file)));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let sweeper = spawn_sweeper(
            data.clone(),
            expiries.clone(),
            log.clone(),
            Duration::from_secs(config.sweep_interval_secs),
            shutdown_rx,
        );

        Ok(Self {
            data,
            expiries,
            log,
            path,
            bucket: config.bucket.clone(),
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Rewrite the log so it holds only the live entries.
    fn compact(&self) -> Result<()> {
        let tmp = self.path.with_extension("compact");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            write_header(&mut writer, &self.bucket)?;
            for entry in self.data.iter() {
                let ttl = self
                    .expiries
                    .get(entry.key())
                    .map(|deadline| deadline.to_rfc3339())
                    .unwrap_or_default();
                write_set(&mut writer, entry.key(), entry.value(), &ttl)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn has(&self, keys: &[String]) -> Result<HashMap<String, bool>> {
        validate_keys(keys)?;

        let mut m = HashMap::new();
        for key in keys {
            if self.data.contains_key(key) {
                m.insert(key.clone(), true);
            }
        }
        Ok(m)
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        if key.trim().is_empty() {
            return Err(KvError::EmptyKey);
        }
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Bytes>> {
        validate_keys(keys)?;

        let mut m = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.data.get(key) {
                m.insert(key.clone(), entry.value().clone());
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
            let expires_at = item.expires_at()?;

            self.data.insert(item.key.clone(), item.value.clone());
            match expires_at {
                Some(deadline) => {
                    self.expiries.insert(item.key.clone(), deadline);
                }
                // an overwrite without a TTL clears any earlier deadline
                None => {
                    self.expiries.remove(&item.key);
                }
            }

            let mut log = self.log.lock();
            write_set(&mut *log, &item.key, &item.value, &item.ttl)?;
            log.flush()?;
        }
        Ok(())
    }

    async fn mexpire(&self, items: &[Item]) -> Result<()> {
        for item in items {
            if item.ttl.is_empty() || item.key.trim().is_empty() {
                return Err(KvError::EmptyTtl);
            }
            let expires_at = item.expires_at()?;

            // keys never stored here are ignored
            let value = match self.data.get(&item.key) {
                Some(entry) => entry.value().clone(),
                None => continue,
            };

            if let Some(deadline) = expires_at {
                self.expiries.insert(item.key.clone(), deadline);
            }

            // persist the moved deadline as a fresh set record
            let mut log = self.log.lock();
            write_set(&mut *log, &item.key, &value, &item.ttl)?;
            log.flush()?;
        }
        Ok(())
    }

    async fn ttl(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        validate_keys(keys)?;

        let mut m = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(deadline) = self.expiries.get(key) {
                m.insert(key.clone(), deadline.to_rfc3339());
            }
        }
        Ok(m)
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        validate_keys(keys)?;

        for key in keys {
            self.data.remove(key);
            self.expiries.remove(key);

            let mut log = self.log.lock();
            write_del(&mut *log, key)?;
            log.flush()?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let _ = self.shutdown.send(true);

        let sweeper = self.sweeper.lock().take();
        if let Some(handle) = sweeper {
            if handle.await.is_err() {
                warn!("sweeper task panicked during shutdown");
            }
        }

        self.log.lock().flush()?;
        self.compact()?;
        Ok(())
    }
}

/// Background sweep: drop expired entries and persist tombstones for them.
fn spawn_sweeper(
    data: Arc<DashMap<String, Bytes>>,
    expiries: Arc<DashMap<String, DateTime<Utc>>>,
    log: SharedLog,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(tick);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("file sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let expired: Vec<String> = expiries
                        .iter()
                        .filter(|entry| *entry.value() < now)
                        .map(|entry| entry.key().clone())
                        .collect();

                    for key in &expired {
                        data.remove(key);
                        expiries.remove(key);
                        let mut log = log.lock();
                        if let Err(e) = write_del(&mut *log, key).and_then(|_| log.flush()) {
                            warn!(key = %key, error = %e, "failed to persist expiry tombstone");
                        }
                    }
                    if !expired.is_empty() {
                        debug!(removed = expired.len(), "swept expired entries");
                    }
                }
            }
        }
    })
}

fn write_header<W: Write>(writer: &mut W, bucket: &str) -> io::Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_all(&[VERSION])?;
    writer.write_all(&(bucket.len() as u32).to_be_bytes())?;
    writer.write_all(bucket.as_bytes())?;
    Ok(())
}

fn write_set<W: Write>(writer: &mut W, key: &str, value: &[u8], ttl: &str) -> io::Result<()> {
    writer.write_all(&[REC_SET])?;
    write_chunk(writer, key.as_bytes())?;
    write_chunk(writer, value)?;
    write_chunk(writer, ttl.as_bytes())?;
    Ok(())
}

fn write_del<W: Write>(writer: &mut W, key: &str) -> io::Result<()> {
    writer.write_all(&[REC_DEL])?;
    write_chunk(writer, key.as_bytes())?;
    Ok(())
}

fn write_chunk<W: Write>(writer: &mut W, chunk: &[u8]) -> io::Result<()> {
    writer.write_all(&(chunk.len() as u32).to_be_bytes())?;
    writer.write_all(chunk)?;
    Ok(())
}

/// Rebuild the in-memory maps from the log file.
fn replay(
    path: &Path,
    bucket: &str,
    data: &DashMap<String, Bytes>,
    expiries: &DashMap<String, DateTime<Utc>>,
) -> Result<()> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| KvError::Corrupted("missing header".to_string()))?;
    if magic != MAGIC {
        return Err(KvError::Corrupted("bad magic".to_string()));
    }

    let mut version = [0u8; 1];
    reader
        .read_exact(&mut version)
        .map_err(|_| KvError::Corrupted("missing version".to_string()))?;
    if version[0] != VERSION {
        return Err(KvError::Corrupted(format!(
            "unsupported version {}",
            version[0]
        )));
    }

    let stored_bucket = read_chunk(&mut reader)?;
    if stored_bucket != bucket.as_bytes() {
        return Err(KvError::NoSuchBucket);
    }

    loop {
        let mut op = [0u8; 1];
        match reader.read(&mut op) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }

        match op[0] {
            REC_SET => {
                let key = read_string(&mut reader)?;
                let value = read_chunk(&mut reader)?;
                let ttl = read_string(&mut reader)?;

                if ttl.is_empty() {
                    expiries.remove(&key);
                } else {
                    let deadline = DateTime::parse_from_rfc3339(&ttl)
                        .map_err(|e| KvError::Corrupted(format!("bad ttl record: {e}")))?
                        .with_timezone(&Utc);
                    expiries.insert(key.clone(), deadline);
                }
                data.insert(key, Bytes::from(value));
            }
            REC_DEL => {
                let key = read_string(&mut reader)?;
                data.remove(&key);
                expiries.remove(&key);
            }
            other => {
                return Err(KvError::Corrupted(format!("unknown record type {other}")));
            }
        }
    }

    Ok(())
}

fn read_chunk<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len = [0u8; 4];
    reader
        .read_exact(&mut len)
        .map_err(|_| KvError::Corrupted("truncated record".to_string()))?;
    let mut chunk = vec![0u8; u32::from_be_bytes(len) as usize];
    reader
        .read_exact(&mut chunk)
        .map_err(|_| KvError::Corrupted("truncated record".to_string()))?;
    Ok(chunk)
}

fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let chunk = read_chunk(reader)?;
    String::from_utf8(chunk).map_err(|_| KvError::Corrupted("non-utf8 key or ttl".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::tempdir;

    fn config(dir: &Path, bucket: &str) -> FileConfig {
        FileConfig {
            dir: dir.to_path_buf(),
            file: "test.db".to_string(),
            bucket: bucket.to_string(),
            sweep_interval_secs: 60,
        }
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_bucket_must_be_set() {
        let dir = tempdir().unwrap();
        let err = FileStorage::open(&config(dir.path(), "  ")).unwrap_err();
        assert!(matches!(err, KvError::BucketShouldBeSet));
    }

    #[tokio::test]
    async fn test_roundtrip_across_reopen() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path(), "cache");

        let storage = FileStorage::open(&cfg).unwrap();
        let deadline = Utc::now() + ChronoDuration::seconds(300);
        storage
            .set(&[
                Item::new("plain", "value"),
                Item::with_ttl("timed", "ticking", deadline),
            ])
            .await
            .unwrap();
        storage.close().await.unwrap();

        let reopened = FileStorage::open(&cfg).unwrap();
        assert_eq!(
            reopened.get("plain").await.unwrap(),
            Some(Bytes::from_static(b"value"))
        );
        let ttls = reopened.ttl(&keys(&["timed", "plain"])).await.unwrap();
        assert_eq!(ttls.len(), 1);
        assert!(ttls.contains_key("timed"));
        reopened.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_survives_reopen() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path(), "cache");

        let storage = FileStorage::open(&cfg).unwrap();
        storage.set(&[Item::new("doomed", "value")]).await.unwrap();
        storage.delete(&keys(&["doomed"])).await.unwrap();
        storage.close().await.unwrap();

        let reopened = FileStorage::open(&cfg).unwrap();
        assert_eq!(reopened.get("doomed").await.unwrap(), None);
        reopened.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_bucket_rejected() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(&config(dir.path(), "first")).unwrap();
        storage.close().await.unwrap();

        let err = FileStorage::open(&config(dir.path(), "second")).unwrap_err();
        assert!(matches!(err, KvError::NoSuchBucket));
    }

    #[tokio::test]
    async fn test_garbled_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        fs::write(&path, b"definitely not a keyrack log").unwrap();

        let err = FileStorage::open(&config(dir.path(), "cache")).unwrap_err();
        assert!(matches!(err, KvError::Corrupted(_)));
    }

    #[tokio::test]
    async fn test_mexpire_keeps_value_and_persists() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path(), "cache");

        let storage = FileStorage::open(&cfg).unwrap();
        storage.set(&[Item::new("key", "value")]).await.unwrap();

        let deadline = Utc::now() + ChronoDuration::seconds(600);
        storage
            .mexpire(&[Item::with_ttl("key", "", deadline)])
            .await
            .unwrap();
        // absent keys are ignored
        storage
            .mexpire(&[Item::with_ttl("ghost", "", deadline)])
            .await
            .unwrap();
        storage.close().await.unwrap();

        let reopened = FileStorage::open(&cfg).unwrap();
        assert_eq!(
            reopened.get("key").await.unwrap(),
            Some(Bytes::from_static(b"value"))
        );
        assert!(reopened.ttl(&keys(&["key"])).await.unwrap().contains_key("key"));
        assert_eq!(reopened.get("ghost").await.unwrap(), None);
        reopened.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_tombstones_expired_entry() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path(), "cache");
        cfg.sweep_interval_secs = 1;

        let storage = FileStorage::open(&cfg).unwrap();
        let past = Utc::now() - ChronoDuration::seconds(30);
        storage
            .set(&[Item::with_ttl("stale", "v", past), Item::new("live", "v")])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(storage.get("stale").await.unwrap(), None);
        storage.close().await.unwrap();

        // the tombstone keeps the key dead after replay
        let reopened = FileStorage::open(&cfg).unwrap();
        assert_eq!(reopened.get("stale").await.unwrap(), None);
        assert_eq!(
            reopened.get("live").await.unwrap(),
            Some(Bytes::from_static(b"v"))
        );
        reopened.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_validation_matches_contract() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(&config(dir.path(), "cache")).unwrap();

        assert!(matches!(
            storage.set(&[Item::default()]).await.unwrap_err(),
            KvError::EmptyItem
        ));
        assert!(matches!(
            storage.delete(&keys(&[" "])).await.unwrap_err(),
            KvError::EmptyKey
        ));
        assert!(matches!(
            storage.mget(&[]).await.unwrap_err(),
            KvError::NoKeys
        ));
        storage.close().await.unwrap();
    }
}
