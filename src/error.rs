//! Error types for keyrack
//!
//! One error enum shared by the storage contract, the registry and the
//! gateway. Validation failures are reported before any state is mutated
//! for the offending key or item; engine-level failures pass through.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for storage operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Input validation
    // -------------------------------------------------------------------------
    #[error("key can't be empty string")]
    EmptyKey,

    #[error("empty Item")]
    EmptyItem,

    #[error("should provide at least 1 key")]
    NoKeys,

    #[error("should provide at least 1 storage")]
    NoStorages,

    #[error("ttl should be set along with at least one key")]
    EmptyTtl,

    #[error("invalid ttl: {0}")]
    InvalidTtl(#[from] chrono::ParseError),

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------
    #[error("no storage configured")]
    NoConfig,

    #[error("bucket should be set")]
    BucketShouldBeSet,

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------
    #[error("unknown storage {0}")]
    UnknownStorage(String),

    #[error("operation timed out")]
    Timeout,

    // -------------------------------------------------------------------------
    // Backend engines
    // -------------------------------------------------------------------------
    #[error("no such bucket")]
    NoSuchBucket,

    #[error("{0} is not supported by this storage")]
    Unsupported(&'static str),

    #[error("corrupted storage file: {0}")]
    Corrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pass-through for whatever an underlying engine reports.
    #[error("storage engine error: {0}")]
    Engine(String),
}
