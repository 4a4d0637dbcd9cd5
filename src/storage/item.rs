//! Storage Item
//!
//! The unit of storage exchanged with every backend: a key, an opaque byte
//! value and an optional absolute expiry timestamp in RFC 3339 form.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// A single key-value pair with an optional absolute TTL.
///
/// An empty `ttl` string means the item never expires. A non-empty `ttl`
/// must be an RFC 3339 timestamp; callers convert "expire in N seconds"
/// into an absolute instant before handing the item to a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    /// Key of the item. Must be non-empty after trimming whitespace.
    pub key: String,
    /// Opaque value bytes.
    pub value: Bytes,
    /// Live-until timestamp in RFC 3339 format, empty for "never expires".
    pub ttl: String,
}

impl Item {
    /// Create an item without a TTL.
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl: String::new(),
        }
    }

    /// Create an item expiring at the given absolute instant.
    pub fn with_ttl(key: impl Into<String>, value: impl Into<Bytes>, ttl: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl: ttl.to_rfc3339(),
        }
    }

    /// True when key, value and ttl are all simultaneously empty.
    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.value.is_empty() && self.ttl.is_empty()
    }

    /// Parse the TTL field into an absolute expiry instant.
    ///
    /// Returns `Ok(None)` for an empty TTL and `KvError::InvalidTtl` when a
    /// non-empty TTL fails to parse. Backends call this before mutating any
    /// state for the item.
    pub fn expires_at(&self) -> Result<Option<DateTime<Utc>>> {
        if self.ttl.is_empty() {
            return Ok(None);
        }
        let parsed = DateTime::parse_from_rfc3339(&self.ttl)?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }
}
