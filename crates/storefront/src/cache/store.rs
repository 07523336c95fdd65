//! Backing store for cached sub-request results.
//!
//! The orchestrator only needs three operations from a store: look an entry
//! up, write one, and delete one. Any async key-value cache (the in-memory
//! [`InMemoryCache`](super::InMemoryCache), a platform cache API, Redis) can
//! sit behind [`CacheStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use headwater_core::{CacheStatus, CacheStrategy, HashedKey, classify};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised by a backing store.
///
/// The orchestrator never fails a request because of these: failed reads are
/// treated as misses and failed writes are logged.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    /// A stored entry could not be encoded or decoded.
    #[error("Cache entry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// HTTP response metadata kept alongside cached fetch results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInit {
    pub status: u16,
    pub status_text: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

/// Debug metadata stored with an entry for the sub-request profiler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedDebugInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_init: Option<ResponseInit>,
}

/// A stored value. Entries are replaced wholesale, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Cached payload.
    pub value: Value,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
    /// Strategy the writer used (unpadded).
    pub strategy: CacheStrategy,
    /// Profiler metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<CachedDebugInfo>,
    /// Tags for grouped invalidation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl CacheEntry {
    /// Create an entry written at `stored_at`.
    #[must_use]
    pub const fn new(value: Value, strategy: CacheStrategy, stored_at: DateTime<Utc>) -> Self {
        Self {
            value,
            stored_at,
            strategy,
            debug_info: None,
            tags: Vec::new(),
        }
    }

    /// Freshness of this entry as of `now`.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> CacheStatus {
        classify(self.stored_at, &self.strategy, now)
    }

    /// Whether a store must have dropped this entry by `now`.
    ///
    /// Stores keep entries for `max-age + stale-while-revalidate`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let lifetime_ms =
            i64::try_from(self.strategy.padded_lifetime().as_millis()).unwrap_or(i64::MAX);
        (now - self.stored_at).num_milliseconds() > lifetime_ms
    }
}

/// Async key-value store holding [`CacheEntry`] values.
///
/// Implementations must keep an entry for at least
/// `entry.strategy.padded_lifetime()` after `put`, so that stale values are
/// still available during the stale-while-revalidate window.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an entry. `Ok(None)` is a miss.
    async fn match_entry(&self, key: &HashedKey) -> Result<Option<CacheEntry>, StoreError>;

    /// Write an entry, replacing any previous one (last write wins).
    async fn put(&self, key: &HashedKey, entry: CacheEntry) -> Result<(), StoreError>;

    /// Remove an entry.
    async fn delete(&self, key: &HashedKey) -> Result<(), StoreError>;
}
