//! In-memory backing store built on `moka`.
//!
//! Each entry expires after its strategy's padded lifetime
//! (`max-age + stale-while-revalidate`). Reads also check the injected
//! [`Clock`], so tests can move time without sleeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headwater_core::HashedKey;
use moka::Expiry;
use moka::future::Cache;
use tracing::debug;

use super::clock::{SharedClock, SystemClock};
use super::store::{CacheEntry, CacheStore, StoreError};

/// Default number of entries kept before LRU eviction.
pub const DEFAULT_MAX_ENTRIES: u64 = 1000;

/// Per-entry expiry derived from the entry's own strategy.
struct PaddedLifetime;

impl Expiry<HashedKey, Arc<CacheEntry>> for PaddedLifetime {
    fn expire_after_create(
        &self,
        _key: &HashedKey,
        value: &Arc<CacheEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.strategy.padded_lifetime())
    }

    fn expire_after_update(
        &self,
        _key: &HashedKey,
        value: &Arc<CacheEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.strategy.padded_lifetime())
    }
}

/// Process-local cache store.
///
/// Cloning shares the underlying cache.
#[derive(Clone)]
pub struct InMemoryCache {
    cache: Cache<HashedKey, Arc<CacheEntry>>,
    clock: SharedClock,
}

impl InMemoryCache {
    /// Create a store holding at most `max_entries` entries.
    #[must_use]
    pub fn new(max_entries: u64) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    /// Create a store that reads time from `clock`.
    #[must_use]
    pub fn with_clock(max_entries: u64, clock: SharedClock) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PaddedLifetime)
            .build();

        Self { cache, clock }
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn match_entry(&self, key: &HashedKey) -> Result<Option<CacheEntry>, StoreError> {
        let Some(entry) = self.cache.get(key).await else {
            debug!(key = %key, "store miss");
            return Ok(None);
        };

        if entry.is_expired(self.clock.now()) {
            debug!(key = %key, "store entry expired");
            self.cache.invalidate(key).await;
            return Ok(None);
        }

        Ok(Some(entry.as_ref().clone()))
    }

    async fn put(&self, key: &HashedKey, entry: CacheEntry) -> Result<(), StoreError> {
        debug!(key = %key, strategy = %entry.strategy, "store put");
        self.cache.insert(key.clone(), Arc::new(entry)).await;
        Ok(())
    }

    async fn delete(&self, key: &HashedKey) -> Result<(), StoreError> {
        debug!(key = %key, "store delete");
        self.cache.invalidate(key).await;
        Ok(())
    }
}
