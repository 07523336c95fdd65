//! Stale-while-revalidate sub-request cache.
//!
//! [`WithCache`] wraps arbitrary async work (`run`) and outgoing HTTP calls
//! (`fetch`) with a caching strategy:
//!
//! - fresh entries are returned directly
//! - stale entries are returned immediately and refreshed in the background
//!   through [`WaitUntil`]
//! - concurrent misses for the same key share one computation
//!
//! # Example
//!
//! ```rust,ignore
//! let with_cache = WithCache::new(WithCacheOptions::new(InMemoryCache::default()));
//!
//! let name: String = with_cache
//!     .run(RunOptions::new(["my-cms", "shop-name"], CacheStrategy::long()), |_| async {
//!         load_shop_name().await
//!     })
//!     .await?;
//! ```

mod clock;
mod events;
mod fetch;
mod inflight;
mod memory;
mod store;
mod wait_until;
mod with_cache;

use std::sync::Arc;

use thiserror::Error;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use events::{
    DEFAULT_EVENT_CAPACITY, EventCacheInfo, EventLog, RequestDebugInfo, SubRequestEvent,
};
pub use fetch::{
    FetchOptions, FetchRequest, FetchResult, ResponseInfo, ReturnType, ShouldCacheResponse,
};
pub use memory::{DEFAULT_MAX_ENTRIES, InMemoryCache};
pub use store::{CacheEntry, CacheStore, CachedDebugInfo, ResponseInit, StoreError};
pub use wait_until::{TaskTracker, WaitUntil};
pub use with_cache::{DebugRecorder, RunOptions, ShouldCacheResult, WithCache, WithCacheOptions};

/// Errors surfaced by [`WithCache`].
///
/// Every caller joined to one computation receives the same error, so the
/// error is cheaply cloneable.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The wrapped action failed.
    #[error("{0}")]
    Action(Arc<dyn std::error::Error + Send + Sync>),

    /// The outgoing HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(Arc<reqwest::Error>),

    /// A value could not be converted to or from its cached JSON form.
    #[error("Serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    /// Wrap an action's error.
    pub fn action(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Action(Arc::from(error.into()))
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(Arc::new(error))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(error))
    }
}
