//! Sub-request profiler.
//!
//! Every cache decision produces a [`SubRequestEvent`]. Events are always
//! traced at debug level; when the [`EventLog`] is enabled they are also kept
//! in a bounded buffer that the dev server exposes as JSON.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use headwater_core::CacheStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::store::ResponseInit;

/// Default number of events kept.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Caller-supplied context describing a sub-request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDebugInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// GraphQL document text, for Storefront API calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql: Option<String>,
    /// `Purpose` header of the incoming request (`prefetch`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Cache section of a profiler event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCacheInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CacheStatus>,
    /// Rendered `Cache-Control` of the strategy in use.
    pub strategy: String,
    /// Hashed cache key.
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// One profiled sub-request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRequestEvent {
    /// Always `subrequest`.
    pub event_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// `None` for requests that bypass the cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_status: Option<CacheStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_init: Option<ResponseInit>,
    pub cache: EventCacheInfo,
}

impl SubRequestEvent {
    pub const EVENT_TYPE: &'static str = "subrequest";
}

/// Bounded in-memory profiler log.
///
/// Cloning shares the buffer.
#[derive(Debug, Clone)]
pub struct EventLog {
    enabled: bool,
    capacity: usize,
    events: Arc<Mutex<VecDeque<SubRequestEvent>>>,
}

impl EventLog {
    /// An enabled log keeping the last `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            enabled: capacity > 0,
            capacity,
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// A log that traces events but keeps none.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            capacity: 0,
            events: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record an event, evicting the oldest one when full.
    pub fn record(&self, event: SubRequestEvent) {
        debug!(
            url = %event.url,
            cache_status = event.cache_status.map_or("NONE", CacheStatus::as_str),
            key = %event.cache.key,
            strategy = %event.cache.strategy,
            display_name = event.display_name.as_deref().unwrap_or_default(),
            duration_ms = (event.end_time - event.start_time).num_milliseconds(),
            "subrequest"
        );

        if !self.enabled {
            return;
        }

        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Copy of the buffered events, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SubRequestEvent> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
