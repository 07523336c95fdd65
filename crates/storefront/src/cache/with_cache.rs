//! The `WithCache` orchestrator.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use headwater_core::{CacheKey, CacheStatus, CacheStrategy, HashedKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use super::CacheError;
use super::clock::{SharedClock, SystemClock};
use super::events::{EventCacheInfo, EventLog, RequestDebugInfo, SubRequestEvent};
use super::inflight::InFlightRegistry;
use super::store::{CacheEntry, CacheStore, CachedDebugInfo};
use super::wait_until::{TaskTracker, WaitUntil};

/// Predicate deciding whether a computed value may be cached.
pub type ShouldCacheResult<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A computed value and whether it may be written to the store.
pub(super) struct Computed {
    pub value: Value,
    pub cacheable: bool,
}

/// Type-erased action, called at most once.
pub(super) type Action =
    Box<dyn FnOnce(DebugRecorder) -> BoxFuture<'static, Result<Computed, CacheError>> + Send>;

/// Everything about a call except the action.
#[derive(Debug, Clone)]
pub(super) struct RunContext {
    pub key: HashedKey,
    pub strategy: CacheStrategy,
    pub debug_info: RequestDebugInfo,
    pub tags: Vec<String>,
}

// =============================================================================
// Options
// =============================================================================

/// Dependencies of a [`WithCache`].
pub struct WithCacheOptions {
    /// Backing store. Without one every call runs uncached.
    pub store: Option<Arc<dyn CacheStore>>,
    /// Receives background revalidations.
    pub wait_until: Arc<dyn WaitUntil>,
    pub clock: SharedClock,
    pub event_log: EventLog,
    /// Client used by [`WithCache::fetch`].
    pub http: reqwest::Client,
}

impl WithCacheOptions {
    /// Options around `store` with a fresh [`TaskTracker`], the system clock
    /// and profiling disabled.
    #[must_use]
    pub fn new(store: impl CacheStore + 'static) -> Self {
        Self {
            store: Some(Arc::new(store)),
            ..Self::without_store()
        }
    }

    /// Options with no backing store.
    #[must_use]
    pub fn without_store() -> Self {
        Self {
            store: None,
            wait_until: Arc::new(TaskTracker::new()),
            clock: Arc::new(SystemClock),
            event_log: EventLog::disabled(),
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn with_wait_until(mut self, wait_until: Arc<dyn WaitUntil>) -> Self {
        self.wait_until = wait_until;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_event_log(mut self, event_log: EventLog) -> Self {
        self.event_log = event_log;
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

/// Per-call options for [`WithCache::run`].
pub struct RunOptions<T> {
    pub cache_key: CacheKey,
    pub strategy: CacheStrategy,
    /// Defaults to caching every successful value.
    pub should_cache_result: Option<ShouldCacheResult<T>>,
    pub debug_info: Option<RequestDebugInfo>,
    pub cache_tags: Vec<String>,
}

impl<T> RunOptions<T> {
    pub fn new(cache_key: impl Into<CacheKey>, strategy: CacheStrategy) -> Self {
        Self {
            cache_key: cache_key.into(),
            strategy,
            should_cache_result: None,
            debug_info: None,
            cache_tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn should_cache_result(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.should_cache_result = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn debug_info(mut self, debug_info: RequestDebugInfo) -> Self {
        self.debug_info = Some(debug_info);
        self
    }

    #[must_use]
    pub fn cache_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Handle passed to actions for attaching profiler metadata.
#[derive(Debug, Clone, Default)]
pub struct DebugRecorder {
    recorded: Arc<Mutex<Option<CachedDebugInfo>>>,
}

impl DebugRecorder {
    /// Attach a display name and response metadata. Later calls replace
    /// earlier ones.
    pub fn add_debug_data(&self, info: CachedDebugInfo) {
        *self.recorded.lock().unwrap_or_else(PoisonError::into_inner) = Some(info);
    }

    #[must_use]
    pub fn recorded(&self) -> Option<CachedDebugInfo> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// =============================================================================
// WithCache
// =============================================================================

/// Stale-while-revalidate cache for sub-requests.
///
/// Cloning shares the store, the in-flight registry and the revalidation
/// lock. Create one per application, not per request.
#[derive(Clone)]
pub struct WithCache {
    inner: Arc<Inner>,
}

struct Inner {
    store: Option<Arc<dyn CacheStore>>,
    wait_until: Arc<dyn WaitUntil>,
    clock: SharedClock,
    events: EventLog,
    http: reqwest::Client,
    in_flight: InFlightRegistry,
    revalidating: Mutex<HashSet<HashedKey>>,
}

impl WithCache {
    #[must_use]
    pub fn new(options: WithCacheOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: options.store,
                wait_until: options.wait_until,
                clock: options.clock,
                events: options.event_log,
                http: options.http,
                in_flight: InFlightRegistry::default(),
                revalidating: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Run `action` under `options.strategy`, caching its result by
    /// `options.cache_key`.
    ///
    /// - `HIT`: the cached value is returned and `action` is not called.
    /// - `STALE`: the cached value is returned and `action` runs in the
    ///   background (at most one revalidation per key at a time). Its errors
    ///   are logged, never returned.
    /// - `MISS`: `action` runs once for all concurrent callers of the key and
    ///   its value is stored before any of them resumes.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Action`] when `action` fails (nothing is cached)
    /// and [`CacheError::Serialization`] when the value does not round-trip
    /// through JSON.
    pub async fn run<T, F, Fut, E>(&self, options: RunOptions<T>, action: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(DebugRecorder) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let RunOptions {
            cache_key,
            strategy,
            should_cache_result,
            debug_info,
            cache_tags,
        } = options;

        let context = RunContext {
            key: cache_key.hash(),
            strategy,
            debug_info: debug_info.unwrap_or_default(),
            tags: cache_tags,
        };

        let action: Action = Box::new(move |recorder| {
            async move {
                let value = action(recorder).await.map_err(CacheError::action)?;
                let cacheable = should_cache_result
                    .as_ref()
                    .is_none_or(|should_cache| should_cache(&value));
                Ok(Computed {
                    value: serde_json::to_value(&value)?,
                    cacheable,
                })
            }
            .boxed()
        });

        let value = self.run_erased(context, action).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Number of computations currently in flight.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Whether a background revalidation is running for `key`.
    #[must_use]
    pub fn is_revalidating(&self, key: &CacheKey) -> bool {
        self.inner
            .revalidating
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key.hash())
    }

    #[must_use]
    pub fn event_log(&self) -> &EventLog {
        &self.inner.events
    }

    pub(super) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(super) fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    #[instrument(skip_all, fields(key = %context.key, strategy = %context.strategy))]
    pub(super) async fn run_erased(
        &self,
        context: RunContext,
        action: Action,
    ) -> Result<Value, CacheError> {
        let start = self.inner.clock.now();

        let store = match &self.inner.store {
            Some(store) if !context.strategy.is_no_store() => store,
            _ => {
                let recorder = DebugRecorder::default();
                let computed = action(recorder.clone()).await?;
                self.inner.log_event(
                    &context,
                    None,
                    start,
                    recorder.recorded().as_ref(),
                    None,
                    &computed.value,
                );
                return Ok(computed.value);
            }
        };

        // The store read is part of the shared computation, so a caller
        // either joins it or starts after its write has landed.
        let inner = Arc::clone(&self.inner);
        let store = Arc::clone(store);
        let key = context.key.clone();
        let (computation, started) = self
            .inner
            .in_flight
            .join_or_start(&key, move || inner.lookup_or_compute(store, context, action, start));

        if !started {
            debug!("joining in-flight sub-request");
        }

        computation.await
    }
}

impl std::fmt::Debug for WithCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WithCache")
            .field("has_store", &self.inner.store.is_some())
            .field("in_flight", &self.inner.in_flight.len())
            .field("profiler", &self.inner.events.is_enabled())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Internals
// =============================================================================

/// Removes a key from the in-flight registry when the computation ends,
/// including when it panics.
struct InFlightSlot {
    inner: Arc<Inner>,
    key: HashedKey,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.inner.in_flight.remove(&self.key);
    }
}

/// Held for the duration of one background revalidation.
struct RevalidationLock {
    inner: Arc<Inner>,
    key: HashedKey,
}

impl RevalidationLock {
    fn acquire(inner: &Arc<Inner>, key: &HashedKey) -> Option<Self> {
        let mut running = inner
            .revalidating
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        running.insert(key.clone()).then(|| Self {
            inner: Arc::clone(inner),
            key: key.clone(),
        })
    }
}

impl Drop for RevalidationLock {
    fn drop(&mut self) {
        self.inner
            .revalidating
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl Inner {
    fn lookup_or_compute(
        self: Arc<Self>,
        store: Arc<dyn CacheStore>,
        context: RunContext,
        action: Action,
        start: DateTime<Utc>,
    ) -> BoxFuture<'static, Result<Value, CacheError>> {
        async move {
            let _slot = InFlightSlot {
                inner: Arc::clone(&self),
                key: context.key.clone(),
            };

            let cached = match store.match_entry(&context.key).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Cache read failed, treating as miss");
                    None
                }
            };

            if let Some(entry) = cached {
                let status = entry.status(self.clock.now());
                if status.is_servable() {
                    debug!(status = %status, "cache {status}");
                    if status == CacheStatus::Stale {
                        Self::revalidate(&self, context.clone(), action);
                    }
                    self.log_event(
                        &context,
                        Some(status),
                        start,
                        None,
                        entry.debug_info.as_ref(),
                        &entry.value,
                    );
                    return Ok(entry.value);
                }
            }

            debug!("cache MISS");
            let recorder = DebugRecorder::default();
            let computed = action(recorder.clone()).await?;
            let recorded = recorder.recorded();

            self.log_event(
                &context,
                Some(CacheStatus::Miss),
                start,
                recorded.as_ref(),
                None,
                &computed.value,
            );

            if computed.cacheable {
                let put_start = self.clock.now();
                self.store_value(&context, &computed.value, recorded.as_ref())
                    .await;
                self.log_event(
                    &context,
                    Some(CacheStatus::Put),
                    put_start,
                    recorded.as_ref(),
                    None,
                    &computed.value,
                );
            }

            Ok(computed.value)
        }
        .boxed()
    }

    fn revalidate(inner: &Arc<Self>, context: RunContext, action: Action) {
        let Some(lock) = RevalidationLock::acquire(inner, &context.key) else {
            debug!(key = %context.key, "revalidation already running");
            return;
        };

        let this = Arc::clone(inner);
        let task = async move {
            let _lock = lock;
            let start = this.clock.now();
            let recorder = DebugRecorder::default();

            match action(recorder.clone()).await {
                Ok(computed) if computed.cacheable => {
                    let recorded = recorder.recorded();
                    this.store_value(&context, &computed.value, recorded.as_ref())
                        .await;
                    this.log_event(
                        &context,
                        Some(CacheStatus::Put),
                        start,
                        recorded.as_ref(),
                        None,
                        &computed.value,
                    );
                }
                Ok(_) => debug!(key = %context.key, "revalidated value not cacheable"),
                Err(e) => error!(key = %context.key, "SWR in sub-request failed: {e}"),
            }
        }
        .boxed();

        inner.wait_until.wait_until(task);
    }

    async fn store_value(
        &self,
        context: &RunContext,
        value: &Value,
        recorded: Option<&CachedDebugInfo>,
    ) {
        let Some(store) = &self.store else {
            return;
        };

        let mut entry = CacheEntry::new(value.clone(), context.strategy, self.clock.now());
        entry.tags.clone_from(&context.tags);
        entry.debug_info = Some(CachedDebugInfo {
            display_name: display_name(context, recorded, None),
            url: Some(event_url(context, recorded, None)),
            response_init: recorded.and_then(|r| r.response_init.clone()),
        });

        if let Err(e) = store.put(&context.key, entry).await {
            warn!(key = %context.key, error = %e, "Cache write failed");
        }
    }

    fn log_event(
        &self,
        context: &RunContext,
        status: Option<CacheStatus>,
        start: DateTime<Utc>,
        recorded: Option<&CachedDebugInfo>,
        cached: Option<&CachedDebugInfo>,
        payload: &Value,
    ) {
        let keep_payload = self.events.is_enabled();

        self.events.record(SubRequestEvent {
            event_type: SubRequestEvent::EVENT_TYPE.to_string(),
            url: event_url(context, recorded, cached),
            request_id: context.debug_info.request_id.clone(),
            purpose: context.debug_info.purpose.clone(),
            display_name: display_name(context, recorded, cached),
            graphql: context.debug_info.graphql.clone(),
            start_time: start,
            end_time: self.clock.now(),
            cache_status: status,
            response_payload: keep_payload.then(|| payload.clone()),
            response_init: recorded
                .or(cached)
                .and_then(|info| info.response_init.clone()),
            cache: EventCacheInfo {
                status,
                strategy: context.strategy.to_header(),
                key: context.key.to_string(),
                tags: context.tags.clone(),
            },
        });
    }
}

/// Recorded url, then the caller's, then the cached one, then the key url.
fn event_url(
    context: &RunContext,
    recorded: Option<&CachedDebugInfo>,
    cached: Option<&CachedDebugInfo>,
) -> String {
    recorded
        .and_then(|r| r.url.clone())
        .or_else(|| context.debug_info.url.clone())
        .or_else(|| cached.and_then(|c| c.url.clone()))
        .unwrap_or_else(|| context.key.key_url())
}

/// The caller's display name wins over recorded and cached ones.
fn display_name(
    context: &RunContext,
    recorded: Option<&CachedDebugInfo>,
    cached: Option<&CachedDebugInfo>,
) -> Option<String> {
    context
        .debug_info
        .display_name
        .clone()
        .or_else(|| recorded.and_then(|r| r.display_name.clone()))
        .or_else(|| cached.and_then(|c| c.display_name.clone()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryCache, ManualClock, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Harness {
        with_cache: WithCache,
        store: InMemoryCache,
        clock: ManualClock,
        tasks: TaskTracker,
    }

    fn harness() -> Harness {
        let clock = ManualClock::default();
        let store = InMemoryCache::with_clock(100, Arc::new(clock.clone()));
        let tasks = TaskTracker::new();
        let with_cache = WithCache::new(
            WithCacheOptions::new(store.clone())
                .with_clock(Arc::new(clock.clone()))
                .with_wait_until(Arc::new(tasks.clone()))
                .with_event_log(EventLog::new(50)),
        );
        Harness {
            with_cache,
            store,
            clock,
            tasks,
        }
    }

    async fn counted_run(
        with_cache: &WithCache,
        calls: &Arc<AtomicUsize>,
        strategy: CacheStrategy,
    ) -> Result<String, CacheError> {
        let calls = Arc::clone(calls);
        with_cache
            .run(RunOptions::new("key", strategy), move |_| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, CacheError>(format!("value-{n}"))
            })
            .await
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = counted_run(&h.with_cache, &calls, CacheStrategy::short()).await.unwrap();
        h.clock.advance_millis(999);
        let second = counted_run(&h.with_cache, &calls, CacheStrategy::short()).await.unwrap();

        assert_eq!(first, "value-1");
        assert_eq!(second, "value-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.with_cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_served_and_revalidated_once() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));

        counted_run(&h.with_cache, &calls, CacheStrategy::short()).await.unwrap();
        h.clock.advance_millis(3000);

        let stale_a = counted_run(&h.with_cache, &calls, CacheStrategy::short()).await.unwrap();
        let stale_b = counted_run(&h.with_cache, &calls, CacheStrategy::short()).await.unwrap();
        assert_eq!(stale_a, "value-1");
        assert_eq!(stale_b, "value-1");

        h.tasks.drain().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!h.with_cache.is_revalidating(&CacheKey::from("key")));

        let fresh = counted_run(&h.with_cache, &calls, CacheStrategy::short()).await.unwrap();
        assert_eq!(fresh, "value-2");
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));

        counted_run(&h.with_cache, &calls, CacheStrategy::short()).await.unwrap();
        h.clock.advance_millis(10_001);

        let value = counted_run(&h.with_cache, &calls, CacheStrategy::short()).await.unwrap();
        assert_eq!(value, "value-2");
    }

    #[tokio::test]
    async fn test_no_store_always_runs_and_never_writes() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));

        counted_run(&h.with_cache, &calls, CacheStrategy::none()).await.unwrap();
        counted_run(&h.with_cache, &calls, CacheStrategy::none()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let stored = h.store.match_entry(&CacheKey::from("key").hash()).await.unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_action_error_propagates_and_is_not_cached() {
        let h = harness();

        let result: Result<String, _> = h
            .with_cache
            .run(RunOptions::new("key", CacheStrategy::long()), |_| async {
                Err::<String, _>("origin down")
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "origin down");
        assert!(
            h.store
                .match_entry(&CacheKey::from("key").hash())
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(h.with_cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_should_cache_result_false_skips_write() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let value: u32 = h
                .with_cache
                .run(
                    RunOptions::new("key", CacheStrategy::long()).should_cache_result(|v: &u32| *v > 10),
                    move |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, CacheError>(5)
                    },
                )
                .await
                .unwrap();
            assert_eq!(value, 5);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_computation() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));

        let runs = (0..10).map(|_| {
            let with_cache = h.with_cache.clone();
            let calls = Arc::clone(&calls);
            async move {
                with_cache
                    .run(RunOptions::new("key", CacheStrategy::long()), move |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, CacheError>(vec![1, 2, 3])
                    })
                    .await
            }
        });

        let results = futures::future::join_all(runs).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), vec![1, 2, 3]);
        }
    }

    #[tokio::test]
    async fn test_concurrent_failure_reaches_every_caller() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));

        let runs = (0..3).map(|_| {
            let with_cache = h.with_cache.clone();
            let calls = Arc::clone(&calls);
            async move {
                with_cache
                    .run(RunOptions::new("key", CacheStrategy::long()), move |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err::<u8, _>("boom")
                    })
                    .await
            }
        });

        for result in futures::future::join_all(runs).await {
            assert_eq!(result.unwrap_err().to_string(), "boom");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_revalidation_keeps_stale_value() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));
        counted_run(&h.with_cache, &calls, CacheStrategy::short()).await.unwrap();
        h.clock.advance_millis(2000);

        let value: String = h
            .with_cache
            .run(RunOptions::new("key", CacheStrategy::short()), |_| async {
                Err::<String, _>("revalidation failed")
            })
            .await
            .unwrap();
        assert_eq!(value, "value-1");

        h.tasks.drain().await;
        assert!(!h.with_cache.is_revalidating(&CacheKey::from("key")));

        let still_stale = counted_run(&h.with_cache, &calls, CacheStrategy::short()).await.unwrap();
        assert_eq!(still_stale, "value-1");
    }

    #[tokio::test]
    async fn test_profiler_records_statuses() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));

        counted_run(&h.with_cache, &calls, CacheStrategy::short()).await.unwrap();
        counted_run(&h.with_cache, &calls, CacheStrategy::short()).await.unwrap();

        let statuses: Vec<_> = h
            .with_cache
            .event_log()
            .snapshot()
            .into_iter()
            .map(|e| e.cache_status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                Some(CacheStatus::Miss),
                Some(CacheStatus::Put),
                Some(CacheStatus::Hit)
            ]
        );

        let event = &h.with_cache.event_log().snapshot()[0];
        assert_eq!(event.url, CacheKey::from("key").hash().key_url());
        assert_eq!(event.cache.strategy, "public, max-age=1, stale-while-revalidate=9");
    }

    #[tokio::test]
    async fn test_debug_data_flows_into_events() {
        let h = harness();

        let _: u8 = h
            .with_cache
            .run(RunOptions::new("key", CacheStrategy::none()), |recorder| async move {
                recorder.add_debug_data(CachedDebugInfo {
                    display_name: Some("Shop name".to_string()),
                    url: Some("https://cms.example/shop".to_string()),
                    response_init: None,
                });
                Ok::<_, CacheError>(1)
            })
            .await
            .unwrap();

        let event = &h.with_cache.event_log().snapshot()[0];
        assert_eq!(event.display_name.as_deref(), Some("Shop name"));
        assert_eq!(event.url, "https://cms.example/shop");
        assert_eq!(event.cache_status, None);
    }

    struct FailingStore;

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn match_entry(&self, _key: &HashedKey) -> Result<Option<CacheEntry>, StoreError> {
            Err(StoreError::Unavailable("read".to_string()))
        }

        async fn put(&self, _key: &HashedKey, _entry: CacheEntry) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("write".to_string()))
        }

        async fn delete(&self, _key: &HashedKey) -> Result<(), StoreError> {
            Ok(())
        }
    }

    /// Reads see the store as it was, then take a while to answer.
    struct SlowStore(InMemoryCache);

    #[async_trait]
    impl CacheStore for SlowStore {
        async fn match_entry(&self, key: &HashedKey) -> Result<Option<CacheEntry>, StoreError> {
            let snapshot = self.0.match_entry(key).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            snapshot
        }

        async fn put(&self, key: &HashedKey, entry: CacheEntry) -> Result<(), StoreError> {
            self.0.put(key, entry).await
        }

        async fn delete(&self, key: &HashedKey) -> Result<(), StoreError> {
            self.0.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_slow_store_read_is_coalesced_with_the_miss() {
        let with_cache = WithCache::new(WithCacheOptions::new(SlowStore(InMemoryCache::new(10))));
        let calls = Arc::new(AtomicUsize::new(0));

        let slow_run = || {
            let calls = Arc::clone(&calls);
            with_cache.run(
                RunOptions::new("key", CacheStrategy::long()),
                move |_| async move {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok::<_, CacheError>(n)
                },
            )
        };

        let (a, b) = tokio::join!(slow_run(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            slow_run().await
        });

        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(with_cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_store_failures_degrade_to_uncached() {
        let with_cache = WithCache::new(WithCacheOptions::new(FailingStore));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = counted_run(&with_cache, &calls, CacheStrategy::long()).await.unwrap();
        let second = counted_run(&with_cache, &calls, CacheStrategy::long()).await.unwrap();

        assert_eq!(first, "value-1");
        assert_eq!(second, "value-2");
    }

    #[tokio::test]
    async fn test_without_store_runs_inline() {
        let with_cache = WithCache::new(WithCacheOptions::without_store());
        let calls = Arc::new(AtomicUsize::new(0));

        counted_run(&with_cache, &calls, CacheStrategy::long()).await.unwrap();
        counted_run(&with_cache, &calls, CacheStrategy::long()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
