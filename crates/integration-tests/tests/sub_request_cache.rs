//! Integration tests for the sub-request cache.
//!
//! `WithCache` runs against a real HTTP origin that counts its hits and
//! stamps every body with the hit number, so sharing and staleness are
//! observable from the outside.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use headwater_core::{CacheKey, CacheStatus, CacheStrategy};
use headwater_integration_tests::{HitCounter, serve};
use headwater_storefront::cache::{
    CacheError, EventLog, FetchOptions, FetchRequest, InMemoryCache, ManualClock, RunOptions,
    TaskTracker, WithCache, WithCacheOptions,
};
use serde_json::{Value, json};

/// Origin serving `/products` (slow JSON), `/broken` (500), and `/gone` (404).
async fn origin() -> (String, HitCounter) {
    let hits = HitCounter::default();

    let app = Router::new()
        .route(
            "/products",
            get(|State(hits): State<HitCounter>| async move {
                let n = hits.hit();
                tokio::time::sleep(Duration::from_millis(50)).await;
                Json(json!({"q": "abc", "hit": n}))
            }),
        )
        .route(
            "/broken",
            get(|State(hits): State<HitCounter>| async move {
                let n = hits.hit();
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"hit": n})))
            }),
        )
        .route(
            "/gone",
            get(|State(hits): State<HitCounter>| async move {
                hits.hit();
                StatusCode::NOT_FOUND
            }),
        )
        .with_state(hits.clone());

    (serve(app).await, hits)
}

struct Harness {
    with_cache: WithCache,
    clock: ManualClock,
    tasks: TaskTracker,
}

fn harness() -> Harness {
    let clock = ManualClock::default();
    let tasks = TaskTracker::new();
    let with_cache = WithCache::new(
        WithCacheOptions::new(InMemoryCache::with_clock(100, Arc::new(clock.clone())))
            .with_clock(Arc::new(clock.clone()))
            .with_wait_until(Arc::new(tasks.clone()))
            .with_event_log(EventLog::new(100)),
    );
    Harness {
        with_cache,
        clock,
        tasks,
    }
}

fn short_fetch() -> FetchOptions {
    FetchOptions::default()
        .strategy(CacheStrategy::short())
        .cache_key(["q", "abc"])
}

// ============================================================================
// fetch
// ============================================================================

#[tokio::test]
async fn test_concurrent_fetches_share_one_request() {
    let (base, hits) = origin().await;
    let h = harness();
    let url = format!("{base}/products");

    let (first, second) = tokio::join!(
        h.with_cache.fetch(&url, FetchRequest::get(), short_fetch()),
        h.with_cache.fetch(&url, FetchRequest::get(), short_fetch()),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(hits.get(), 1);
    assert_eq!(first, second);
    assert_eq!(first.data, Some(json!({"q": "abc", "hit": 1})));
}

#[tokio::test]
async fn test_repeat_fetch_within_max_age_is_served_from_cache() {
    let (base, hits) = origin().await;
    let h = harness();
    let url = format!("{base}/products");

    let first = h
        .with_cache
        .fetch(&url, FetchRequest::get(), short_fetch())
        .await
        .unwrap();
    h.clock.advance_millis(500);
    let second = h
        .with_cache
        .fetch(&url, FetchRequest::get(), short_fetch())
        .await
        .unwrap();

    assert_eq!(hits.get(), 1);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_stale_fetch_is_served_then_revalidated_once() {
    let (base, hits) = origin().await;
    let h = harness();
    let url = format!("{base}/products");

    h.with_cache
        .fetch(&url, FetchRequest::get(), short_fetch())
        .await
        .unwrap();
    h.clock.advance_millis(2000);

    let (a, b) = tokio::join!(
        h.with_cache.fetch(&url, FetchRequest::get(), short_fetch()),
        h.with_cache.fetch(&url, FetchRequest::get(), short_fetch()),
    );
    assert_eq!(a.unwrap().data, Some(json!({"q": "abc", "hit": 1})));
    assert_eq!(b.unwrap().data, Some(json!({"q": "abc", "hit": 1})));

    h.tasks.drain().await;
    assert_eq!(hits.get(), 2);

    let fresh = h
        .with_cache
        .fetch(&url, FetchRequest::get(), short_fetch())
        .await
        .unwrap();
    assert_eq!(fresh.data, Some(json!({"q": "abc", "hit": 2})));
    assert_eq!(hits.get(), 2);
}

#[tokio::test]
async fn test_error_statuses_are_never_cached() {
    let (base, hits) = origin().await;
    let h = harness();

    for path in ["/broken", "/gone"] {
        let url = format!("{base}{path}");
        for _ in 0..2 {
            let result = h
                .with_cache
                .fetch(
                    &url,
                    FetchRequest::get(),
                    FetchOptions::default().strategy(CacheStrategy::long()),
                )
                .await
                .unwrap();
            assert!(result.response.status >= 400);
            assert!(result.data.is_none());
        }
    }

    assert_eq!(hits.get(), 4);
}

// ============================================================================
// run
// ============================================================================

#[tokio::test]
async fn test_concurrent_runs_execute_once() {
    let h = harness();
    let calls = HitCounter::default();

    let runs = (0..10).map(|_| {
        let calls = calls.clone();
        h.with_cache.run(
            RunOptions::new(["shop", "name"], CacheStrategy::long()),
            move |_| async move {
                tokio::time::sleep(Duration::from_millis(25)).await;
                Ok::<_, CacheError>(format!("Headwater #{}", calls.hit()))
            },
        )
    });

    for result in futures::future::join_all(runs).await {
        assert_eq!(result.unwrap(), "Headwater #1");
    }
    assert_eq!(calls.get(), 1);
    assert_eq!(h.with_cache.in_flight_count(), 0);
}

#[tokio::test]
async fn test_stale_run_returns_old_value_and_refreshes_in_background() {
    let h = harness();
    let calls = HitCounter::default();
    let key = CacheKey::from(["shop", "name"]);

    let run = |calls: HitCounter| {
        h.with_cache.run(
            RunOptions::new(key.clone(), CacheStrategy::short()),
            move |_| async move { Ok::<_, CacheError>(calls.hit()) },
        )
    };

    assert_eq!(run(calls.clone()).await.unwrap(), 1);
    h.clock.advance_millis(2000);

    assert_eq!(run(calls.clone()).await.unwrap(), 1);
    h.tasks.drain().await;
    assert!(!h.with_cache.is_revalidating(&key));

    assert_eq!(run(calls.clone()).await.unwrap(), 2);
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn test_failed_runs_are_not_cached() {
    let h = harness();
    let calls = HitCounter::default();

    for _ in 0..2 {
        let calls = calls.clone();
        let result: Result<Value, CacheError> = h
            .with_cache
            .run(
                RunOptions::new("flaky", CacheStrategy::long()),
                move |_| async move {
                    calls.hit();
                    Err::<Value, _>("upstream unavailable")
                },
            )
            .await;
        assert_eq!(result.unwrap_err().to_string(), "upstream unavailable");
    }

    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn test_rejected_results_are_not_cached() {
    let h = harness();
    let calls = HitCounter::default();

    for expected in 1..=2 {
        let counter = calls.clone();
        let value = h
            .with_cache
            .run(
                RunOptions::new("empty", CacheStrategy::long())
                    .should_cache_result(|items: &Vec<u32>| !items.is_empty()),
                move |_| async move {
                    counter.hit();
                    Ok::<Vec<u32>, CacheError>(Vec::new())
                },
            )
            .await
            .unwrap();
        assert!(value.is_empty());
        assert_eq!(calls.get(), expected);
    }
}

#[tokio::test]
async fn test_profiler_sees_every_sub_request() {
    let (base, _) = origin().await;
    let h = harness();
    let url = format!("{base}/products");

    for _ in 0..2 {
        h.with_cache
            .fetch(&url, FetchRequest::get(), short_fetch())
            .await
            .unwrap();
    }

    let events = h.with_cache.event_log().snapshot();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.url == url));
    let statuses: Vec<_> = events.iter().map(|e| e.cache_status).collect();
    assert_eq!(statuses, vec![Some(CacheStatus::Miss), Some(CacheStatus::Hit)]);
}
