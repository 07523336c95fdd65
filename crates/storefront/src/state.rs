//! Application state shared across handlers.

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::cache::{
    DEFAULT_EVENT_CAPACITY, EventLog, InMemoryCache, TaskTracker, WithCache, WithCacheOptions,
};
use crate::cart::{
    CartHandler, CartHandlerOptions, CookieOptions, cart_get_id_default, cart_set_id_default,
};
use crate::config::StorefrontConfig;
use crate::shopify::StorefrontClient;

/// Cart cookie lifetime: 14 days.
const CART_COOKIE_MAX_AGE: u64 = 60 * 60 * 24 * 14;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and owns the one sub-request
/// cache of the process, so concurrent requests share in-flight computations.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    with_cache: WithCache,
    tasks: TaskTracker,
    storefront: StorefrontClient,
}

impl AppState {
    /// Create a new application state with an in-memory cache.
    #[must_use]
    pub fn new(config: StorefrontConfig) -> Self {
        let tasks = TaskTracker::new();
        let event_log = if config.cache.profiler {
            EventLog::new(DEFAULT_EVENT_CAPACITY)
        } else {
            EventLog::disabled()
        };

        let with_cache = WithCache::new(
            WithCacheOptions::new(InMemoryCache::new(config.cache.max_entries))
                .with_wait_until(Arc::new(tasks.clone()))
                .with_event_log(event_log),
        );
        let storefront = StorefrontClient::new(&config.shopify, &config.i18n, with_cache.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                with_cache,
                tasks,
                storefront,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the sub-request cache.
    #[must_use]
    pub fn with_cache(&self) -> &WithCache {
        &self.inner.with_cache
    }

    /// Background revalidations still running.
    #[must_use]
    pub fn tasks(&self) -> &TaskTracker {
        &self.inner.tasks
    }

    /// Get a reference to the Shopify Storefront API client.
    #[must_use]
    pub fn storefront(&self) -> &StorefrontClient {
        &self.inner.storefront
    }

    /// Cart handler for one request, reading and writing the `cart` cookie.
    #[must_use]
    pub fn cart(&self, headers: &HeaderMap) -> CartHandler {
        CartHandler::new(CartHandlerOptions {
            storefront: Arc::new(self.inner.storefront.clone()),
            get_cart_id: cart_get_id_default(headers),
            set_cart_id: cart_set_id_default(CookieOptions {
                secure: self.inner.config.secure_cookies(),
                max_age: Some(CART_COOKIE_MAX_AGE),
                ..CookieOptions::default()
            }),
            cart_query_fragment: None,
            cart_mutate_fragment: None,
        })
    }
}
