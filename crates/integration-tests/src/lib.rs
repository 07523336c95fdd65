//! Integration tests for Headwater.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p headwater-integration-tests
//! ```
//!
//! Every test serves its own origins on `127.0.0.1:0`, so no Shopify store
//! or credentials are needed.
//!
//! # Test Categories
//!
//! - `sub_request_cache` - `WithCache` against a counting HTTP origin
//! - `storefront_cart` - the demo server against a mock Storefront API

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral local port and return its base URL.
///
/// # Panics
///
/// Panics if no local port can be bound.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

/// Shared request counter for test origins.
#[derive(Debug, Clone, Default)]
pub struct HitCounter(Arc<AtomicUsize>);

impl HitCounter {
    /// Count one request and return the new total.
    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Requests counted so far.
    #[must_use]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
