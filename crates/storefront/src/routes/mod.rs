//! HTTP route handlers for the demo storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health               - Health check
//!
//! # Cart (JSON)
//! GET    /cart                 - Current cart
//! POST   /cart                 - Cart action (form with cartFormInput)
//! GET    /cart/count           - Cart item count
//!
//! # Checkout
//! GET    /checkout             - Redirect to Shopify checkout
//!
//! # Profiler (SUBREQUEST_PROFILER=true only)
//! GET    /debug/subrequests    - Recent sub-request events
//! DELETE /debug/subrequests    - Clear recorded events
//! ```

pub mod cart;
pub mod debug;

use axum::{Router, extract::Request, middleware as axum_middleware, routing::get};
use tower_http::trace::TraceLayer;
use tracing::field::Empty;

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::perform))
        .route("/count", get(cart::count))
}

/// Create the profiler routes router.
pub fn debug_routes() -> Router<AppState> {
    Router::new().route(
        "/subrequests",
        get(debug::subrequests).delete(debug::clear_subrequests),
    )
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/cart", cart_routes())
        .route("/checkout", get(cart::checkout))
        .nest("/debug", debug_routes())
}

/// The full application with its middleware stack, without Sentry layers.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = Empty,
            )
        }))
        .with_state(state)
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, I18nConfig, ShopifyStorefrontConfig, StorefrontConfig};
    use axum::body::Body;
    use axum::http::{StatusCode, header};
    use tower::ServiceExt;

    fn state(profiler: bool) -> AppState {
        AppState::new(StorefrontConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            shopify: ShopifyStorefrontConfig {
                store: "test.myshopify.com".to_string(),
                api_version: "2026-01".to_string(),
                storefront_public_token: "public_token_value".to_string(),
                storefront_private_token: None,
            },
            i18n: I18nConfig::default(),
            cache: CacheConfig {
                profiler,
                ..CacheConfig::default()
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        })
    }

    fn get(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_generates_request_id() {
        let response = app(state(false)).oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers()[crate::middleware::REQUEST_ID_HEADER]
            .to_str()
            .unwrap();
        assert_eq!(id.len(), 36);
    }

    #[tokio::test]
    async fn test_cart_without_cookie_needs_no_api_call() {
        let response = app(state(false)).oneshot(get("/cart/count")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"count":0}"#);
    }

    #[tokio::test]
    async fn test_checkout_without_cart_goes_back_to_cart() {
        let response = app(state(false)).oneshot(get("/checkout")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/cart");
    }

    #[tokio::test]
    async fn test_profiler_follows_config() {
        let hidden = app(state(false))
            .oneshot(get("/debug/subrequests"))
            .await
            .unwrap();
        assert_eq!(hidden.status(), StatusCode::NOT_FOUND);

        let shown = app(state(true))
            .oneshot(get("/debug/subrequests"))
            .await
            .unwrap();
        assert_eq!(shown.status(), StatusCode::OK);
    }
}
