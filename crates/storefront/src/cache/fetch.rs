//! Cached HTTP fetch on top of [`WithCache`].
//!
//! Responses are cached in a serializable `[body, {status, statusText,
//! headers}]` form. Only responses with a status below 400 that pass the
//! caller's predicate are written.

use std::sync::Arc;

use futures::FutureExt;
use headwater_core::{CacheKey, CacheStrategy};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;
use url::Url;

use super::CacheError;
use super::events::RequestDebugInfo;
use super::store::{CachedDebugInfo, ResponseInit};
use super::with_cache::{Action, Computed, RunContext, WithCache};

/// Predicate deciding whether a response may be cached.
pub type ShouldCacheResponse = Arc<dyn Fn(&Value, &ResponseInfo) -> bool + Send + Sync>;

/// How to decode the response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnType {
    /// Decode as JSON, falling back to a string when the body is not JSON.
    #[default]
    Json,
    Text,
}

/// Outgoing request.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchRequest {
    #[must_use]
    pub fn get() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn post(body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Per-call options for [`WithCache::fetch`].
#[derive(Clone, Default)]
pub struct FetchOptions {
    /// Defaults to [`CacheStrategy::short`] for `GET` and no caching otherwise.
    pub strategy: Option<CacheStrategy>,
    /// Defaults to `[url, method, body]`.
    pub cache_key: Option<CacheKey>,
    pub should_cache_response: Option<ShouldCacheResponse>,
    pub return_type: ReturnType,
    pub debug_info: Option<RequestDebugInfo>,
    pub cache_tags: Vec<String>,
}

impl FetchOptions {
    #[must_use]
    pub fn strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn cache_key(mut self, key: impl Into<CacheKey>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn should_cache_response(
        mut self,
        predicate: impl Fn(&Value, &ResponseInfo) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_cache_response = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub const fn return_type(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    #[must_use]
    pub fn debug_info(mut self, debug_info: RequestDebugInfo) -> Self {
        self.debug_info = Some(debug_info);
        self
    }
}

/// A response as seen by the caller, whether it came from the network or
/// the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    /// Decoded body, kept even for unsuccessful responses.
    pub body: Value,
}

impl ResponseInfo {
    /// Whether the status is 2xx.
    #[must_use]
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header named `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn new(url: &str, body: Value, init: ResponseInit) -> Self {
        Self {
            url: url.to_string(),
            status: init.status,
            status_text: init.status_text,
            headers: init.headers,
            body,
        }
    }
}

/// Result of [`WithCache::fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// The decoded body for successful responses, `None` otherwise.
    pub data: Option<Value>,
    pub response: ResponseInfo,
}

impl WithCache {
    /// Fetch `url`, caching the decoded response under `options.strategy`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidRequest`] for an unparseable url,
    /// [`CacheError::Http`] when the request cannot be sent, and
    /// [`CacheError::Action`] when the body cannot be read.
    #[instrument(skip(self, request, options), fields(method = %request.method))]
    pub async fn fetch(
        &self,
        url: &str,
        request: FetchRequest,
        options: FetchOptions,
    ) -> Result<FetchResult, CacheError> {
        let url = Url::parse(url)
            .map_err(|e| CacheError::InvalidRequest(format!("{url}: {e}")))?
            .to_string();

        let strategy = options.strategy.unwrap_or_else(|| {
            if request.method == Method::GET {
                CacheStrategy::short()
            } else {
                CacheStrategy::none()
            }
        });

        let cache_key = options.cache_key.unwrap_or_else(|| {
            CacheKey::new([
                json!(url),
                json!(request.method.as_str()),
                json!(request.body),
            ])
        });

        let mut debug_info = options.debug_info.unwrap_or_default();
        debug_info.url.get_or_insert_with(|| url.clone());

        let context = RunContext {
            key: cache_key.hash(),
            strategy,
            debug_info,
            tags: options.cache_tags,
        };

        let http = self.http().clone();
        let should_cache = options.should_cache_response;
        let return_type = options.return_type;
        let request_url = url.clone();

        let action: Action = Box::new(move |recorder| {
            async move {
                let mut builder = http.request(request.method, &request_url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                if let Some(body) = request.body {
                    builder = builder.body(body);
                }

                let response = builder.send().await?;
                let status = response.status();
                let init = ResponseInit {
                    status: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or_default().to_string(),
                    headers: response
                        .headers()
                        .iter()
                        .filter_map(|(name, value)| {
                            value
                                .to_str()
                                .ok()
                                .map(|value| (name.as_str().to_string(), value.to_string()))
                        })
                        .collect(),
                };

                recorder.add_debug_data(CachedDebugInfo {
                    display_name: None,
                    url: Some(request_url.clone()),
                    response_init: Some(init.clone()),
                });

                let request_id = response
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown")
                    .to_string();

                let text = response.text().await.map_err(|_| {
                    CacheError::action(format!(
                        "Response code: {} (Request Id: {request_id})",
                        status.as_u16()
                    ))
                })?;

                let body = match return_type {
                    ReturnType::Json => match serde_json::from_str::<Value>(&text) {
                        Ok(value) => value,
                        Err(_) => Value::String(text),
                    },
                    ReturnType::Text => Value::String(text),
                };

                let cacheable = status.as_u16() < 400
                    && should_cache.as_ref().is_none_or(|should_cache| {
                        should_cache(&body, &ResponseInfo::new(&request_url, body.clone(), init.clone()))
                    });

                Ok(Computed {
                    value: serde_json::to_value((&body, &init))?,
                    cacheable,
                })
            }
            .boxed()
        });

        let pair = self.run_erased(context, action).await?;
        let (body, init): (Value, ResponseInit) = serde_json::from_value(pair)?;
        let response = ResponseInfo::new(&url, body, init);

        Ok(FetchResult {
            data: response.ok().then(|| response.body.clone()),
            response,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryCache, WithCacheOptions};
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn origin() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));

        let app = Router::new()
            .route(
                "/json",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    axum::Json(json!({"shop": "Headwater"}))
                }),
            )
            .route(
                "/text",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "plain body"
                }),
            )
            .route(
                "/missing",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::NOT_FOUND, "not here")
                }),
            )
            .with_state(Arc::clone(&hits));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), hits)
    }

    fn with_cache() -> WithCache {
        WithCache::new(WithCacheOptions::new(InMemoryCache::default()))
    }

    #[tokio::test]
    async fn test_get_is_cached_short_by_default() {
        let (base, hits) = origin().await;
        let with_cache = with_cache();
        let url = format!("{base}/json");

        let first = with_cache
            .fetch(&url, FetchRequest::get(), FetchOptions::default())
            .await
            .unwrap();
        let second = with_cache
            .fetch(&url, FetchRequest::get(), FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(first.data, Some(json!({"shop": "Headwater"})));
        assert_eq!(first, second);
        assert_eq!(first.response.status, 200);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_post_is_not_cached_by_default() {
        let (base, hits) = origin().await;
        let with_cache = with_cache();
        let url = format!("{base}/json");

        for _ in 0..2 {
            // The origin only routes GET, so POST gets 405.
            let result = with_cache
                .fetch(&url, FetchRequest::post("{}"), FetchOptions::default())
                .await
                .unwrap();
            assert!(result.data.is_none());
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsuccessful_response_is_returned_but_not_cached() {
        let (base, hits) = origin().await;
        let with_cache = with_cache();
        let url = format!("{base}/missing");

        for _ in 0..2 {
            let result = with_cache
                .fetch(
                    &url,
                    FetchRequest::get(),
                    FetchOptions::default().strategy(CacheStrategy::long()),
                )
                .await
                .unwrap();
            assert_eq!(result.data, None);
            assert_eq!(result.response.status, 404);
            assert_eq!(result.response.body, json!("not here"));
            assert!(!result.response.ok());
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_json_body_falls_back_to_text() {
        let (base, _) = origin().await;
        let result = with_cache()
            .fetch(&format!("{base}/text"), FetchRequest::get(), FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(result.data, Some(json!("plain body")));
        assert!(result.response.header("Content-Type").is_some());
    }

    #[tokio::test]
    async fn test_should_cache_response_false_skips_cache() {
        let (base, hits) = origin().await;
        let with_cache = with_cache();
        let url = format!("{base}/json");
        let options = FetchOptions::default()
            .cache_key(["q", "abc"])
            .should_cache_response(|_, _| false);

        with_cache.fetch(&url, FetchRequest::get(), options.clone()).await.unwrap();
        with_cache.fetch(&url, FetchRequest::get(), options).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let err = with_cache()
            .fetch("not a url", FetchRequest::get(), FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidRequest(_)));
    }
}
