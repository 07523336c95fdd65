//! Shopify Storefront API client implementation.
//!
//! Documents are sent as raw GraphQL strings through the sub-request cache.
//! `graphql_client` supplies the response envelope and error types.

use std::sync::Arc;

use async_trait::async_trait;
use graphql_client::Response;
use headwater_core::{CacheKey, CacheStrategy};
use secrecy::ExposeSecret;
use serde_json::{Map, Value, json};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::cache::{FetchOptions, FetchRequest, RequestDebugInfo, ResponseInfo, WithCache};
use crate::config::{I18nConfig, ShopifyStorefrontConfig};
use crate::shopify::{GraphQLError, ShopifyError};

const PUBLIC_TOKEN_HEADER: &str = "X-Shopify-Storefront-Access-Token";
const PRIVATE_TOKEN_HEADER: &str = "Shopify-Storefront-Private-Token";
const REQUEST_GROUP_ID_HEADER: &str = "Custom-Storefront-Request-Group-ID";
const SDK_VARIANT_HEADER: &str = "X-SDK-Variant";
const SDK_VARIANT_SOURCE_HEADER: &str = "X-SDK-Variant-Source";
const SDK_VERSION_HEADER: &str = "X-SDK-Version";
const SDK_VARIANT: &str = "headwater";
const SDK_VARIANT_SOURCE: &str = "rust";
const USER_AGENT: &str = concat!("Headwater ", env!("CARGO_PKG_VERSION"));

/// Maximum characters of a response body written to logs.
const LOG_BODY_LIMIT: usize = 500;

// =============================================================================
// Request / response
// =============================================================================

/// A GraphQL document with its variables and caching options.
#[derive(Debug, Clone)]
pub struct StorefrontRequest {
    pub document: String,
    pub variables: Map<String, Value>,
    /// Ignored for mutations. Defaults to `CacheShort`.
    pub cache: Option<CacheStrategy>,
    /// Name shown by the sub-request profiler.
    pub display_name: Option<String>,
    /// Extra headers for this request only. Not part of the cache key.
    pub headers: Vec<(String, String)>,
}

impl StorefrontRequest {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            variables: Map::new(),
            cache: None,
            display_name: None,
            headers: Vec::new(),
        }
    }

    /// Replace the variables. Non-object values are ignored.
    #[must_use]
    pub fn variables(mut self, variables: Value) -> Self {
        if let Value::Object(map) = variables {
            self.variables = map;
        }
        self
    }

    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub const fn cache(mut self, strategy: CacheStrategy) -> Self {
        self.cache = Some(strategy);
        self
    }

    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// `data` of a GraphQL response, together with any partial errors.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQLResponse {
    pub data: Value,
    pub errors: Vec<GraphQLError>,
}

/// The subset of the Storefront API the cart handler needs.
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    /// Run a query.
    async fn query(&self, request: StorefrontRequest) -> Result<GraphQLResponse, ShopifyError>;

    /// Run a mutation. Never cached.
    async fn mutate(&self, request: StorefrontRequest) -> Result<GraphQLResponse, ShopifyError>;
}

// =============================================================================
// StorefrontClient
// =============================================================================

/// Client for the Shopify Storefront API.
#[derive(Clone)]
pub struct StorefrontClient {
    inner: Arc<StorefrontClientInner>,
}

struct StorefrontClientInner {
    with_cache: WithCache,
    endpoint: String,
    headers: Vec<(String, String)>,
    cache_key_header: String,
    i18n: I18nConfig,
}

impl StorefrontClient {
    /// Create a new Storefront API client.
    ///
    /// The private token is used when configured, the public one otherwise.
    #[must_use]
    pub fn new(config: &ShopifyStorefrontConfig, i18n: &I18nConfig, with_cache: WithCache) -> Self {
        let token_header = config.storefront_private_token.as_ref().map_or_else(
            || (PUBLIC_TOKEN_HEADER, config.storefront_public_token.clone()),
            |token| (PRIVATE_TOKEN_HEADER, token.expose_secret().to_string()),
        );

        let headers = vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("user-agent".to_string(), USER_AGENT.to_string()),
            (SDK_VARIANT_HEADER.to_string(), SDK_VARIANT.to_string()),
            (SDK_VARIANT_SOURCE_HEADER.to_string(), SDK_VARIANT_SOURCE.to_string()),
            (SDK_VERSION_HEADER.to_string(), config.api_version.clone()),
            (token_header.0.to_string(), token_header.1),
        ];

        // Only headers that do not identify the buyer or the request take part
        // in the cache key. The public token is shared by all buyers.
        let cache_key_header = json!({
            "content-type": "application/json",
            "user-agent": USER_AGENT,
            SDK_VARIANT_HEADER: SDK_VARIANT,
            SDK_VARIANT_SOURCE_HEADER: SDK_VARIANT_SOURCE,
            SDK_VERSION_HEADER: config.api_version,
            PUBLIC_TOKEN_HEADER: config.storefront_public_token,
        })
        .to_string();

        Self {
            inner: Arc::new(StorefrontClientInner {
                with_cache,
                endpoint: config.api_url(),
                headers,
                cache_key_header,
                i18n: i18n.clone(),
            }),
        }
    }

    /// The GraphQL endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Locale injected into documents that declare `$country` / `$language`.
    #[must_use]
    pub fn i18n(&self) -> &I18nConfig {
        &self.inner.i18n
    }

    /// Fill `$country` / `$language` from the configured locale when the
    /// document declares them and the caller did not.
    fn with_locale(&self, document: &str, mut variables: Map<String, Value>) -> Map<String, Value> {
        if document.contains("$country") && !variables.contains_key("country") {
            variables.insert("country".to_string(), json!(self.inner.i18n.country));
        }
        if document.contains("$language") && !variables.contains_key("language") {
            variables.insert("language".to_string(), json!(self.inner.i18n.language));
        }
        variables
    }

    /// Execute a GraphQL document.
    async fn execute(
        &self,
        request: StorefrontRequest,
        document: String,
        is_mutation: bool,
    ) -> Result<GraphQLResponse, ShopifyError> {
        let variables = self.with_locale(&document, request.variables);
        let body = json!({ "query": document, "variables": variables }).to_string();
        let request_id = Uuid::new_v4().to_string();
        let endpoint = &self.inner.endpoint;

        let mut fetch_request = FetchRequest::post(body.clone());
        for (name, value) in self.inner.headers.iter().chain(&request.headers) {
            fetch_request = fetch_request.header(name.as_str(), value.as_str());
        }
        fetch_request = fetch_request.header(REQUEST_GROUP_ID_HEADER, request_id.as_str());

        let strategy = if is_mutation {
            CacheStrategy::none()
        } else {
            request.cache.unwrap_or_else(CacheStrategy::short)
        };

        let options = FetchOptions::default()
            .strategy(strategy)
            .cache_key(CacheKey::new([
                json!(endpoint),
                json!("POST"),
                json!(self.inner.cache_key_header),
                json!(body),
            ]))
            .should_cache_response(|body, _| body.get("errors").is_none_or(Value::is_null))
            .debug_info(RequestDebugInfo {
                url: Some(endpoint.clone()),
                request_id: Some(request_id),
                graphql: Some(body.clone()),
                purpose: None,
                display_name: request.display_name,
            });

        let result = self
            .inner
            .with_cache
            .fetch(endpoint, fetch_request, options)
            .await?;

        parse_response(&result.response)
    }
}

/// Turn a (possibly cached) HTTP response into data and errors.
fn parse_response(response: &ResponseInfo) -> Result<GraphQLResponse, ShopifyError> {
    if response.status == 429 {
        let retry_after = response
            .header("Retry-After")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(ShopifyError::RateLimited(retry_after));
    }

    if !response.ok() {
        let body_text = body_text(&response.body);
        error!(
            status = response.status,
            body = %body_text.chars().take(LOG_BODY_LIMIT).collect::<String>(),
            "Shopify API returned non-success status"
        );

        // The API answers either with a plain string or a JSON `{errors}`.
        let errors = response
            .body
            .get("errors")
            .cloned()
            .and_then(|errors| serde_json::from_value::<Vec<GraphQLError>>(errors).ok())
            .filter(|errors| !errors.is_empty())
            .unwrap_or_else(|| {
                vec![GraphQLError::message(format!(
                    "HTTP {}: {}",
                    response.status,
                    body_text.chars().take(200).collect::<String>()
                ))]
            });
        return Err(ShopifyError::GraphQL(errors));
    }

    let parsed: Response<Value> = serde_json::from_value(response.body.clone()).map_err(|e| {
        error!(
            error = %e,
            body = %body_text(&response.body).chars().take(LOG_BODY_LIMIT).collect::<String>(),
            "Failed to parse Shopify GraphQL response"
        );
        ShopifyError::Parse(e)
    })?;

    let errors: Vec<GraphQLError> = parsed
        .errors
        .unwrap_or_default()
        .into_iter()
        .map(GraphQLError::from)
        .collect();

    if !errors.is_empty() {
        debug!(errors = ?errors, "GraphQL errors in response");
    }

    match parsed.data {
        Some(data) if !data.is_null() => Ok(GraphQLResponse { data, errors }),
        _ if !errors.is_empty() => Err(ShopifyError::GraphQL(errors)),
        _ => {
            error!(
                body = %body_text(&response.body).chars().take(LOG_BODY_LIMIT).collect::<String>(),
                "Shopify GraphQL response has no data and no errors"
            );
            Err(ShopifyError::GraphQL(vec![GraphQLError::message(
                "No data in response",
            )]))
        }
    }
}

fn body_text(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl StorefrontApi for StorefrontClient {
    #[instrument(skip(self, request), fields(display_name = ?request.display_name))]
    async fn query(&self, request: StorefrontRequest) -> Result<GraphQLResponse, ShopifyError> {
        let document = minify_query(&request.document);
        if !declares_operation(&document, "query") {
            return Err(ShopifyError::InvalidOperation(
                "storefront.query",
                "can only execute queries".to_string(),
            ));
        }
        self.execute(request, document, false).await
    }

    #[instrument(skip(self, request), fields(display_name = ?request.display_name))]
    async fn mutate(&self, request: StorefrontRequest) -> Result<GraphQLResponse, ShopifyError> {
        let document = minify_query(&request.document);
        if !declares_operation(&document, "mutation") {
            return Err(ShopifyError::InvalidOperation(
                "storefront.mutate",
                "can only execute mutations".to_string(),
            ));
        }
        self.execute(request, document, true).await
    }
}

impl std::fmt::Debug for StorefrontClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontClient")
            .field("endpoint", &self.inner.endpoint)
            .field("i18n", &self.inner.i18n)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Document helpers
// =============================================================================

/// Strip `#` comments and collapse whitespace.
#[must_use]
pub fn minify_query(document: &str) -> String {
    document
        .lines()
        .map(|line| line.split_once('#').map_or(line, |(code, _)| code))
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a minified document defines an operation of kind `keyword`
/// (`query` / `mutation`), either first or right after another definition.
fn declares_operation(document: &str, keyword: &str) -> bool {
    let lower = document.to_ascii_lowercase();
    lower.match_indices(keyword).any(|(idx, _)| {
        let before = &lower[..idx];
        let starts_definition =
            before.is_empty() || (before.trim_end().ends_with('}') && before.ends_with(' '));
        let next = lower[idx + keyword.len()..].chars().next();
        starts_definition && matches!(next, Some(' ' | '(' | '{'))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_query() {
        let doc = "
            # leading comment
            query Cart($id: ID!) {   # trailing comment
              cart(id: $id) {
                id
              }
            }
        ";
        assert_eq!(minify_query(doc), "query Cart($id: ID!) { cart(id: $id) { id } }");
    }

    #[test]
    fn test_declares_operation() {
        assert!(declares_operation("query Cart { cart { id } }", "query"));
        assert!(!declares_operation("{ shop { name } }", "query"));
        assert!(declares_operation(
            "fragment F on Cart { id } query Cart { cart { ...F } }",
            "query"
        ));
        assert!(declares_operation("mutation cartCreate($input: CartInput) { x }", "mutation"));
        assert!(!declares_operation("query Cart { cart { id } }", "mutation"));
        assert!(!declares_operation("query Q { mutationLog { id } }", "mutation"));
    }

    #[test]
    fn test_parse_response_with_partial_errors() {
        let response = ResponseInfo {
            url: "https://shop/api".to_string(),
            status: 200,
            status_text: "OK".to_string(),
            headers: vec![],
            body: json!({
                "data": {"cart": null},
                "errors": [{"message": "Cart not accessible"}]
            }),
        };

        let parsed = parse_response(&response).unwrap();
        assert_eq!(parsed.data, json!({"cart": null}));
        assert_eq!(parsed.errors[0].message, "Cart not accessible");
    }

    #[test]
    fn test_parse_response_errors_without_data() {
        let response = ResponseInfo {
            url: "https://shop/api".to_string(),
            status: 200,
            status_text: "OK".to_string(),
            headers: vec![],
            body: json!({"errors": [{"message": "Syntax error"}]}),
        };

        let err = parse_response(&response).unwrap_err();
        assert_eq!(err.to_string(), "GraphQL errors: Syntax error");
    }

    #[test]
    fn test_parse_response_rate_limited() {
        let response = ResponseInfo {
            url: "https://shop/api".to_string(),
            status: 429,
            status_text: "Too Many Requests".to_string(),
            headers: vec![("retry-after".to_string(), "7".to_string())],
            body: json!(""),
        };

        assert!(matches!(
            parse_response(&response).unwrap_err(),
            ShopifyError::RateLimited(7)
        ));
    }

    #[test]
    fn test_parse_response_plain_text_failure() {
        let response = ResponseInfo {
            url: "https://shop/api".to_string(),
            status: 401,
            status_text: "Unauthorized".to_string(),
            headers: vec![],
            body: json!("Invalid token"),
        };

        let err = parse_response(&response).unwrap_err();
        assert_eq!(err.to_string(), "GraphQL errors: HTTP 401: Invalid token");
    }

    #[test]
    fn test_locale_injection() {
        let config = ShopifyStorefrontConfig {
            store: "test.myshopify.com".to_string(),
            api_version: "2026-01".to_string(),
            storefront_public_token: "public".to_string(),
            storefront_private_token: None,
        };
        let i18n = I18nConfig {
            country: "CA".to_string(),
            language: "FR".to_string(),
        };
        let client = StorefrontClient::new(
            &config,
            &i18n,
            WithCache::new(crate::cache::WithCacheOptions::without_store()),
        );

        let mut given = Map::new();
        given.insert("language".to_string(), json!("EN"));

        let vars = client.with_locale("query Q($country: CountryCode, $language: LanguageCode) { x }", given);
        assert_eq!(vars["country"], "CA");
        assert_eq!(vars["language"], "EN");

        let untouched = client.with_locale("query Q { x }", Map::new());
        assert!(untouched.is_empty());
    }
}
