//! Shopify Storefront API client.
//!
//! # Architecture
//!
//! - Every request goes through [`WithCache::fetch`](crate::cache::WithCache::fetch):
//!   queries are cached (default `CacheShort`), mutations never are
//! - Responses with GraphQL `errors` are returned but not cached
//! - The cart handler talks to the API only through the [`StorefrontApi`]
//!   trait, so it can be exercised without a network
//!
//! # Example
//!
//! ```rust,ignore
//! use headwater_storefront::shopify::{StorefrontClient, StorefrontRequest};
//!
//! let client = StorefrontClient::new(&config.shopify, &config.i18n, with_cache);
//!
//! let response = client
//!     .query(StorefrontRequest::new("query Shop { shop { name } }").display_name("Shop"))
//!     .await?;
//! ```

mod storefront;
pub mod types;

pub use storefront::{
    GraphQLResponse, StorefrontApi, StorefrontClient, StorefrontRequest, minify_query,
};
pub use types::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheError;

/// Errors that can occur when interacting with the Storefront API.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// The request could not be sent or its response could not be read.
    #[error("Request failed: {0}")]
    Cache(#[from] CacheError),

    /// GraphQL query returned errors and no data.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by Shopify.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// A query was passed where a mutation was expected, or the reverse.
    #[error("Invalid operation for {0}: {1}")]
    InvalidOperation(&'static str, String),
}

/// A GraphQL error returned by the Shopify API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Source locations in the query.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<GraphQLErrorLocation>,
    /// Path to the error in the response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<serde_json::Value>,
}

impl GraphQLError {
    /// An error with only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: vec![],
            path: vec![],
        }
    }
}

impl From<graphql_client::Error> for GraphQLError {
    fn from(e: graphql_client::Error) -> Self {
        Self {
            message: e.message,
            locations: e.locations.map_or_else(Vec::new, |locs| {
                locs.into_iter()
                    .map(|l| GraphQLErrorLocation {
                        line: i64::from(l.line),
                        column: i64::from(l.column),
                    })
                    .collect()
            }),
            path: e.path.map_or_else(Vec::new, |p| {
                p.into_iter()
                    .map(|fragment| match fragment {
                        graphql_client::PathFragment::Key(s) => serde_json::Value::String(s),
                        graphql_client::PathFragment::Index(i) => {
                            serde_json::Value::Number(i.into())
                        }
                    })
                    .collect()
            }),
        }
    }
}

/// Location in a GraphQL query where an error occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i64,
    /// Column number (1-indexed).
    pub column: i64,
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    if errors.is_empty() {
        return "(no error details provided)".to_string();
    }

    errors
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let mut parts = Vec::new();

            if !e.message.is_empty() {
                parts.push(e.message.clone());
            }

            if !e.path.is_empty() {
                let path_str = e
                    .path
                    .iter()
                    .map(|p| match p {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(".");
                parts.push(format!("path: {path_str}"));
            }

            if let Some(loc) = e.locations.first() {
                parts.push(format!("at line {}:{}", loc.line, loc.column));
            }

            if parts.is_empty() {
                format!("[error {}]: (no details)", i + 1)
            } else {
                parts.join(" ")
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphql_error_formatting() {
        let err = ShopifyError::GraphQL(vec![
            GraphQLError::message("Field not found"),
            GraphQLError::message("Invalid ID"),
        ]);
        assert_eq!(
            err.to_string(),
            "GraphQL errors: Field not found; Invalid ID"
        );
    }

    #[test]
    fn test_graphql_error_empty_messages() {
        let errors = vec![GraphQLError {
            message: String::new(),
            locations: vec![GraphQLErrorLocation { line: 5, column: 10 }],
            path: vec![
                serde_json::Value::String("cart".to_string()),
                serde_json::Value::Number(0.into()),
            ],
        }];
        let err = ShopifyError::GraphQL(errors);
        assert_eq!(err.to_string(), "GraphQL errors: path: cart.0 at line 5:10");
    }

    #[test]
    fn test_graphql_error_no_details() {
        let err = ShopifyError::GraphQL(vec![GraphQLError::message("")]);
        assert_eq!(err.to_string(), "GraphQL errors: [error 1]: (no details)");
    }

    #[test]
    fn test_graphql_error_empty_vec() {
        let err = ShopifyError::GraphQL(vec![]);
        assert_eq!(
            err.to_string(),
            "GraphQL errors: (no error details provided)"
        );
    }

    #[test]
    fn test_rate_limited_error() {
        let err = ShopifyError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
    }

    #[test]
    fn test_graphql_error_from_client_error() {
        let raw: graphql_client::Error = serde_json::from_value(serde_json::json!({
            "message": "Throttled",
            "locations": [{"line": 1, "column": 2}],
            "path": ["cart", 3]
        }))
        .unwrap_or_else(|e| panic!("{e}"));

        let err = GraphQLError::from(raw);
        assert_eq!(err.message, "Throttled");
        assert_eq!(err.locations, vec![GraphQLErrorLocation { line: 1, column: 2 }]);
        assert_eq!(err.path, vec![serde_json::json!("cart"), serde_json::json!(3)]);
    }
}
