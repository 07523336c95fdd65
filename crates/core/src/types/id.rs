//! Newtype wrappers for Shopify global IDs.
//!
//! Use the `define_gid!` macro to create type-safe wrappers around
//! `gid://shopify/<Resource>/<token>` strings that prevent accidentally mixing
//! IDs of different resources.

/// Error parsing a Shopify global ID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GidError {
    #[error("expected a gid://shopify/{expected}/... id, got {got}")]
    WrongResource { expected: &'static str, got: String },
    #[error("global id has an empty token")]
    EmptyToken,
}

/// Macro to define a type-safe Shopify global ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`
/// - `parse()` for full `gid://` strings, `from_token()` for the bare token
/// - `token()` returning the last path segment (what cookies store)
///
/// # Example
///
/// ```rust
/// # use headwater_core::define_gid;
/// define_gid!(CartId, "Cart");
///
/// let id = CartId::from_token("c1-123").unwrap();
/// assert_eq!(id.as_str(), "gid://shopify/Cart/c1-123");
/// assert_eq!(id.token(), "c1-123");
/// ```
#[macro_export]
macro_rules! define_gid {
    ($name:ident, $resource:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Resource name in the `gid://shopify/<Resource>/` prefix.
            pub const RESOURCE: &'static str = $resource;

            /// Parse a full global ID.
            ///
            /// # Errors
            ///
            /// Returns an error if the ID belongs to a different resource or has no token.
            pub fn parse(gid: &str) -> ::core::result::Result<Self, $crate::types::id::GidError> {
                let prefix = concat!("gid://shopify/", $resource, "/");
                let token = gid.strip_prefix(prefix).ok_or_else(|| {
                    $crate::types::id::GidError::WrongResource {
                        expected: $resource,
                        got: gid.to_string(),
                    }
                })?;
                Self::from_token(token)
            }

            /// Build a global ID from its bare token.
            ///
            /// # Errors
            ///
            /// Returns an error if the token is empty.
            pub fn from_token(token: &str) -> ::core::result::Result<Self, $crate::types::id::GidError> {
                if token.is_empty() {
                    return Err($crate::types::id::GidError::EmptyToken);
                }
                Ok(Self(format!(concat!("gid://shopify/", $resource, "/{}"), token)))
            }

            /// The full `gid://` string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The last path segment (query parameters included).
            #[must_use]
            pub fn token(&self) -> &str {
                self.0.rsplit('/').next().unwrap_or_default()
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::types::id::GidError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_gid!(CartId, "Cart");
define_gid!(CartLineId, "CartLine");
define_gid!(ProductVariantId, "ProductVariant");

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cart_id() {
        let id = CartId::parse("gid://shopify/Cart/c1-123").unwrap();
        assert_eq!(id.token(), "c1-123");
        assert_eq!(id.to_string(), "gid://shopify/Cart/c1-123");
    }

    #[test]
    fn test_token_keeps_query_key() {
        let id = CartId::parse("gid://shopify/Cart/c1-abc?key=xyz").unwrap();
        assert_eq!(id.token(), "c1-abc?key=xyz");
    }

    #[test]
    fn test_wrong_resource_rejected() {
        let err = CartId::parse("gid://shopify/Product/1").unwrap_err();
        assert!(matches!(err, GidError::WrongResource { expected: "Cart", .. }));
    }

    #[test]
    fn test_empty_token_rejected() {
        assert_eq!(CartId::from_token("").unwrap_err(), GidError::EmptyToken);
        assert_eq!(
            CartId::parse("gid://shopify/Cart/").unwrap_err(),
            GidError::EmptyToken
        );
    }

    #[test]
    fn test_serde_transparent() {
        let id = CartLineId::from_token("42").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"gid://shopify/CartLine/42\"");
        let back: CartLineId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
