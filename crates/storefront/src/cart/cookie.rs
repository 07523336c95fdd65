//! Default cart id persistence in a `cart` cookie.
//!
//! The cookie stores only the last segment of the cart gid
//! (`c1-abc?key=...`), URL-encoded.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, header};
use cookie::{Cookie, SameSite, time::Duration};
use headwater_core::CartId;
use tracing::warn;

use super::handler::{CartIdGetter, CartIdSetter};

/// Cookie name holding the cart token.
pub const CART_COOKIE: &str = "cart";

/// Attributes of the cart cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    /// Add `Secure` (HTTPS deployments).
    pub secure: bool,
    pub http_only: bool,
    /// `Max-Age` in seconds; session cookie when unset.
    pub max_age: Option<u64>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            secure: false,
            http_only: true,
            max_age: None,
        }
    }
}

/// Read the cart id from the request's `cart` cookie.
#[must_use]
pub fn read_cart_cookie(headers: &HeaderMap) -> Option<CartId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookies| {
            let cart = Cookie::split_parse(cookies)
                .filter_map(Result::ok)
                .find(|cookie| cookie.name() == CART_COOKIE)?;
            let token = urlencoding::decode(cart.value_trimmed()).ok()?;
            CartId::from_token(&token).ok()
        })
}

/// Cart id getter reading the `cart` cookie of `headers`.
#[must_use]
pub fn cart_get_id_default(headers: &HeaderMap) -> CartIdGetter {
    let cart_id = read_cart_cookie(headers);
    Arc::new(move || cart_id.clone())
}

/// Render the `Set-Cookie` value for a cart id.
#[must_use]
pub fn cart_cookie_value(cart_id: &CartId, options: &CookieOptions) -> String {
    let mut cookie = Cookie::build((CART_COOKIE, urlencoding::encode(cart_id.token())))
        .path(options.path.clone())
        .same_site(SameSite::Lax)
        .http_only(options.http_only)
        .secure(options.secure);
    if let Some(max_age) = options.max_age {
        cookie = cookie.max_age(Duration::seconds(i64::try_from(max_age).unwrap_or(i64::MAX)));
    }
    cookie.build().to_string()
}

/// Cart id setter answering with a `Set-Cookie` header.
#[must_use]
pub fn cart_set_id_default(options: CookieOptions) -> CartIdSetter {
    Arc::new(move |cart_id: &CartId| {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&cart_cookie_value(cart_id, &options)) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Cart id is not a valid cookie value"),
        }
        headers
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request_headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_read_cart_cookie() {
        let headers = request_headers("theme=dark; cart=c1-abc%3Fkey%3Dxyz; other=1");
        let cart_id = read_cart_cookie(&headers).unwrap();
        assert_eq!(cart_id.as_str(), "gid://shopify/Cart/c1-abc?key=xyz");
    }

    #[test]
    fn test_missing_or_empty_cookie() {
        assert!(read_cart_cookie(&HeaderMap::new()).is_none());
        assert!(read_cart_cookie(&request_headers("cart=")).is_none());
        assert!(read_cart_cookie(&request_headers("carts=c1")).is_none());
    }

    #[test]
    fn test_quoted_cookie_value() {
        let cart_id = read_cart_cookie(&request_headers("cart=\"c1-abc\"")).unwrap();
        assert_eq!(cart_id.as_str(), "gid://shopify/Cart/c1-abc");
    }

    #[test]
    fn test_session_cookie_without_flags() {
        let value = cart_cookie_value(
            &CartId::from_token("c1-abc").unwrap(),
            &CookieOptions {
                http_only: false,
                ..Default::default()
            },
        );
        assert_eq!(value, "cart=c1-abc; SameSite=Lax; Path=/");
    }

    #[test]
    fn test_getter_uses_request_cookie() {
        let getter = cart_get_id_default(&request_headers("cart=c1-abc"));
        assert_eq!(getter().unwrap().token(), "c1-abc");
    }

    #[test]
    fn test_setter_emits_set_cookie() {
        let setter = cart_set_id_default(CookieOptions {
            secure: true,
            max_age: Some(1_209_600),
            ..Default::default()
        });
        let headers = setter(&CartId::parse("gid://shopify/Cart/c1-abc?key=xyz").unwrap());

        assert_eq!(
            headers.get(header::SET_COOKIE).unwrap(),
            "cart=c1-abc%3Fkey%3Dxyz; HttpOnly; SameSite=Lax; Secure; Path=/; Max-Age=1209600"
        );
    }

    #[test]
    fn test_cookie_round_trips_through_getter() {
        let cart_id = CartId::from_token("c1-abc?key=xyz").unwrap();
        let value = cart_cookie_value(&cart_id, &CookieOptions::default());
        let pair = value.split(';').next().unwrap();

        assert_eq!(read_cart_cookie(&request_headers(pair)), Some(cart_id));
    }
}
