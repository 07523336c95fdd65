//! Cart route handlers.
//!
//! The cart id lives in the `cart` cookie. `POST /cart` accepts a form with a
//! `cartFormInput` field and dispatches it through the
//! [`CartHandler`](crate::cart::CartHandler).

use axum::{
    Extension, Form, Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use tracing::instrument;

use crate::cart::{CartActionInput, CartActionResult};
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequestId;
use crate::shopify::{CartOptionalInput, CartQueryData};
use crate::state::AppState;

/// Form field naming a page to return to after the action.
const REDIRECT_TO: &str = "redirectTo";

/// Total item count of the current cart.
#[derive(Debug, Serialize)]
pub struct CartCount {
    pub count: i64,
}

/// Current cart as JSON. `{"cart": null}` when there is none.
#[instrument(skip(state, headers))]
pub async fn show(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<CartQueryData>> {
    let data = state.cart(&headers).get(CartOptionalInput::default()).await?;
    Ok(Json(data))
}

/// Cart item count badge.
#[instrument(skip(state, headers))]
pub async fn count(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<CartCount>> {
    let data = state.cart(&headers).get(CartOptionalInput::default()).await?;
    let count = data.cart.map_or(0, |cart| cart.total_quantity);
    Ok(Json(CartCount { count }))
}

/// Dispatch a cart form.
///
/// Answers with the action result as JSON plus the `Set-Cookie` header of a
/// new cart. A local `redirectTo` field turns the answer into a 303.
#[instrument(skip(state, request_id, headers, fields))]
pub async fn perform(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response> {
    let form = CartActionInput::from_form(fields)?;
    let redirect_to = form
        .input_str(REDIRECT_TO)
        .filter(|to| is_local_path(to))
        .map(str::to_string);
    let kind = form.action.kind();
    add_breadcrumb(
        "cart",
        "Cart action",
        Some(&[("action", kind.as_str()), ("request_id", request_id.as_str())]),
    );

    let CartActionResult {
        data,
        headers: mut response_headers,
    } = state
        .cart(&headers)
        .perform(form.action, CartOptionalInput::default())
        .await?;

    let mut status = StatusCode::OK;
    if let Some(value) = redirect_to.and_then(|to| to.parse::<HeaderValue>().ok()) {
        response_headers.insert(header::LOCATION, value);
        status = StatusCode::SEE_OTHER;
    }

    Ok((status, response_headers, Json(data)).into_response())
}

/// Redirect to the Shopify checkout of the current cart.
#[instrument(skip(state, headers))]
pub async fn checkout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match state.cart(&headers).get(CartOptionalInput::default()).await {
        Ok(CartQueryData {
            cart: Some(cart), ..
        }) => cart.checkout_url.map_or_else(
            || Redirect::to("/cart").into_response(),
            |url| Redirect::to(&url).into_response(),
        ),
        Ok(_) => Redirect::to("/cart").into_response(),
        Err(e) => {
            tracing::error!("Failed to get cart for checkout: {e}");
            Redirect::to("/cart").into_response()
        }
    }
}

/// Only same-site paths are followed (`/cart`, not `//evil.example`).
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//")
}
