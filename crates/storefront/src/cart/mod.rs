//! Cart query and mutation abstraction.
//!
//! [`CartHandler`] turns cart actions into Storefront API calls:
//!
//! - actions that only make sense on an existing cart fail with a user error
//!   when there is none
//! - adding lines, codes, notes, attributes, buyer identity, or metafields to
//!   a missing cart creates it instead
//! - a created cart id is remembered and persisted through the id setter
//!   (by default a `cart` cookie)
//!
//! # Example
//!
//! ```rust,ignore
//! let cart = CartHandler::new(CartHandlerOptions {
//!     storefront: Arc::new(state.storefront().clone()),
//!     get_cart_id: cart_get_id_default(&headers),
//!     set_cart_id: cart_set_id_default(CookieOptions::default()),
//!     cart_query_fragment: None,
//!     cart_mutate_fragment: None,
//! });
//!
//! let result = cart.perform(form.action, CartOptionalInput::default()).await?;
//! ```

mod action;
mod cookie;
mod handler;
pub mod queries;

pub use action::{
    CART_FORM_INPUT, CUSTOM_ACTION_PREFIX, CartActionError, CartActionInput, CartActionKind,
    CartForm,
};
pub use cookie::{
    CART_COOKIE, CookieOptions, cart_cookie_value, cart_get_id_default, cart_set_id_default,
    read_cart_cookie,
};
pub use handler::{
    CartActionResult, CartHandler, CartHandlerOptions, CartIdGetter, CartIdSetter, CartMethod,
    cart_method,
};
