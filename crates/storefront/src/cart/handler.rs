//! Cart query and mutation dispatcher.
//!
//! A `CartHandler` is built per request: the cart id getter reads the
//! request (usually its cookie) and the setter produces the response headers
//! that persist a new id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::http::HeaderMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use headwater_core::{CartId, CartLineId, CacheStrategy};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::action::{CartActionInput, CartActionKind};
use super::queries;
use crate::shopify::{
    AttributeInput, Cart, CartBuyerIdentityInput, CartInput, CartLineInput,
    CartLineUpdateInput, CartOptionalInput, CartQueryData, CartSelectableAddressInput,
    CartSelectableAddressUpdateInput, CartSelectedDeliveryOptionInput, CartUserError,
    MetafieldInput, ShopifyError, StorefrontApi, StorefrontRequest,
};

/// Reads the current cart id.
pub type CartIdGetter = Arc<dyn Fn() -> Option<CartId> + Send + Sync>;

/// Builds the response headers that persist a cart id.
pub type CartIdSetter = Arc<dyn Fn(&CartId) -> HeaderMap + Send + Sync>;

/// A method that can replace a built-in action or add a `Custom*` one.
///
/// It receives a clone of the handler, so it can call the built-in
/// operations it wraps.
pub type CartMethod = Arc<
    dyn Fn(
            CartHandler,
            CartActionInput,
            CartOptionalInput,
        ) -> BoxFuture<'static, Result<CartQueryData, ShopifyError>>
        + Send
        + Sync,
>;

/// Wrap an async function as a [`CartMethod`].
pub fn cart_method<F, Fut>(method: F) -> CartMethod
where
    F: Fn(CartHandler, CartActionInput, CartOptionalInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CartQueryData, ShopifyError>> + Send + 'static,
{
    Arc::new(
        move |handler: CartHandler, action: CartActionInput, optional: CartOptionalInput| {
            method(handler, action, optional).boxed()
        },
    )
}

/// Options for [`CartHandler::new`].
pub struct CartHandlerOptions {
    pub storefront: Arc<dyn StorefrontApi>,
    pub get_cart_id: CartIdGetter,
    pub set_cart_id: CartIdSetter,
    /// Replaces the `CartApiQuery` fragment of [`CartHandler::get`].
    pub cart_query_fragment: Option<String>,
    /// Replaces the `CartApiMutation` fragment of every mutation.
    pub cart_mutate_fragment: Option<String>,
}

/// Result of [`CartHandler::perform`].
#[derive(Debug, Clone, Serialize)]
pub struct CartActionResult {
    #[serde(flatten)]
    pub data: CartQueryData,
    /// Headers to add to the response (`Set-Cookie` for a new cart).
    #[serde(skip)]
    pub headers: HeaderMap,
}

/// Dispatches cart actions to the Storefront API.
#[derive(Clone)]
pub struct CartHandler {
    storefront: Arc<dyn StorefrontApi>,
    get_cart_id: CartIdGetter,
    set_cart_id: CartIdSetter,
    query_fragment: Arc<str>,
    mutate_fragment: Arc<str>,
    /// Id of a cart created by this handler, preferred over the getter.
    created_cart_id: Arc<Mutex<Option<CartId>>>,
    overrides: Arc<HashMap<CartActionKind, CartMethod>>,
    extra_methods: Arc<HashMap<String, CartMethod>>,
}

impl CartHandler {
    #[must_use]
    pub fn new(options: CartHandlerOptions) -> Self {
        Self {
            storefront: options.storefront,
            get_cart_id: options.get_cart_id,
            set_cart_id: options.set_cart_id,
            query_fragment: options
                .cart_query_fragment
                .map_or_else(|| Arc::from(queries::DEFAULT_CART_QUERY_FRAGMENT), Arc::from),
            mutate_fragment: options
                .cart_mutate_fragment
                .map_or_else(|| Arc::from(queries::DEFAULT_CART_MUTATE_FRAGMENT), Arc::from),
            created_cart_id: Arc::new(Mutex::new(None)),
            overrides: Arc::new(HashMap::new()),
            extra_methods: Arc::new(HashMap::new()),
        }
    }

    /// Replace the built-in method for `kind` in [`Self::perform`].
    #[must_use]
    pub fn with_custom_method(mut self, kind: CartActionKind, method: CartMethod) -> Self {
        Arc::make_mut(&mut self.overrides).insert(kind, method);
        self
    }

    /// Serve the `Custom*` action `name` in [`Self::perform`].
    #[must_use]
    pub fn with_extra_method(mut self, name: impl Into<String>, method: CartMethod) -> Self {
        Arc::make_mut(&mut self.extra_methods).insert(name.into(), method);
        self
    }

    // =========================================================================
    // Cart id
    // =========================================================================

    /// The cart created by this handler, or the one from the getter.
    #[must_use]
    pub fn get_cart_id(&self) -> Option<CartId> {
        self.created_cart_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .or_else(|| (self.get_cart_id)())
    }

    /// Headers persisting `cart_id`.
    #[must_use]
    pub fn set_cart_id(&self, cart_id: &CartId) -> HeaderMap {
        (self.set_cart_id)(cart_id)
    }

    fn resolve_cart_id(&self, optional: &CartOptionalInput) -> Option<CartId> {
        optional.cart_id.clone().or_else(|| self.get_cart_id())
    }

    fn remember(&self, cart_id: &CartId) {
        *self
            .created_cart_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cart_id.clone());
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Run an action and collect the headers persisting the resulting cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails or the action is a
    /// `Custom*` action with no registered method. User errors are data.
    #[instrument(skip(self, action, optional), fields(action = %action.kind()))]
    pub async fn perform(
        &self,
        action: CartActionInput,
        optional: CartOptionalInput,
    ) -> Result<CartActionResult, ShopifyError> {
        let data = self.dispatch(action, optional).await?;

        let headers = data
            .cart_id()
            .map_or_else(HeaderMap::new, |cart_id| self.set_cart_id(cart_id));

        Ok(CartActionResult { data, headers })
    }

    async fn dispatch(
        &self,
        action: CartActionInput,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let kind = action.kind();
        if let Some(method) = (kind != CartActionKind::Custom)
            .then(|| self.overrides.get(&kind).cloned())
            .flatten()
        {
            debug!(action = %action.kind(), "Using custom cart method");
            return method(self.clone(), action, optional).await;
        }

        match action {
            CartActionInput::AttributesUpdate { attributes } => {
                self.update_attributes(attributes, optional).await
            }
            CartActionInput::BuyerIdentityUpdate { buyer_identity } => {
                self.update_buyer_identity(buyer_identity, optional).await
            }
            CartActionInput::Create { input } => self.create(input, optional).await,
            CartActionInput::DiscountCodesUpdate { discount_codes } => {
                self.update_discount_codes(discount_codes, optional).await
            }
            CartActionInput::GiftCardCodesUpdate { gift_card_codes } => {
                self.update_gift_card_codes(gift_card_codes, optional).await
            }
            CartActionInput::LinesAdd { lines } => self.add_lines(lines, optional).await,
            CartActionInput::LinesUpdate { lines } => self.update_lines(lines, optional).await,
            CartActionInput::LinesRemove { line_ids } => {
                self.remove_lines(line_ids, optional).await
            }
            CartActionInput::NoteUpdate { note } => self.update_note(note, optional).await,
            CartActionInput::SelectedDeliveryOptionsUpdate {
                selected_delivery_options,
            } => {
                self.update_selected_delivery_option(selected_delivery_options, optional)
                    .await
            }
            CartActionInput::MetafieldsSet { metafields } => {
                self.set_metafields(metafields, optional).await
            }
            CartActionInput::MetafieldDelete { key } => self.delete_metafield(key, optional).await,
            CartActionInput::DeliveryAddressesAdd { addresses } => {
                self.add_delivery_addresses(addresses, optional).await
            }
            CartActionInput::DeliveryAddressesUpdate { addresses } => {
                self.update_delivery_addresses(addresses, optional).await
            }
            CartActionInput::DeliveryAddressesRemove { address_ids } => {
                self.remove_delivery_addresses(address_ids, optional).await
            }
            CartActionInput::Custom { action: name, inputs } => {
                let method = self.extra_methods.get(&name).cloned().ok_or_else(|| {
                    ShopifyError::InvalidOperation(
                        "cart.perform",
                        format!("unknown cart action {name}"),
                    )
                })?;
                method(
                    self.clone(),
                    CartActionInput::Custom {
                        action: name,
                        inputs,
                    },
                    optional,
                )
                .await
            }
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Fetch the current cart. No API call when no cart id is known.
    ///
    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip(self, optional))]
    pub async fn get(&self, optional: CartOptionalInput) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            return Ok(CartQueryData::default());
        };

        let request = with_context(
            StorefrontRequest::new(queries::cart_get(&self.query_fragment))
                .variable("cartId", cart_id.as_str())
                .cache(CacheStrategy::none())
                .display_name("cart"),
            &optional,
        );
        let response = self.storefront.query(request).await?;

        let cart = match response.data.get("cart") {
            Some(cart) if !cart.is_null() => Some(serde_json::from_value::<Cart>(cart.clone())?),
            _ => None,
        };

        Ok(CartQueryData {
            cart,
            errors: response.errors,
            ..CartQueryData::default()
        })
    }

    /// Create a cart and remember its id for the rest of this handler.
    ///
    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn create(
        &self,
        input: CartInput,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let data = self
            .mutate(
                queries::cart_create(&self.mutate_fragment),
                "cartCreate",
                json!({ "input": input }),
                &optional,
            )
            .await?;

        if let Some(cart_id) = data.cart_id() {
            debug!(cart_id = %cart_id, "Created cart");
            self.remember(cart_id);
        }
        Ok(data)
    }

    /// Add lines, creating the cart when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn add_lines(
        &self,
        lines: Vec<CartLineInput>,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            let input = CartInput {
                lines: Some(lines),
                ..CartInput::default()
            };
            return self.create(input, optional).await;
        };

        self.mutate(
            queries::cart_lines_add(&self.mutate_fragment),
            "cartLinesAdd",
            json!({ "cartId": cart_id, "lines": lines }),
            &optional,
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn update_lines(
        &self,
        lines: Vec<CartLineUpdateInput>,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            return Ok(missing_cart());
        };

        self.mutate(
            queries::cart_lines_update(&self.mutate_fragment),
            "cartLinesUpdate",
            json!({ "cartId": cart_id, "lines": lines }),
            &optional,
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn remove_lines(
        &self,
        line_ids: Vec<CartLineId>,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            return Ok(missing_cart());
        };

        self.mutate(
            queries::cart_lines_remove(&self.mutate_fragment),
            "cartLinesRemove",
            json!({ "cartId": cart_id, "lineIds": line_ids }),
            &optional,
        )
        .await
    }

    /// Replace the discount codes, creating the cart when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn update_discount_codes(
        &self,
        discount_codes: Vec<String>,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            let input = CartInput {
                discount_codes: Some(discount_codes),
                ..CartInput::default()
            };
            return self.create(input, optional).await;
        };

        self.mutate(
            queries::cart_discount_codes_update(&self.mutate_fragment),
            "cartDiscountCodesUpdate",
            json!({ "cartId": cart_id, "discountCodes": discount_codes }),
            &optional,
        )
        .await
    }

    /// Replace the gift card codes, creating the cart when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn update_gift_card_codes(
        &self,
        gift_card_codes: Vec<String>,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            let input = CartInput {
                gift_card_codes: Some(gift_card_codes),
                ..CartInput::default()
            };
            return self.create(input, optional).await;
        };

        self.mutate(
            queries::cart_gift_card_codes_update(&self.mutate_fragment),
            "cartGiftCardCodesUpdate",
            json!({ "cartId": cart_id, "giftCardCodes": gift_card_codes }),
            &optional,
        )
        .await
    }

    /// Set the buyer identity, creating the cart when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn update_buyer_identity(
        &self,
        buyer_identity: CartBuyerIdentityInput,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            let input = CartInput {
                buyer_identity: Some(buyer_identity),
                ..CartInput::default()
            };
            return self.create(input, optional).await;
        };

        self.mutate(
            queries::cart_buyer_identity_update(&self.mutate_fragment),
            "cartBuyerIdentityUpdate",
            json!({ "cartId": cart_id, "buyerIdentity": buyer_identity }),
            &optional,
        )
        .await
    }

    /// Set the note, creating the cart when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn update_note(
        &self,
        note: String,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            let input = CartInput {
                note: Some(note),
                ..CartInput::default()
            };
            return self.create(input, optional).await;
        };

        self.mutate(
            queries::cart_note_update(&self.mutate_fragment),
            "cartNoteUpdate",
            json!({ "cartId": cart_id, "note": note }),
            &optional,
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn update_selected_delivery_option(
        &self,
        selected_delivery_options: Vec<CartSelectedDeliveryOptionInput>,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            return Ok(missing_cart());
        };

        self.mutate(
            queries::cart_selected_delivery_options_update(&self.mutate_fragment),
            "cartSelectedDeliveryOptionsUpdate",
            json!({ "cartId": cart_id, "selectedDeliveryOptions": selected_delivery_options }),
            &optional,
        )
        .await
    }

    /// Replace the attributes, creating the cart when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn update_attributes(
        &self,
        attributes: Vec<AttributeInput>,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            let input = CartInput {
                attributes: Some(attributes),
                ..CartInput::default()
            };
            return self.create(input, optional).await;
        };

        self.mutate(
            queries::cart_attributes_update(&self.mutate_fragment),
            "cartAttributesUpdate",
            json!({ "cartId": cart_id, "attributes": attributes }),
            &optional,
        )
        .await
    }

    /// Set cart metafields, creating the cart when there is none.
    ///
    /// The mutation returns no cart, so the result carries only its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn set_metafields(
        &self,
        metafields: Vec<MetafieldInput>,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            let input = CartInput {
                metafields: Some(metafields),
                ..CartInput::default()
            };
            return self.create(input, optional).await;
        };

        let metafields: Vec<Value> = metafields
            .iter()
            .map(|metafield| {
                json!({
                    "ownerId": cart_id,
                    "key": metafield.key,
                    "value": metafield.value,
                    "type": metafield.metafield_type,
                })
            })
            .collect();

        let mut data = self
            .mutate(
                queries::cart_metafields_set(),
                "cartMetafieldsSet",
                json!({ "metafields": metafields }),
                &optional,
            )
            .await?;
        data.cart = Some(Cart::from_id(cart_id));
        Ok(data)
    }

    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn delete_metafield(
        &self,
        key: String,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            return Ok(missing_cart());
        };

        let mut data = self
            .mutate(
                queries::cart_metafield_delete(),
                "cartMetafieldDelete",
                json!({ "input": { "ownerId": cart_id, "key": key } }),
                &optional,
            )
            .await?;
        data.cart = Some(Cart::from_id(cart_id));
        Ok(data)
    }

    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn add_delivery_addresses(
        &self,
        addresses: Vec<CartSelectableAddressInput>,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            return Ok(missing_cart());
        };

        self.mutate(
            queries::cart_delivery_addresses_add(&self.mutate_fragment),
            "cartDeliveryAddressesAdd",
            json!({ "cartId": cart_id, "addresses": addresses }),
            &optional,
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn update_delivery_addresses(
        &self,
        addresses: Vec<CartSelectableAddressUpdateInput>,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            return Ok(missing_cart());
        };

        self.mutate(
            queries::cart_delivery_addresses_update(&self.mutate_fragment),
            "cartDeliveryAddressesUpdate",
            json!({ "cartId": cart_id, "addresses": addresses }),
            &optional,
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the Storefront API call fails.
    #[instrument(skip_all)]
    pub async fn remove_delivery_addresses(
        &self,
        address_ids: Vec<String>,
        optional: CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let Some(cart_id) = self.resolve_cart_id(&optional) else {
            return Ok(missing_cart());
        };

        self.mutate(
            queries::cart_delivery_addresses_remove(&self.mutate_fragment),
            "cartDeliveryAddressesRemove",
            json!({ "cartId": cart_id, "addressIds": address_ids }),
            &optional,
        )
        .await
    }

    /// Run a mutation and read its `field` payload.
    async fn mutate(
        &self,
        document: String,
        field: &str,
        variables: Value,
        optional: &CartOptionalInput,
    ) -> Result<CartQueryData, ShopifyError> {
        let request = with_context(
            StorefrontRequest::new(document)
                .variables(variables)
                .display_name(field),
            optional,
        );
        let response = self.storefront.mutate(request).await?;

        let mut data = match response.data.get(field) {
            Some(payload) if !payload.is_null() => {
                serde_json::from_value::<CartQueryData>(payload.clone())?
            }
            _ => CartQueryData::default(),
        };
        data.errors = response.errors;

        if !data.user_errors.is_empty() {
            debug!(field, user_errors = ?data.user_errors, "Cart mutation returned user errors");
        }
        Ok(data)
    }
}

impl std::fmt::Debug for CartHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartHandler")
            .field("cart_id", &self.get_cart_id())
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .field("extra_methods", &self.extra_methods.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn missing_cart() -> CartQueryData {
    CartQueryData::user_error(CartUserError::missing_cart_id())
}

/// Apply the `@inContext` overrides of `optional`.
fn with_context(mut request: StorefrontRequest, optional: &CartOptionalInput) -> StorefrontRequest {
    let mut overrides = Map::new();
    if let Some(country) = &optional.country {
        overrides.insert("country".to_string(), json!(country));
    }
    if let Some(language) = &optional.language {
        overrides.insert("language".to_string(), json!(language));
    }
    request.variables.extend(overrides);
    request
}
