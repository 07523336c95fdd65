//! Domain types for the cart part of the Storefront API.
//!
//! Output types are lenient: only `Cart.id` is required, so carts selected by
//! a custom fragment still deserialize. Fields a fragment selects that are not
//! modeled here are kept in [`Cart::extra`].
//!
//! Input types serialize to the exact shape of the Storefront mutation
//! variables (camelCase, unset fields omitted).

use headwater_core::{CartId, CartLineId, Money, ProductVariantId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::GraphQLError;

// =============================================================================
// Cart Types
// =============================================================================

/// Custom attribute (key-value pair).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: Option<String>,
}

/// Cost for a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineCost {
    /// Price per unit.
    pub amount_per_quantity: Option<Money>,
    /// Compare-at price per unit.
    pub compare_at_amount_per_quantity: Option<Money>,
    /// Total (after discounts).
    pub total_amount: Option<Money>,
}

/// Merchandise in a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMerchandise {
    pub id: ProductVariantId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub available_for_sale: Option<bool>,
    #[serde(default)]
    pub requires_shipping: Option<bool>,
}

/// A line item in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: CartLineId,
    pub quantity: i64,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub cost: Option<CartLineCost>,
    #[serde(default)]
    pub merchandise: Option<CartMerchandise>,
}

/// `lines(first: n) { nodes { ... } }` connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineConnection {
    #[serde(default)]
    pub nodes: Vec<CartLine>,
}

/// Cart cost summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCost {
    pub subtotal_amount: Option<Money>,
    pub total_amount: Option<Money>,
    #[serde(default)]
    pub total_tax_amount: Option<Money>,
    #[serde(default)]
    pub total_duty_amount: Option<Money>,
}

/// Discount code applied to cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartDiscountCode {
    pub code: String,
    /// Whether the code applies to any line in the cart.
    pub applicable: bool,
}

/// Gift card applied to cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedGiftCard {
    pub id: String,
    pub last_characters: String,
    #[serde(default)]
    pub amount_used: Option<Money>,
}

/// Buyer identity for the cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartBuyerIdentity {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country_code: Option<String>,
    /// Logged-in customer, as selected by the fragment.
    #[serde(default)]
    pub customer: Option<Value>,
}

/// A shopping cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: CartId,
    #[serde(default)]
    pub checkout_url: Option<String>,
    #[serde(default)]
    pub total_quantity: i64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub buyer_identity: Option<CartBuyerIdentity>,
    #[serde(default)]
    pub cost: Option<CartCost>,
    #[serde(default)]
    pub discount_codes: Vec<CartDiscountCode>,
    #[serde(default)]
    pub applied_gift_cards: Vec<AppliedGiftCard>,
    #[serde(default)]
    pub lines: CartLineConnection,
    /// Fields selected by a custom fragment that are not modeled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Cart {
    /// A cart known only by its id (what `cartMetafieldsSet` returns).
    #[must_use]
    pub fn from_id(id: CartId) -> Self {
        Self {
            id,
            checkout_url: None,
            total_quantity: 0,
            note: None,
            updated_at: None,
            attributes: Vec::new(),
            buyer_identity: None,
            cost: None,
            discount_codes: Vec::new(),
            applied_gift_cards: Vec::new(),
            lines: CartLineConnection::default(),
            extra: Map::new(),
        }
    }
}

/// User error from cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartUserError {
    /// Error code (`INVALID`, `INVALID_MERCHANDISE_LINE`, ...).
    pub code: Option<String>,
    /// Field path that caused the error.
    pub field: Option<Vec<String>>,
    /// Human-readable error message.
    pub message: String,
}

impl CartUserError {
    /// The error returned when an action needs a cart and none is known.
    #[must_use]
    pub fn missing_cart_id() -> Self {
        Self {
            code: Some("INVALID".to_string()),
            field: Some(vec!["cartId".to_string()]),
            message: "A cart id is required for this action".to_string(),
        }
    }
}

/// Non-blocking warning from cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartWarning {
    pub code: String,
    pub message: String,
    /// Id of the resource the warning is about.
    pub target: Option<String>,
}

/// Result of every cart operation.
///
/// `user_errors` and `warnings` come from the mutation payload; `errors` are
/// partial GraphQL errors returned alongside data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartQueryData {
    pub cart: Option<Cart>,
    #[serde(default)]
    pub user_errors: Vec<CartUserError>,
    #[serde(default)]
    pub warnings: Vec<CartWarning>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl CartQueryData {
    /// A result carrying a single user error and no cart.
    #[must_use]
    pub fn user_error(error: CartUserError) -> Self {
        Self {
            user_errors: vec![error],
            ..Self::default()
        }
    }

    /// Id of the returned cart, if any.
    #[must_use]
    pub fn cart_id(&self) -> Option<&CartId> {
        self.cart.as_ref().map(|cart| &cart.id)
    }
}

// =============================================================================
// Input Types
// =============================================================================

/// Input for custom attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInput {
    pub key: String,
    pub value: String,
}

/// Input for adding a line to cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineInput {
    /// Product variant ID.
    pub merchandise_id: ProductVariantId,
    /// Quantity to add. The API defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<AttributeInput>>,
    /// Selling plan ID (for subscriptions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selling_plan_id: Option<String>,
}

impl CartLineInput {
    /// `quantity` units of a variant.
    #[must_use]
    pub const fn new(merchandise_id: ProductVariantId, quantity: i64) -> Self {
        Self {
            merchandise_id,
            quantity: Some(quantity),
            attributes: None,
            selling_plan_id: None,
        }
    }
}

/// Input for updating a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineUpdateInput {
    pub id: CartLineId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchandise_id: Option<ProductVariantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<AttributeInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selling_plan_id: Option<String>,
}

/// Input for the buyer identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartBuyerIdentityInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_location_id: Option<String>,
}

/// Delivery option chosen for a delivery group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSelectedDeliveryOptionInput {
    pub delivery_group_id: String,
    pub delivery_option_handle: String,
}

/// Cart metafield to set. The owner is always the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetafieldInput {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub metafield_type: String,
}

/// Postal address for delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartDeliveryAddressInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Either a literal address or a reference to a saved customer address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartAddressInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<CartDeliveryAddressInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_from_customer_address_id: Option<String>,
}

/// Address to add to the cart's selectable delivery addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSelectableAddressInput {
    pub address: CartAddressInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_time_use: Option<bool>,
}

/// Update to an existing selectable delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSelectableAddressUpdateInput {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<CartAddressInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_time_use: Option<bool>,
}

/// Input for `cartCreate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<CartLineInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_codes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gift_card_codes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_identity: Option<CartBuyerIdentityInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<AttributeInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metafields: Option<Vec<MetafieldInput>>,
}

/// Per-call overrides accepted by every cart operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartOptionalInput {
    /// Cart to act on instead of the one from the cart id getter.
    #[serde(default)]
    pub cart_id: Option<CartId>,
    /// `@inContext` country; defaults to the configured locale.
    #[serde(default)]
    pub country: Option<String>,
    /// `@inContext` language; defaults to the configured locale.
    #[serde(default)]
    pub language: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cart_from_default_fragment() {
        let cart: Cart = serde_json::from_value(json!({
            "id": "gid://shopify/Cart/c1-abc",
            "checkoutUrl": "https://shop.example/cart/c/c1-abc",
            "totalQuantity": 2,
            "note": null,
            "cost": {
                "subtotalAmount": {"amount": "20.0", "currencyCode": "USD"},
                "totalAmount": {"amount": "21.5", "currencyCode": "USD"}
            },
            "lines": {"nodes": [{
                "id": "gid://shopify/CartLine/1",
                "quantity": 2,
                "merchandise": {"id": "gid://shopify/ProductVariant/9", "title": "Small"}
            }]},
            "discountCodes": [{"code": "SAVE10", "applicable": false}]
        }))
        .unwrap();

        assert_eq!(cart.id.token(), "c1-abc");
        assert_eq!(cart.total_quantity, 2);
        assert_eq!(cart.lines.nodes.len(), 1);
        assert_eq!(cart.lines.nodes[0].id.token(), "1");
        assert_eq!(
            cart.cost.unwrap().total_amount.unwrap().display(),
            "21.50 USD"
        );
        assert!(!cart.discount_codes[0].applicable);
        assert!(cart.extra.is_empty());
    }

    #[test]
    fn test_cart_keeps_custom_fragment_fields() {
        let cart: Cart = serde_json::from_value(json!({
            "id": "gid://shopify/Cart/c1-abc",
            "deliveryGroups": {"nodes": []}
        }))
        .unwrap();

        assert_eq!(cart.lines, CartLineConnection::default());
        assert_eq!(cart.extra["deliveryGroups"], json!({"nodes": []}));
    }

    #[test]
    fn test_cart_input_omits_unset_fields() {
        let input = CartInput {
            lines: Some(vec![CartLineInput::new(
                ProductVariantId::from_token("9").unwrap(),
                1,
            )]),
            note: Some("gift".to_string()),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({
                "lines": [{"merchandiseId": "gid://shopify/ProductVariant/9", "quantity": 1}],
                "note": "gift"
            })
        );
    }

    #[test]
    fn test_metafield_input_type_field() {
        let metafield: MetafieldInput = serde_json::from_value(json!({
            "key": "custom.gift",
            "value": "true",
            "type": "boolean"
        }))
        .unwrap();
        assert_eq!(metafield.metafield_type, "boolean");
        assert_eq!(serde_json::to_value(&metafield).unwrap()["type"], "boolean");
    }

    #[test]
    fn test_query_data_defaults() {
        let data: CartQueryData = serde_json::from_value(json!({
            "cart": {"id": "gid://shopify/Cart/c1"},
            "userErrors": [{"code": "INVALID", "field": ["lines"], "message": "bad"}]
        }))
        .unwrap();

        assert_eq!(data.cart_id().map(CartId::token), Some("c1"));
        assert_eq!(data.user_errors[0].field, Some(vec!["lines".to_string()]));
        assert!(data.warnings.is_empty());

        let missing = CartQueryData::user_error(CartUserError::missing_cart_id());
        assert!(missing.cart.is_none());
        assert_eq!(missing.user_errors[0].code.as_deref(), Some("INVALID"));
    }
}
