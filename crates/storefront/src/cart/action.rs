//! Cart actions as submitted by a cart form.
//!
//! A form posts a `cartFormInput` field holding `{"action": ..., "inputs": ...}`
//! as JSON. Any other form field is merged into `inputs`, overriding keys of
//! the same name.

use std::fmt;

use headwater_core::CartLineId;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::shopify::{
    AttributeInput, CartBuyerIdentityInput, CartInput, CartLineInput, CartLineUpdateInput,
    CartSelectableAddressInput, CartSelectableAddressUpdateInput,
    CartSelectedDeliveryOptionInput, MetafieldInput,
};

/// Name of the form field carrying the JSON action.
pub const CART_FORM_INPUT: &str = "cartFormInput";

/// Prefix of actions served by methods registered with
/// [`CartHandler::with_extra_method`](super::CartHandler::with_extra_method).
pub const CUSTOM_ACTION_PREFIX: &str = "Custom";

/// Errors reading a cart action from a request.
#[derive(Debug, Error)]
pub enum CartActionError {
    #[error("Missing {CART_FORM_INPUT} field")]
    MissingFormInput,

    #[error("Invalid cart action: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// A cart action with its typed inputs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", content = "inputs")]
pub enum CartActionInput {
    #[serde(rename = "AttributesUpdateInput")]
    AttributesUpdate {
        attributes: Vec<AttributeInput>,
    },
    #[serde(rename_all = "camelCase")]
    BuyerIdentityUpdate {
        buyer_identity: CartBuyerIdentityInput,
    },
    Create {
        input: CartInput,
    },
    #[serde(rename_all = "camelCase")]
    DiscountCodesUpdate {
        discount_codes: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    GiftCardCodesUpdate {
        gift_card_codes: Vec<String>,
    },
    LinesAdd {
        lines: Vec<CartLineInput>,
    },
    LinesUpdate {
        lines: Vec<CartLineUpdateInput>,
    },
    #[serde(rename_all = "camelCase")]
    LinesRemove {
        line_ids: Vec<CartLineId>,
    },
    NoteUpdate {
        note: String,
    },
    #[serde(rename_all = "camelCase")]
    SelectedDeliveryOptionsUpdate {
        selected_delivery_options: Vec<CartSelectedDeliveryOptionInput>,
    },
    MetafieldsSet {
        metafields: Vec<MetafieldInput>,
    },
    #[serde(rename = "MetafieldsDelete", alias = "MetafieldDelete")]
    MetafieldDelete {
        key: String,
    },
    DeliveryAddressesAdd {
        addresses: Vec<CartSelectableAddressInput>,
    },
    DeliveryAddressesUpdate {
        addresses: Vec<CartSelectableAddressUpdateInput>,
    },
    #[serde(rename_all = "camelCase")]
    DeliveryAddressesRemove {
        address_ids: Vec<String>,
    },
    /// `Custom*` action handled by an extra method. Never deserialized
    /// directly; see [`CartActionInput::from_value`].
    #[serde(skip)]
    Custom {
        action: String,
        inputs: Map<String, Value>,
    },
}

/// Discriminant of [`CartActionInput`], used to key method overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CartActionKind {
    AttributesUpdate,
    BuyerIdentityUpdate,
    Create,
    DiscountCodesUpdate,
    GiftCardCodesUpdate,
    LinesAdd,
    LinesUpdate,
    LinesRemove,
    NoteUpdate,
    SelectedDeliveryOptionsUpdate,
    MetafieldsSet,
    MetafieldDelete,
    DeliveryAddressesAdd,
    DeliveryAddressesUpdate,
    DeliveryAddressesRemove,
    Custom,
}

impl CartActionKind {
    /// Action name as it appears in `cartFormInput`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AttributesUpdate => "AttributesUpdateInput",
            Self::BuyerIdentityUpdate => "BuyerIdentityUpdate",
            Self::Create => "Create",
            Self::DiscountCodesUpdate => "DiscountCodesUpdate",
            Self::GiftCardCodesUpdate => "GiftCardCodesUpdate",
            Self::LinesAdd => "LinesAdd",
            Self::LinesUpdate => "LinesUpdate",
            Self::LinesRemove => "LinesRemove",
            Self::NoteUpdate => "NoteUpdate",
            Self::SelectedDeliveryOptionsUpdate => "SelectedDeliveryOptionsUpdate",
            Self::MetafieldsSet => "MetafieldsSet",
            Self::MetafieldDelete => "MetafieldsDelete",
            Self::DeliveryAddressesAdd => "DeliveryAddressesAdd",
            Self::DeliveryAddressesUpdate => "DeliveryAddressesUpdate",
            Self::DeliveryAddressesRemove => "DeliveryAddressesRemove",
            Self::Custom => "Custom",
        }
    }
}

impl fmt::Display for CartActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CartActionInput {
    #[must_use]
    pub const fn kind(&self) -> CartActionKind {
        match self {
            Self::AttributesUpdate { .. } => CartActionKind::AttributesUpdate,
            Self::BuyerIdentityUpdate { .. } => CartActionKind::BuyerIdentityUpdate,
            Self::Create { .. } => CartActionKind::Create,
            Self::DiscountCodesUpdate { .. } => CartActionKind::DiscountCodesUpdate,
            Self::GiftCardCodesUpdate { .. } => CartActionKind::GiftCardCodesUpdate,
            Self::LinesAdd { .. } => CartActionKind::LinesAdd,
            Self::LinesUpdate { .. } => CartActionKind::LinesUpdate,
            Self::LinesRemove { .. } => CartActionKind::LinesRemove,
            Self::NoteUpdate { .. } => CartActionKind::NoteUpdate,
            Self::SelectedDeliveryOptionsUpdate { .. } => {
                CartActionKind::SelectedDeliveryOptionsUpdate
            }
            Self::MetafieldsSet { .. } => CartActionKind::MetafieldsSet,
            Self::MetafieldDelete { .. } => CartActionKind::MetafieldDelete,
            Self::DeliveryAddressesAdd { .. } => CartActionKind::DeliveryAddressesAdd,
            Self::DeliveryAddressesUpdate { .. } => CartActionKind::DeliveryAddressesUpdate,
            Self::DeliveryAddressesRemove { .. } => CartActionKind::DeliveryAddressesRemove,
            Self::Custom { .. } => CartActionKind::Custom,
        }
    }

    /// Parse `{"action": ..., "inputs": {...}}`.
    ///
    /// Actions starting with `Custom` keep their inputs untyped.
    ///
    /// # Errors
    ///
    /// Returns an error if the action is unknown or its inputs do not match.
    pub fn from_value(value: Value) -> Result<Self, CartActionError> {
        if let Some(action) = value
            .get("action")
            .and_then(Value::as_str)
            .filter(|action| action.starts_with(CUSTOM_ACTION_PREFIX))
        {
            let inputs = match value.get("inputs") {
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            return Ok(Self::Custom {
                action: action.to_string(),
                inputs,
            });
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Read an action from decoded form fields.
    ///
    /// Repeated field names become arrays. Fields other than `cartFormInput`
    /// are merged over the JSON `inputs` and stay available on
    /// [`CartForm::inputs`] (for example a `redirectTo` field).
    ///
    /// # Errors
    ///
    /// Returns an error if `cartFormInput` is missing, is not valid JSON, or
    /// does not describe a known action.
    pub fn from_form<I, K, V>(pairs: I) -> Result<CartForm, CartActionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut fields: Map<String, Value> = Map::new();
        for (key, value) in pairs {
            let key = key.into();
            let value = Value::String(value.into());
            match fields.get_mut(&key) {
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    fields.insert(key, value);
                }
            }
        }

        let raw = fields
            .remove(CART_FORM_INPUT)
            .ok_or(CartActionError::MissingFormInput)?;
        let raw = match raw {
            Value::String(s) => s,
            // Repeated cartFormInput: the first one wins.
            Value::Array(values) => values
                .into_iter()
                .find_map(|v| v.as_str().map(str::to_string))
                .ok_or(CartActionError::MissingFormInput)?,
            _ => return Err(CartActionError::MissingFormInput),
        };

        let mut envelope: Value = serde_json::from_str(&raw)?;
        let mut inputs = match envelope.get_mut("inputs").map(Value::take) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        inputs.extend(fields);

        let action = Self::from_value(serde_json::json!({
            "action": envelope.get("action").cloned().unwrap_or(Value::Null),
            "inputs": inputs,
        }))?;

        Ok(CartForm { action, inputs })
    }
}

/// A cart action read from a form, with the raw merged inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct CartForm {
    pub action: CartActionInput,
    pub inputs: Map<String, Value>,
}

impl CartForm {
    /// A string field from the merged inputs.
    #[must_use]
    pub fn input_str(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).and_then(Value::as_str)
    }
}
