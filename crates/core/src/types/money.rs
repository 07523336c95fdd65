//! Monetary amounts as returned by the Storefront API.
//!
//! Shopify sends amounts as decimal strings (`"19.99"`), which deserialize
//! into `Decimal` without going through floating point.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Monetary amount with currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    /// Decimal amount.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: String,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub fn new(amount: Decimal, currency_code: impl Into<String>) -> Self {
        Self {
            amount,
            currency_code: currency_code.into(),
        }
    }

    /// Format for display with two decimal places (e.g., "19.99 USD").
    #[must_use]
    pub fn display(&self) -> String {
        format!("{:.2} {}", self.amount.round_dp(2), self.currency_code)
    }
}
