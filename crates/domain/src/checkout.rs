//! Checkout boundary input types.

use common::PaymentId;
use serde::{Deserialize, Serialize};
use store::ContentType;

/// Customer contact captured at checkout, kept in transaction metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Customer {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
        }
    }
}

/// One content item the customer selected at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSelection {
    pub url: String,

    /// Shortcode when the storefront already scraped it; derived from the URL
    /// otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,

    /// Explicit share of the total quantity. Honored only when every selected
    /// item carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

impl ContentSelection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_code: None,
            content_type: None,
            quantity: None,
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_code(mut self, content_code: impl Into<String>) -> Self {
        self.content_code = Some(content_code.into());
        self
    }
}

/// Everything the checkout boundary hands over for one purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer: Customer,
    pub service_id: String,
    pub payment_id: PaymentId,
    pub target_username: String,

    /// Total price in minor currency units.
    pub amount_cents: i64,

    /// Total units purchased across all selected items.
    pub quantity: u32,

    #[serde(default)]
    pub content_items: Vec<ContentSelection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
}
