//! Versioned order-construction payload carried by a payment session.
//!
//! The storefront sends a loosely-structured cart blob; it is validated here,
//! at the session-store boundary, and stored with an explicit schema version
//! so old rows remain readable after the shape evolves.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Current payload schema version. Bump when the shape changes.
pub const PAYLOAD_VERSION: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub seller_id: String,
    pub quantity: i64,
    /// Unit price in minor units
    pub unit_price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPayload {
    pub schema_version: i64,
    pub cart: Vec<CartLine>,
    /// Seller IDs participating in this checkout; one order is created per seller
    pub sellers: Vec<String>,
    /// Total in minor units, as quoted to the buyer
    pub total_amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<String>,
}

impl OrderPayload {
    /// Validate invariants before the payload is persisted. Rejecting here
    /// keeps garbage out of the durable tier, where it would only surface
    /// much later during order creation.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != PAYLOAD_VERSION {
            return Err(AppError::BadRequest(format!(
                "Unsupported payload schema version {}",
                self.schema_version
            )));
        }
        if self.cart.is_empty() {
            return Err(AppError::BadRequest("Cart is empty".into()));
        }
        if self.sellers.is_empty() {
            return Err(AppError::BadRequest("No sellers in payload".into()));
        }
        if self.total_amount <= 0 {
            return Err(AppError::BadRequest("Total amount must be positive".into()));
        }
        for line in &self.cart {
            if line.quantity <= 0 {
                return Err(AppError::BadRequest(format!(
                    "Invalid quantity for product {}",
                    line.product_id
                )));
            }
            if line.unit_price < 0 {
                return Err(AppError::BadRequest(format!(
                    "Negative unit price for product {}",
                    line.product_id
                )));
            }
            if !self.sellers.iter().any(|s| s == &line.seller_id) {
                return Err(AppError::BadRequest(format!(
                    "Cart line references unknown seller {}",
                    line.seller_id
                )));
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let payload: OrderPayload = serde_json::from_str(json)?;
        Ok(payload)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
