//! Order creation seam.
//!
//! Order materialization belongs to the order-management side of the
//! service; the confirmation engine only guarantees it happens exactly once
//! per invoice. The trait keeps that boundary explicit and testable.

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::id::EntityType;
use crate::models::PaymentSession;
use crate::payload::OrderPayload;

#[async_trait]
pub trait OrderService: Send + Sync {
    /// Create the order(s) described by the session payload, returning their
    /// IDs. Called at most once per invoice; the idempotency ledger claim is
    /// the caller's responsibility.
    async fn create_orders(
        &self,
        session: &PaymentSession,
        payload: &OrderPayload,
    ) -> Result<Vec<String>>;
}

/// Splits a multi-seller cart into one order per seller, the grouping the
/// order-management service works in.
pub struct SellerSplitOrders;

#[async_trait]
impl OrderService for SellerSplitOrders {
    async fn create_orders(
        &self,
        session: &PaymentSession,
        payload: &OrderPayload,
    ) -> Result<Vec<String>> {
        let mut order_ids = Vec::with_capacity(payload.sellers.len());
        for seller_id in &payload.sellers {
            let lines: Vec<_> = payload
                .cart
                .iter()
                .filter(|l| &l.seller_id == seller_id)
                .collect();
            if lines.is_empty() {
                return Err(AppError::Internal(format!(
                    "Seller {} has no cart lines in session {}",
                    seller_id, session.id
                )));
            }
            let order_id = EntityType::Order.gen_id();
            tracing::info!(
                session_id = %session.id,
                order_id = %order_id,
                seller_id = %seller_id,
                lines = lines.len(),
                "Created order"
            );
            order_ids.push(order_id);
        }
        Ok(order_ids)
    }
}
