//! POST /seed-session: create a payment session and its provider invoice.
//!
//! Called by the trusted storefront backend, which has already verified the
//! buyer; `user_id` therefore arrives in the body, never from an end-user
//! request. The durable session write completes before any response leaves,
//! so a lost provider call can always be retried against an existing session.

use axum::extract::State;
use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::NewSession;
use crate::payload::{CartLine, OrderPayload, PAYLOAD_VERSION};
use crate::provider::{CreateInvoiceRequest, CreatedInvoice, InvoiceOutcome};
use crate::util::{generate_callback_token, internal_caller_authorized};

#[derive(Debug, Deserialize)]
pub struct SeedSessionRequest {
    pub user_id: String,
    pub cart: Vec<CartLine>,
    pub sellers: Vec<String>,
    pub total_amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub shipping_address_id: Option<String>,
    #[serde(default)]
    pub coupon: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SeedSessionResponse {
    pub session_id: String,
    pub ttl_sec: i64,
    /// Present on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<CreatedInvoice>,
    /// Present when the provider rejected invoice creation; the session is
    /// persisted regardless so the invoice can be retried later.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn seed_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SeedSessionRequest>,
) -> Result<Json<SeedSessionResponse>> {
    if !internal_caller_authorized(&headers, &state.config.internal_api_key) {
        return Err(AppError::Unauthorized);
    }

    let payload = OrderPayload {
        schema_version: PAYLOAD_VERSION,
        cart: request.cart,
        sellers: request.sellers,
        total_amount: request.total_amount,
        shipping_address_id: request.shipping_address_id,
        coupon: request.coupon,
    };

    let ttl_sec = state.config.session_ttl_secs;
    let input = NewSession {
        provider: state.provider.provider_name().to_string(),
        user_id: request.user_id.clone(),
        amount: request.total_amount,
        currency: request.currency.unwrap_or_else(|| "MNT".to_string()),
        payload: payload.to_json()?,
        payload_version: PAYLOAD_VERSION,
        callback_token: generate_callback_token(),
        expires_at: Utc::now().timestamp() + ttl_sec,
    };

    // Durable write first; no session may exist only in cache.
    let sessions = state.sessions();
    let session = sessions.create(&input).await?;

    let token = state.token_cache.get_token().await?;
    let invoice_req = CreateInvoiceRequest {
        session_id: session.id.clone(),
        user_id: session.user_id.clone(),
        amount: session.amount,
        description: format!("Order payment {}", session.id),
        callback_token: session.callback_token.clone(),
    };

    match state.provider.create_invoice(&token, &invoice_req).await {
        Ok(InvoiceOutcome::Created(invoice)) => {
            sessions.attach_invoice(&session.id, &invoice.invoice_id).await?;
            tracing::info!(
                session_id = %session.id,
                invoice_id = %invoice.invoice_id,
                amount = session.amount,
                "Session seeded with invoice"
            );
            Ok(Json(SeedSessionResponse {
                session_id: session.id,
                ttl_sec,
                invoice: Some(invoice),
                error: None,
            }))
        }
        Ok(InvoiceOutcome::Rejected { status, message }) => {
            let error = format!("Provider rejected invoice ({}): {}", status, message);
            sessions.record_invoice_error(&session.id, &error).await?;
            Ok(Json(SeedSessionResponse {
                session_id: session.id,
                ttl_sec,
                invoice: None,
                error: Some(error),
            }))
        }
        Err(e) => {
            // Transport failure: keep the session, surface the error.
            let error = e.to_string();
            sessions.record_invoice_error(&session.id, &error).await?;
            Err(e)
        }
    }
}
