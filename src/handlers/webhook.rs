//! Webhook ingestion: the provider's push path into the confirmation core.
//!
//! Two entry points share one core so the authentication boundary is
//! explicit: `POST /webhook` is the public, token-authenticated callback the
//! provider retries at-least-once; `POST /internal/webhook` is for trusted
//! internal callers replaying or injecting confirmations.
//!
//! Business outcomes are always HTTP 200 with a `reason` field. Anything
//! other than 200 would make the provider retry indefinitely; only a
//! structurally malformed request earns a 4xx.

use axum::extract::State;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::confirm::{confirm_payment, CallerAuth, ConfirmOutcome, ConfirmReason};
use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::util::internal_caller_authorized;

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    pub session_id: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Provider callback body. `invoice_id` is normalized from the top level
/// only; the nested payload is opaque and untrusted.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    pub invoice_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConfirmReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_amount: Option<i64>,
}

impl WebhookResponse {
    fn from_outcome(outcome: ConfirmOutcome) -> Self {
        Self {
            ok: true,
            processed: outcome.processed,
            reason: outcome.reason,
            order_ids: if outcome.order_ids.is_empty() {
                None
            } else {
                Some(outcome.order_ids)
            },
            paid_amount: outcome.paid_amount,
            expected_amount: outcome.expected_amount,
        }
    }

    fn error() -> Self {
        Self {
            ok: false,
            processed: false,
            reason: Some(ConfirmReason::Error),
            order_ids: None,
            paid_amount: None,
            expected_amount: None,
        }
    }
}

/// Public provider callback, authenticated by the per-session token.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    Json(body): Json<WebhookBody>,
) -> Result<Json<WebhookResponse>> {
    if body.invoice_id.is_empty() {
        return Err(AppError::BadRequest("invoice_id is required".into()));
    }
    let token = query.token.clone().unwrap_or_default();
    let auth = CallerAuth::CallbackToken(&token);
    Ok(Json(ingest(&state, auth, &query.session_id, &body).await))
}

/// Trusted internal entry point sharing the same confirmation core. A bad
/// internal key is an auth failure (401), not a business outcome: the
/// provider never calls this route, so there is no retry storm to appease.
pub async fn handle_internal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WebhookQuery>,
    Json(body): Json<WebhookBody>,
) -> Result<Json<WebhookResponse>> {
    if !internal_caller_authorized(&headers, &state.config.internal_api_key) {
        return Err(AppError::Unauthorized);
    }
    if body.invoice_id.is_empty() {
        return Err(AppError::BadRequest("invoice_id is required".into()));
    }
    Ok(Json(ingest(&state, CallerAuth::Internal, &query.session_id, &body).await))
}

async fn ingest(
    state: &AppState,
    auth: CallerAuth<'_>,
    session_id: &str,
    body: &WebhookBody,
) -> WebhookResponse {
    let response = match confirm_payment(state, auth, session_id, &body.invoice_id).await {
        Ok(outcome) => WebhookResponse::from_outcome(outcome),
        Err(e) => {
            // Unexpected failures still answer 200/ok:false; context is
            // logged, credentials never are.
            tracing::error!(
                session_id,
                invoice_id = %body.invoice_id,
                "Webhook processing error: {}",
                e
            );
            WebhookResponse::error()
        }
    };

    audit(state, session_id, body, &response);
    response
}

/// Write-only audit trail of every ingest attempt. Failure to record is
/// logged and swallowed: the ledger, not this table, carries correctness.
fn audit(state: &AppState, session_id: &str, body: &WebhookBody, response: &WebhookResponse) {
    let outcome = response
        .reason
        .map(|r| r.as_str())
        .unwrap_or(if response.processed { "PROCESSED" } else { "OK" });
    let raw = serde_json::json!({
        "invoice_id": body.invoice_id,
        "status": body.status,
        "payload": body.payload,
    })
    .to_string();

    let result = state
        .db
        .get()
        .map_err(AppError::from)
        .and_then(|conn| {
            queries::insert_webhook_event(
                &conn,
                Some(session_id),
                Some(&body.invoice_id),
                &raw,
                outcome,
            )
        });
    if let Err(e) = result {
        tracing::warn!(session_id, "Failed to write webhook audit row: {}", e);
    }
}
