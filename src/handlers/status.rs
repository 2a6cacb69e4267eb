//! GET /status: read-only polling surface for client UX.
//!
//! Always reads the durable tier; a session must report correctly even after
//! its cache entry expired. At most one upstream provider verification runs
//! per session per configured window, enforced with a set-NX stamp. May
//! opportunistically advance pending -> paid, but never creates orders; that
//! belongs exclusively to the webhook/reconciliation path.

use std::time::Duration;

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{OptionExt, Result};
use crate::extractors::{Json, Query};
use crate::models::SessionStatus;
use crate::provider::paid_total;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: SessionStatus,
    pub invoice_id: Option<String>,
    pub order_ids: Vec<String>,
    pub paid_amount: Option<i64>,
    pub expected_amount: i64,
    pub last_check_at: Option<i64>,
}

fn stamp_key(session_id: &str) -> String {
    format!("statuscheck:{}", session_id)
}

pub async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>> {
    // Cheap format check before touching the database.
    if !crate::id::is_valid_prefixed_id(&query.session_id) {
        return Err(crate::error::AppError::NotFound("Session not found".into()));
    }

    let sessions = state.sessions();
    let session = sessions
        .get_durable(&query.session_id)?
        .or_not_found("Session not found")?;

    // One upstream verification per window, across all pollers of this
    // session. Losing the stamp race means someone else just checked.
    let should_verify = session.status == SessionStatus::Pending
        && session.invoice_id.is_some()
        && state
            .cache
            .set_nx(
                &stamp_key(&session.id),
                "1",
                Duration::from_secs(state.config.status_check_window_secs),
            )
            .await;

    let session = if should_verify {
        verify_pending(&state, &session.id).await?
    } else {
        session
    };

    let order_ids = match session.invoice_id.as_deref() {
        Some(invoice_id) => {
            let conn = state.db.get()?;
            queries::get_processed_invoice(&conn, invoice_id)?
                .map(|record| record.order_ids)
                .unwrap_or_default()
        }
        None => Vec::new(),
    };

    Ok(Json(StatusResponse {
        status: session.status,
        invoice_id: session.invoice_id,
        order_ids,
        paid_amount: session.paid_amount,
        expected_amount: session.amount,
        last_check_at: session.last_check_at,
    }))
}

/// Re-check a pending session against the provider and advance it to paid
/// when the verified amount matches. Provider trouble degrades to a plain
/// durable read; polling must not fail because the provider is down.
async fn verify_pending(
    state: &AppState,
    session_id: &str,
) -> Result<crate::models::PaymentSession> {
    let sessions = state.sessions();
    let session = sessions
        .get_durable(session_id)?
        .or_not_found("Session not found")?;
    let Some(invoice_id) = session.invoice_id.clone() else {
        return Ok(session);
    };

    let checked = async {
        let token = state.token_cache.get_token().await?;
        state.provider.check_payment(&token, &invoice_id).await
    }
    .await;

    match checked {
        Ok(rows) => {
            sessions.touch_last_check(session_id).await?;
            if let Some(paid) = paid_total(&rows) {
                if (paid - session.amount).abs() <= state.config.amount_tolerance {
                    sessions.mark_paid(session_id, paid).await?;
                }
            }
        }
        Err(e) => {
            tracing::warn!(session_id, invoice_id = %invoice_id, "Status verification skipped: {}", e);
        }
    }

    Ok(sessions
        .get_durable(session_id)?
        .or_not_found("Session not found")?)
}
