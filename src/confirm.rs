//! Payment confirmation core: the one path through which an invoice becomes
//! orders.
//!
//! Both webhook entry points, the reconciler, and (for verification only)
//! the status endpoint funnel into this module. Ordering rules that hold
//! regardless of caller:
//!
//! 1. The idempotency ledger is consulted before any session-based decision,
//!    so an expired or purged session can never masquerade as an unseen
//!    invoice after its orders already exist.
//! 2. The provider's payment-check API is the sole source of truth for paid
//!    status and amount; webhook bodies are never trusted.
//! 3. The ledger insert happens before order creation and is the actual
//!    mutual-exclusion gate: whoever inserts first wins, everyone else
//!    observes DUPLICATE.

use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::models::{PaymentSession, ProcessedInvoice, SessionStatus};
use crate::payload::OrderPayload;
use crate::provider::paid_total;
use crate::util::constant_time_eq;

/// Business outcome taxonomy. These are expected states of an asynchronous
/// payment lifecycle, not failures; they travel in 200 responses so the
/// provider does not retry forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfirmReason {
    #[serde(rename = "INVALID_TOKEN")]
    InvalidToken,
    #[serde(rename = "SESSION_MISSING")]
    SessionMissing,
    #[serde(rename = "INVOICE_MISMATCH")]
    InvoiceMismatch,
    #[serde(rename = "NOT_PAID")]
    NotPaid,
    #[serde(rename = "AMOUNT_MISMATCH")]
    AmountMismatch,
    #[serde(rename = "PAYMENT_CHECK_FAILED")]
    PaymentCheckFailed,
    /// Steady-state no-op: the invoice was already settled by another caller.
    #[serde(rename = "DUPLICATE")]
    Duplicate,
    #[serde(rename = "ERROR")]
    Error,
}

impl ConfirmReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidToken => "INVALID_TOKEN",
            Self::SessionMissing => "SESSION_MISSING",
            Self::InvoiceMismatch => "INVOICE_MISMATCH",
            Self::NotPaid => "NOT_PAID",
            Self::AmountMismatch => "AMOUNT_MISMATCH",
            Self::PaymentCheckFailed => "PAYMENT_CHECK_FAILED",
            Self::Duplicate => "DUPLICATE",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub processed: bool,
    pub reason: Option<ConfirmReason>,
    pub order_ids: Vec<String>,
    pub paid_amount: Option<i64>,
    pub expected_amount: Option<i64>,
}

impl ConfirmOutcome {
    fn rejected(reason: ConfirmReason) -> Self {
        Self {
            processed: false,
            reason: Some(reason),
            order_ids: Vec::new(),
            paid_amount: None,
            expected_amount: None,
        }
    }

    fn duplicate(record: &ProcessedInvoice) -> Self {
        Self {
            processed: false,
            reason: Some(ConfirmReason::Duplicate),
            order_ids: record.order_ids.clone(),
            paid_amount: Some(record.paid_amount),
            expected_amount: None,
        }
    }
}

/// How the caller authenticated. The two webhook entry points make this
/// explicit instead of branching on a header deep inside the handler.
#[derive(Debug, Clone, Copy)]
pub enum CallerAuth<'a> {
    /// Trusted internal caller (shared-secret header already verified).
    Internal,
    /// Public provider callback carrying the per-session token.
    CallbackToken(&'a str),
}

/// Full webhook confirmation: authenticate, dedup, resolve, verify, settle.
pub async fn confirm_payment(
    state: &AppState,
    auth: CallerAuth<'_>,
    session_id: &str,
    invoice_id: &str,
) -> Result<ConfirmOutcome> {
    let sessions = state.sessions();

    // Authenticate public callers against the token stored on the session.
    // A missing session is not decided here: the ledger check below must run
    // first so a purged session cannot hide an already-settled invoice.
    let preloaded = match auth {
        CallerAuth::Internal => None,
        CallerAuth::CallbackToken(token) => {
            let session = sessions.get(session_id).await?;
            if let Some(ref session) = session {
                if !constant_time_eq(&session.callback_token, token) {
                    return Ok(ConfirmOutcome::rejected(ConfirmReason::InvalidToken));
                }
            }
            session
        }
    };

    // Idempotency check first, unconditionally.
    {
        let conn = state.db.get()?;
        if let Some(record) = queries::get_processed_invoice(&conn, invoice_id)? {
            return Ok(ConfirmOutcome::duplicate(&record));
        }
    }

    let session = match preloaded {
        Some(session) => Some(session),
        None => sessions.get(session_id).await?,
    };
    let Some(session) = session else {
        return Ok(ConfirmOutcome::rejected(ConfirmReason::SessionMissing));
    };

    if session.invoice_id.as_deref() != Some(invoice_id) {
        tracing::warn!(
            session_id,
            webhook_invoice = invoice_id,
            session_invoice = ?session.invoice_id,
            "Webhook invoice does not match session invoice"
        );
        return Ok(ConfirmOutcome::rejected(ConfirmReason::InvoiceMismatch));
    }

    verify_and_settle(state, &session).await
}

/// Steps shared by webhooks and the reconciler: provider check as the sole
/// source of truth, amount tolerance, exclusive ledger claim, order creation.
/// Requires a session with its invoice attached.
pub async fn verify_and_settle(
    state: &AppState,
    session: &PaymentSession,
) -> Result<ConfirmOutcome> {
    let sessions = state.sessions();
    let invoice_id = match session.invoice_id.as_deref() {
        Some(id) => id,
        None => return Ok(ConfirmOutcome::rejected(ConfirmReason::NotPaid)),
    };
    let expected = session.amount;

    let rows = {
        let token = match state.token_cache.get_token().await {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(session_id = %session.id, invoice_id, "Token acquisition failed: {}", e);
                return Ok(with_expected(
                    ConfirmOutcome::rejected(ConfirmReason::PaymentCheckFailed),
                    expected,
                ));
            }
        };
        match state.provider.check_payment(&token, invoice_id).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(session_id = %session.id, invoice_id, "Payment check failed: {}", e);
                sessions.touch_last_check(&session.id).await?;
                return Ok(with_expected(
                    ConfirmOutcome::rejected(ConfirmReason::PaymentCheckFailed),
                    expected,
                ));
            }
        }
    };

    sessions.touch_last_check(&session.id).await?;

    let Some(paid) = paid_total(&rows) else {
        return Ok(with_expected(
            ConfirmOutcome::rejected(ConfirmReason::NotPaid),
            expected,
        ));
    };

    if (paid - expected).abs() > state.config.amount_tolerance {
        tracing::warn!(
            session_id = %session.id,
            invoice_id,
            paid,
            expected,
            "Paid amount outside tolerance"
        );
        return Ok(ConfirmOutcome {
            processed: false,
            reason: Some(ConfirmReason::AmountMismatch),
            order_ids: Vec::new(),
            paid_amount: Some(paid),
            expected_amount: Some(expected),
        });
    }

    // Parse the payload before claiming: a claim must never be held by a
    // caller that cannot go on to create orders.
    let payload = OrderPayload::from_json(&session.payload)?;

    // Verified payment: record it before attempting the exclusive claim.
    if session.status == SessionStatus::Pending {
        sessions.mark_paid(&session.id, paid).await?;
    }

    // The ledger insert is the gate. Losing the race is the expected
    // steady-state for retried webhooks and concurrent reconciliation.
    let claimed = {
        let conn = state.db.get()?;
        queries::try_claim_invoice(&conn, invoice_id, &session.id, paid)?
    };
    if !claimed {
        let conn = state.db.get()?;
        let record = queries::get_processed_invoice(&conn, invoice_id)?;
        return Ok(match record {
            Some(record) => ConfirmOutcome::duplicate(&record),
            // Claim lost and row gone again: the winner failed and released.
            // Report a transient error so the provider retries.
            None => ConfirmOutcome::rejected(ConfirmReason::Error),
        });
    }

    let order_ids = match state.orders.create_orders(session, &payload).await {
        Ok(ids) => ids,
        Err(e) => {
            // Release the claim so a retry can settle this invoice; the
            // at-most-one-ledger-row invariant holds at every instant.
            tracing::error!(session_id = %session.id, invoice_id, "Order creation failed: {}", e);
            let conn = state.db.get()?;
            queries::release_invoice_claim(&conn, invoice_id)?;
            return Err(e);
        }
    };

    {
        let conn = state.db.get()?;
        queries::set_invoice_orders(&conn, invoice_id, &order_ids)?;
    }
    sessions.mark_processed(&session.id).await?;

    tracing::info!(
        session_id = %session.id,
        invoice_id,
        paid,
        orders = order_ids.len(),
        "Payment confirmed, orders created"
    );

    Ok(ConfirmOutcome {
        processed: true,
        reason: None,
        order_ids,
        paid_amount: Some(paid),
        expected_amount: Some(expected),
    })
}

fn with_expected(mut outcome: ConfirmOutcome, expected: i64) -> ConfirmOutcome {
    outcome.expected_amount = Some(expected);
    outcome
}
