use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::id::EntityType;
use crate::models::{NewSession, PaymentSession, ProcessedInvoice, ReceiptStatus, SessionStatus};

use super::from_row::{query_all, query_one, LEDGER_COLS, SESSION_COLS};

fn now() -> i64 {
    Utc::now().timestamp()
}

const SECONDS_PER_DAY: i64 = 86400;

// ============ Payment Sessions ============

pub fn create_session(conn: &Connection, input: &NewSession) -> Result<PaymentSession> {
    let id = EntityType::Session.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO payment_sessions
            (id, provider, user_id, amount, currency, payload, payload_version,
             callback_token, status, expires_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?10, ?10)",
        params![
            &id,
            &input.provider,
            &input.user_id,
            input.amount,
            &input.currency,
            &input.payload,
            input.payload_version,
            &input.callback_token,
            input.expires_at,
            now,
        ],
    )?;

    Ok(PaymentSession {
        id,
        provider: input.provider.clone(),
        invoice_id: None,
        user_id: input.user_id.clone(),
        amount: input.amount,
        currency: input.currency.clone(),
        payload: input.payload.clone(),
        payload_version: input.payload_version,
        callback_token: input.callback_token.clone(),
        status: SessionStatus::Pending,
        invoice_error: None,
        paid_amount: None,
        last_check_at: None,
        expires_at: input.expires_at,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_session(conn: &Connection, id: &str) -> Result<Option<PaymentSession>> {
    query_one(
        conn,
        &format!("SELECT {} FROM payment_sessions WHERE id = ?1", SESSION_COLS),
        &[&id],
    )
}

/// Attach the provider-assigned invoice ID. Write-once: a session that
/// already carries an invoice is never re-pointed at another one.
pub fn attach_invoice(conn: &Connection, id: &str, invoice_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_sessions
         SET invoice_id = ?1, invoice_error = NULL, updated_at = ?2
         WHERE id = ?3 AND invoice_id IS NULL",
        params![invoice_id, now(), id],
    )?;
    Ok(affected > 0)
}

/// Record a provider-side invoice creation failure so the session survives
/// for a later retry instead of being lost.
pub fn record_invoice_error(conn: &Connection, id: &str, error: &str) -> Result<()> {
    conn.execute(
        "UPDATE payment_sessions SET invoice_error = ?1, updated_at = ?2 WHERE id = ?3",
        params![error, now(), id],
    )?;
    Ok(())
}

/// Advance pending -> paid with the verified amount. Compare-and-swap on
/// status keeps the transition forward-only under concurrency.
pub fn mark_session_paid(conn: &Connection, id: &str, paid_amount: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_sessions
         SET status = 'paid', paid_amount = ?1, updated_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        params![paid_amount, now(), id],
    )?;
    Ok(affected > 0)
}

/// Advance to processed once orders exist. Accepts pending as the prior state
/// too: a webhook can verify payment and settle in one pass.
pub fn mark_session_processed(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_sessions
         SET status = 'processed', updated_at = ?1
         WHERE id = ?2 AND status IN ('pending', 'paid')",
        params![now(), id],
    )?;
    Ok(affected > 0)
}

pub fn mark_session_failed(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_sessions
         SET status = 'failed', updated_at = ?1
         WHERE id = ?2 AND status IN ('pending', 'paid')",
        params![now(), id],
    )?;
    Ok(affected > 0)
}

/// Expire an unpaid session. Only pending sessions qualify; a paid session
/// is never expired regardless of age.
pub fn mark_session_expired(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_sessions
         SET status = 'expired', updated_at = ?1
         WHERE id = ?2 AND status = 'pending'",
        params![now(), id],
    )?;
    Ok(affected > 0)
}

pub fn touch_last_check(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE payment_sessions SET last_check_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now(), id],
    )?;
    Ok(())
}

/// Bounded batch of sessions the reconciler should re-verify: not yet
/// terminal, invoice assigned, least recently checked first.
pub fn reconcile_candidates(conn: &Connection, limit: i64) -> Result<Vec<PaymentSession>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payment_sessions
             WHERE status IN ('pending', 'paid') AND invoice_id IS NOT NULL
             ORDER BY COALESCE(last_check_at, 0) ASC
             LIMIT ?1",
            SESSION_COLS
        ),
        &[&limit],
    )
}

/// Expire pending sessions that never got an invoice and are past their
/// deadline. Nothing upstream can pay these; without this sweep a
/// provider-rejected seed would sit pending forever, invisible to both
/// reconciliation and retention.
pub fn expire_stale_uninvoiced(conn: &Connection) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE payment_sessions
         SET status = 'expired', updated_at = ?1
         WHERE status = 'pending' AND invoice_id IS NULL AND expires_at < ?1",
        params![now()],
    )?;
    Ok(affected)
}

// ============ Idempotency Ledger ============

/// Atomically claim an invoice for order creation, returning true if this
/// caller won. INSERT OR IGNORE against the primary key means a concurrent
/// duplicate observes 0 affected rows; the loser re-reads and reports
/// DUPLICATE. This insert is the only mutual exclusion order creation needs.
pub fn try_claim_invoice(
    conn: &Connection,
    invoice_id: &str,
    session_id: &str,
    paid_amount: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO processed_invoices
            (invoice_id, session_id, paid_amount, receipt_status, processed_at)
         VALUES (?1, ?2, ?3, 'pending', ?4)",
        params![invoice_id, session_id, paid_amount, now()],
    )?;
    Ok(affected > 0)
}

pub fn get_processed_invoice(conn: &Connection, invoice_id: &str) -> Result<Option<ProcessedInvoice>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM processed_invoices WHERE invoice_id = ?1",
            LEDGER_COLS
        ),
        &[&invoice_id],
    )
}

pub fn set_invoice_orders(conn: &Connection, invoice_id: &str, order_ids: &[String]) -> Result<()> {
    let json = serde_json::to_string(order_ids)?;
    conn.execute(
        "UPDATE processed_invoices SET order_ids = ?1 WHERE invoice_id = ?2",
        params![json, invoice_id],
    )?;
    Ok(())
}

/// Release a claim whose order creation failed, so a provider retry or the
/// reconciler can attempt it again. At most one ledger row per invoice still
/// holds at every instant.
pub fn release_invoice_claim(conn: &Connection, invoice_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM processed_invoices WHERE invoice_id = ?1",
        params![invoice_id],
    )?;
    Ok(())
}

pub fn set_receipt_status(
    conn: &Connection,
    invoice_id: &str,
    status: ReceiptStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE processed_invoices SET receipt_status = ?1 WHERE invoice_id = ?2",
        params![status.as_str(), invoice_id],
    )?;
    Ok(())
}

/// Ledger rows whose compliance receipt still needs registering.
pub fn pending_receipts(conn: &Connection, limit: i64) -> Result<Vec<ProcessedInvoice>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM processed_invoices
             WHERE receipt_status = 'pending'
             ORDER BY processed_at ASC
             LIMIT ?1",
            LEDGER_COLS
        ),
        &[&limit],
    )
}

// ============ Webhook Audit Log ============

/// Write-only record of an ingest attempt. Never read for business logic.
pub fn insert_webhook_event(
    conn: &Connection,
    session_id: Option<&str>,
    invoice_id: Option<&str>,
    raw_body: &str,
    outcome: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO webhook_events (session_id, invoice_id, raw_body, outcome, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![session_id, invoice_id, raw_body, outcome, now()],
    )?;
    Ok(())
}

// ============ Retention ============

/// Purge terminal sessions past the retention window. The WHERE clause on
/// status is a hard safety rule: pending and paid rows are never deleted,
/// regardless of age.
pub fn purge_terminal_sessions(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - retention_days * SECONDS_PER_DAY;
    let deleted = conn.execute(
        "DELETE FROM payment_sessions
         WHERE status IN ('processed', 'failed', 'expired') AND updated_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - retention_days * SECONDS_PER_DAY;
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

/// Ledger rows outlive everything else: they are the duplicate guard for
/// provider retries, so their window must exceed any plausible retry horizon.
pub fn purge_old_processed_invoices(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - retention_days * SECONDS_PER_DAY;
    let deleted = conn.execute(
        "DELETE FROM processed_invoices WHERE processed_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
