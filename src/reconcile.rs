//! Background reconciliation: the pull path that repairs missed or delayed
//! webhooks.
//!
//! Each tick is guarded by a cluster-wide lease (set-NX with a TTL slightly
//! longer than a tick) so one instance works at a time; lease expiry is the
//! crash recovery. No ordering is assumed against webhook delivery: both
//! paths converge on the idempotency ledger, and whoever claims first wins.

use std::time::Duration;

use crate::confirm::{verify_and_settle, ConfirmReason};
use crate::db::{queries, AppState};
use crate::error::Result;
use crate::models::{ReceiptStatus, SessionStatus};

const LEASE_KEY: &str = "lease:reconcile";

pub struct Reconciler {
    state: AppState,
}

impl Reconciler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Run forever. Spawned once per process from `main`.
    pub async fn run(self) {
        let interval = Duration::from_secs(self.state.config.reconcile_interval_secs);
        loop {
            tokio::time::sleep(interval).await;

            let lease_ttl = Duration::from_secs(self.state.config.reconcile_lease_secs);
            if !self.state.cache.set_nx(LEASE_KEY, "1", lease_ttl).await {
                tracing::debug!("Reconcile lease held elsewhere, skipping tick");
                continue;
            }

            if let Err(e) = self.tick().await {
                tracing::error!("Reconcile tick failed: {}", e);
            }

            self.state.cache.delete(LEASE_KEY).await;
        }
    }

    /// One reconciliation pass: re-verify a bounded batch of non-terminal
    /// sessions, then retry pending compliance receipts. Per-item failures
    /// are isolated; one bad record never aborts the batch.
    pub async fn tick(&self) -> Result<usize> {
        {
            let conn = self.state.db.get()?;
            match queries::expire_stale_uninvoiced(&conn) {
                Ok(n) if n > 0 => tracing::info!("Expired {} uninvoiced sessions", n),
                Ok(_) => {}
                Err(e) => tracing::warn!("Uninvoiced session expiry failed: {}", e),
            }
        }

        let candidates = {
            let conn = self.state.db.get()?;
            queries::reconcile_candidates(&conn, self.state.config.reconcile_batch_size)?
        };

        let mut settled = 0;
        for session in &candidates {
            match self.reconcile_session(session).await {
                Ok(true) => settled += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        session_id = %session.id,
                        invoice_id = ?session.invoice_id,
                        "Reconcile item failed: {}",
                        e
                    );
                }
            }
        }

        if !candidates.is_empty() {
            tracing::info!(
                candidates = candidates.len(),
                settled,
                "Reconcile tick complete"
            );
        }

        self.retry_pending_receipts().await;
        Ok(settled)
    }

    /// Returns true when this pass created the orders for the session.
    async fn reconcile_session(&self, session: &crate::models::PaymentSession) -> Result<bool> {
        let sessions = self.state.sessions();
        let invoice_id = match session.invoice_id.as_deref() {
            Some(id) => id,
            None => return Ok(false),
        };

        // Ledger first: a webhook may have settled this since the batch was
        // selected. A duplicate with a stale session just needs the status
        // repaired. Repair only on a settled row (order_ids present): an
        // orderless row is an in-flight claim that may yet be released on
        // order-creation failure, and marking the session processed against
        // it would strand a paid invoice with no orders.
        {
            let conn = self.state.db.get()?;
            if let Some(record) = queries::get_processed_invoice(&conn, invoice_id)? {
                drop(conn);
                if !record.order_ids.is_empty() && session.status != SessionStatus::Processed {
                    sessions.mark_processed(&session.id).await?;
                }
                return Ok(false);
            }
        }

        let outcome = verify_and_settle(&self.state, session).await?;
        match outcome.reason {
            None if outcome.processed => Ok(true),
            Some(ConfirmReason::NotPaid) => {
                // Expire only after a fresh check still says unpaid; paid
                // sessions are never expired regardless of age.
                let now = chrono::Utc::now().timestamp();
                if session.status == SessionStatus::Pending && session.expires_at < now {
                    sessions.mark_expired(&session.id).await?;
                    tracing::info!(session_id = %session.id, "Session expired unpaid");
                }
                Ok(false)
            }
            Some(ConfirmReason::AmountMismatch) => {
                sessions.mark_failed(&session.id).await?;
                tracing::warn!(
                    session_id = %session.id,
                    invoice_id,
                    paid = ?outcome.paid_amount,
                    expected = ?outcome.expected_amount,
                    "Session failed on amount mismatch"
                );
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Best-effort secondary side-effect: compliance-receipt registration.
    /// Must never block or fail order creation; errors are recorded and the
    /// row stays pending for the next tick.
    async fn retry_pending_receipts(&self) {
        let batch = {
            match self.state.db.get() {
                Ok(conn) => queries::pending_receipts(&conn, self.state.config.reconcile_batch_size),
                Err(e) => Err(e.into()),
            }
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!("Receipt retry query failed: {}", e);
                return;
            }
        };

        for record in batch {
            if let Err(e) = self.register_receipt(&record).await {
                tracing::warn!(
                    invoice_id = %record.invoice_id,
                    "Receipt registration failed, will retry: {}",
                    e
                );
            }
        }
    }

    async fn register_receipt(&self, record: &crate::models::ProcessedInvoice) -> Result<()> {
        let token = self.state.token_cache.get_token().await?;
        // The provider keys receipts by payment; the invoice ID resolves the
        // payment on their side.
        self.state
            .provider
            .register_receipt(&token, &record.invoice_id)
            .await?;
        let conn = self.state.db.get()?;
        queries::set_receipt_status(&conn, &record.invoice_id, ReceiptStatus::Registered)?;
        tracing::info!(invoice_id = %record.invoice_id, "Compliance receipt registered");
        Ok(())
    }
}
