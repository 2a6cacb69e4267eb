//! Retention sweeper: purges old terminal records on a long interval.
//!
//! Guarded by its own cluster-wide lease. The hard safety rule lives in the
//! SQL (`db::queries::purge_terminal_sessions`): pending and paid sessions
//! are never deleted, regardless of age.

use std::time::Duration;

use crate::db::{queries, AppState};
use crate::error::Result;

const LEASE_KEY: &str = "lease:cleanup";

pub struct RetentionSweeper {
    state: AppState,
}

impl RetentionSweeper {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run(self) {
        let interval = Duration::from_secs(self.state.config.cleanup_interval_secs);
        loop {
            tokio::time::sleep(interval).await;

            let lease_ttl = Duration::from_secs(self.state.config.cleanup_lease_secs);
            if !self.state.cache.set_nx(LEASE_KEY, "1", lease_ttl).await {
                tracing::debug!("Cleanup lease held elsewhere, skipping tick");
                continue;
            }

            if let Err(e) = self.tick() {
                tracing::error!("Cleanup tick failed: {}", e);
            }

            self.state.cache.delete(LEASE_KEY).await;
        }
    }

    /// One sweep across all retention windows. Each table is purged
    /// independently so one failure does not abort the rest.
    pub fn tick(&self) -> Result<()> {
        let config = &self.state.config;
        let conn = self.state.db.get()?;

        match queries::purge_terminal_sessions(&conn, config.session_retention_days) {
            Ok(n) if n > 0 => tracing::info!("Purged {} terminal sessions", n),
            Ok(_) => {}
            Err(e) => tracing::warn!("Session purge failed: {}", e),
        }

        match queries::purge_old_webhook_events(&conn, config.event_retention_days) {
            Ok(n) if n > 0 => tracing::info!("Purged {} webhook audit rows", n),
            Ok(_) => {}
            Err(e) => tracing::warn!("Webhook event purge failed: {}", e),
        }

        match queries::purge_old_processed_invoices(&conn, config.ledger_retention_days) {
            Ok(n) if n > 0 => tracing::info!("Purged {} ledger rows", n),
            Ok(_) => {}
            Err(e) => tracing::warn!("Ledger purge failed: {}", e),
        }

        Ok(())
    }
}
