//! Dual-tier session store: an ephemeral cache in front of the durable
//! database.
//!
//! The durable tier is the source of truth. Writes land there before any
//! response is returned; the cache is refreshed best-effort and a cache miss
//! falls back to the database with a logged fallback (the log line is how
//! cache effectiveness is monitored). No session ever exists only in cache.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStore;
use crate::db::{queries, DbPool};
use crate::error::{AppError, Result};
use crate::models::{NewSession, PaymentSession};
use crate::payload::OrderPayload;

fn cache_key(session_id: &str) -> String {
    format!("sess:{}", session_id)
}

#[derive(Clone)]
pub struct SessionStore {
    db: DbPool,
    cache: Arc<dyn CacheStore>,
    cache_ttl: Duration,
}

impl SessionStore {
    pub fn new(db: DbPool, cache: Arc<dyn CacheStore>, cache_ttl: Duration) -> Self {
        Self { db, cache, cache_ttl }
    }

    /// Create a session: payload validated at this boundary, durable write
    /// completed before return, cache populated alongside.
    pub async fn create(&self, input: &NewSession) -> Result<PaymentSession> {
        let payload = OrderPayload::from_json(&input.payload)?;
        payload.validate()?;
        if payload.total_amount != input.amount {
            return Err(AppError::BadRequest(
                "Payload total does not match session amount".into(),
            ));
        }

        let conn = self.db.get()?;
        let session = queries::create_session(&conn, input)?;
        drop(conn);

        self.refresh_cache(&session).await;
        Ok(session)
    }

    /// Read through the cache, falling back to the durable tier on a miss.
    pub async fn get(&self, session_id: &str) -> Result<Option<PaymentSession>> {
        if let Some(raw) = self.cache.get(&cache_key(session_id)).await {
            match serde_json::from_str::<PaymentSession>(&raw) {
                Ok(session) => return Ok(Some(session)),
                Err(e) => {
                    // Undecodable entries are dropped so the durable read wins.
                    tracing::warn!(session_id, "Evicting undecodable cached session: {}", e);
                    self.cache.delete(&cache_key(session_id)).await;
                }
            }
        }

        let conn = self.db.get()?;
        let session = queries::get_session(&conn, session_id)?;
        drop(conn);

        if let Some(ref session) = session {
            tracing::debug!(session_id, "Session cache miss, loaded from durable store");
            self.refresh_cache(session).await;
        }
        Ok(session)
    }

    /// Read the durable tier directly, bypassing the cache. The status
    /// endpoint uses this: it must reflect the source of truth even when a
    /// stale cached copy exists.
    pub fn get_durable(&self, session_id: &str) -> Result<Option<PaymentSession>> {
        let conn = self.db.get()?;
        queries::get_session(&conn, session_id)
    }

    pub async fn attach_invoice(&self, session_id: &str, invoice_id: &str) -> Result<bool> {
        let conn = self.db.get()?;
        let attached = queries::attach_invoice(&conn, session_id, invoice_id)?;
        drop(conn);
        self.reload_cache(session_id).await;
        Ok(attached)
    }

    pub async fn record_invoice_error(&self, session_id: &str, error: &str) -> Result<()> {
        let conn = self.db.get()?;
        queries::record_invoice_error(&conn, session_id, error)?;
        drop(conn);
        self.reload_cache(session_id).await;
        Ok(())
    }

    pub async fn mark_paid(&self, session_id: &str, paid_amount: i64) -> Result<bool> {
        let conn = self.db.get()?;
        let advanced = queries::mark_session_paid(&conn, session_id, paid_amount)?;
        drop(conn);
        self.reload_cache(session_id).await;
        Ok(advanced)
    }

    pub async fn mark_processed(&self, session_id: &str) -> Result<bool> {
        let conn = self.db.get()?;
        let advanced = queries::mark_session_processed(&conn, session_id)?;
        drop(conn);
        self.reload_cache(session_id).await;
        Ok(advanced)
    }

    pub async fn mark_failed(&self, session_id: &str) -> Result<bool> {
        let conn = self.db.get()?;
        let advanced = queries::mark_session_failed(&conn, session_id)?;
        drop(conn);
        self.reload_cache(session_id).await;
        Ok(advanced)
    }

    pub async fn mark_expired(&self, session_id: &str) -> Result<bool> {
        let conn = self.db.get()?;
        let advanced = queries::mark_session_expired(&conn, session_id)?;
        drop(conn);
        self.reload_cache(session_id).await;
        Ok(advanced)
    }

    pub async fn touch_last_check(&self, session_id: &str) -> Result<()> {
        let conn = self.db.get()?;
        queries::touch_last_check(&conn, session_id)?;
        drop(conn);
        self.reload_cache(session_id).await;
        Ok(())
    }

    /// Evict the cached copy. Test hook for the durable-fallback property;
    /// production code never needs it for correctness.
    pub async fn evict(&self, session_id: &str) {
        self.cache.delete(&cache_key(session_id)).await;
    }

    /// Best-effort cache refresh after a durable update. Failure here is
    /// invisible to callers: the next read falls back to the database.
    async fn reload_cache(&self, session_id: &str) {
        let loaded = match self.db.get() {
            Ok(conn) => queries::get_session(&conn, session_id),
            Err(e) => {
                tracing::warn!(session_id, "Cache refresh skipped, pool error: {}", e);
                return;
            }
        };
        match loaded {
            Ok(Some(session)) => self.refresh_cache(&session).await,
            Ok(None) => self.cache.delete(&cache_key(session_id)).await,
            Err(e) => tracing::warn!(session_id, "Cache refresh skipped, read error: {}", e),
        }
    }

    async fn refresh_cache(&self, session: &PaymentSession) {
        match serde_json::to_string(session) {
            Ok(json) => {
                self.cache
                    .set(&cache_key(&session.id), &json, self.cache_ttl)
                    .await
            }
            Err(e) => tracing::warn!(session_id = %session.id, "Failed to serialize session for cache: {}", e),
        }
    }
}
