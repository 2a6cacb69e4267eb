//! Stampede-protected shared cache for the provider access credential.
//!
//! Many concurrent requests need a token; only one should hit the provider's
//! auth endpoint when the cached one runs out. A short-TTL set-NX lock elects
//! the refresher; everyone else re-reads the cache with bounded backoff and,
//! if the refresher is slow, falls back to an uncached direct fetch. The lock
//! is an optimization: a duplicate fetch is wasteful but harmless.
//!
//! The credential value itself is never logged.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::error::Result;

use super::{PaymentProvider, TokenGrant};

const TOKEN_KEY: &str = "token:provider";
const TOKEN_LOCK_KEY: &str = "lock:token:provider";

#[derive(Debug, Serialize, Deserialize)]
struct TokenEntry {
    access_token: String,
    expires_at: i64,
}

/// Tuning knobs, lifted from `Config` at startup.
#[derive(Debug, Clone)]
pub struct TokenCacheSettings {
    /// Remaining lifetime below which a cached token is treated as expired
    pub buffer_secs: i64,
    pub lock_ttl: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

#[derive(Clone)]
pub struct TokenCache {
    cache: Arc<dyn CacheStore>,
    provider: Arc<dyn PaymentProvider>,
    settings: TokenCacheSettings,
}

/// Normalize the provider's expiry field into an absolute epoch timestamp.
///
/// Token endpoints disagree on whether the field is a duration in seconds or
/// an absolute epoch. Durations are minutes-to-hours while epochs sit near
/// 1.7e9, so comparing against `now` disambiguates.
pub fn normalize_expiry(raw: i64, now: i64) -> i64 {
    if raw > now {
        raw
    } else {
        now + raw.max(0)
    }
}

impl TokenCache {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        provider: Arc<dyn PaymentProvider>,
        settings: TokenCacheSettings,
    ) -> Self {
        Self {
            cache,
            provider,
            settings,
        }
    }

    /// Get a token with at least `buffer_secs` of lifetime left, refreshing
    /// the shared cache if needed.
    pub async fn get_token(&self) -> Result<String> {
        if let Some(token) = self.read_cached().await {
            return Ok(token);
        }

        if self
            .cache
            .set_nx(TOKEN_LOCK_KEY, "1", self.settings.lock_ttl)
            .await
        {
            // Double-check: another holder may have refreshed between our
            // cache miss and winning the lock.
            if let Some(token) = self.read_cached().await {
                self.cache.delete(TOKEN_LOCK_KEY).await;
                return Ok(token);
            }

            let result = self.fetch_and_cache().await;
            self.cache.delete(TOKEN_LOCK_KEY).await;
            return result;
        }

        // Another process is refreshing; poll the cache briefly.
        for _ in 0..self.settings.retry_attempts {
            tokio::time::sleep(self.settings.retry_delay).await;
            if let Some(token) = self.read_cached().await {
                return Ok(token);
            }
        }

        // Availability over single-fetch efficiency: fetch directly without
        // touching the cache rather than failing the request.
        tracing::warn!("Token refresh lock contention exhausted retries, fetching uncached");
        let grant = self.provider.fetch_token().await?;
        Ok(grant.access_token)
    }

    async fn read_cached(&self) -> Option<String> {
        let raw = self.cache.get(TOKEN_KEY).await?;
        let entry: TokenEntry = serde_json::from_str(&raw).ok()?;
        let now = Utc::now().timestamp();
        if entry.expires_at - now > self.settings.buffer_secs {
            Some(entry.access_token)
        } else {
            None
        }
    }

    async fn fetch_and_cache(&self) -> Result<String> {
        let grant: TokenGrant = self.provider.fetch_token().await?;
        let now = Utc::now().timestamp();
        let expires_at = normalize_expiry(grant.expires_in, now);

        let cache_secs = expires_at - now - self.settings.buffer_secs;
        if cache_secs > 0 {
            let entry = TokenEntry {
                access_token: grant.access_token.clone(),
                expires_at,
            };
            if let Ok(json) = serde_json::to_string(&entry) {
                self.cache
                    .set(TOKEN_KEY, &json, Duration::from_secs(cache_secs as u64))
                    .await;
            }
        } else {
            tracing::warn!("Provider issued a token expiring within the safety buffer; not caching");
        }

        Ok(grant.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_duration_expiry() {
        let now = 1_700_000_000;
        assert_eq!(normalize_expiry(3600, now), now + 3600);
    }

    #[test]
    fn test_normalize_absolute_expiry() {
        let now = 1_700_000_000;
        assert_eq!(normalize_expiry(now + 7200, now), now + 7200);
    }

    #[test]
    fn test_normalize_negative_expiry_clamped() {
        let now = 1_700_000_000;
        assert_eq!(normalize_expiry(-5, now), now);
    }
}
