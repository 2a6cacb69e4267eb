//! Ephemeral TTL cache used for the session fast tier, the shared access
//! token, leases, and rate-limit stamps.
//!
//! Correctness never depends on this tier: sessions survive in the durable
//! store, and the set-if-absent locks it provides are pure optimizations
//! (the idempotency ledger's uniqueness constraint is the real gate). The
//! `CacheStore` trait is the seam where a shared cache such as Redis would
//! plug in for multi-process deployments.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a live (non-expired) value.
    async fn get(&self, key: &str) -> Option<String>;

    /// Set a value with a TTL, overwriting any existing entry.
    async fn set(&self, key: &str, value: &str, ttl: Duration);

    /// Set a value only if the key is absent (or expired). Returns whether
    /// this caller won. This is the lock/lease primitive: expiry of the
    /// entry is the crash-recovery mechanism.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> bool;

    /// Remove a key. Used to release locks and evict stale entries.
    async fn delete(&self, key: &str);
}

/// In-process cache backend over a concurrent map with lazy expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        // Expired entries are dropped on access rather than swept.
        if let Some(entry) = self.entries.get(key) {
            if entry.value().1 > Instant::now() {
                return Some(entry.value().0.clone());
            }
        }
        self.entries.remove_if(key, |_, (_, exp)| *exp <= Instant::now());
        None
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().1 <= now {
                    occupied.insert((value.to_string(), now + ttl));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert((value.to_string(), now + ttl));
                true
            }
        }
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}
