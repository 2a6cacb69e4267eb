mod schema;
pub mod from_row;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::orders::OrderService;
use crate::provider::token::TokenCache;
use crate::provider::PaymentProvider;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    /// Durable tier: source of truth for sessions and the idempotency ledger
    pub db: DbPool,
    /// Ephemeral tier: session fast path, leases, rate-limit stamps
    pub cache: Arc<dyn CacheStore>,
    /// Payment provider RPC surface (invoice create / payment check / receipt)
    pub provider: Arc<dyn PaymentProvider>,
    /// Order creation collaborator (the order-management side)
    pub orders: Arc<dyn OrderService>,
    /// Stampede-protected shared credential cache
    pub token_cache: TokenCache,
    pub config: Arc<Config>,
}

impl AppState {
    /// Dual-tier session store over this state's cache and pool.
    pub fn sessions(&self) -> crate::session::SessionStore {
        crate::session::SessionStore::new(
            self.db.clone(),
            self.cache.clone(),
            std::time::Duration::from_secs(self.config.session_cache_ttl_secs),
        )
    }
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
