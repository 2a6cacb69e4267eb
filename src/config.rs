use std::env;

/// Runtime configuration, loaded from the environment.
///
/// Every window and interval the engine depends on is configuration, not a
/// constant: retention and rate-limit windows differ per deployment.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Base URL embedded in provider callback URLs (e.g. https://api.example.com)
    pub base_url: String,
    /// Shared secret for trusted internal callers (/seed-session, /internal/webhook)
    pub internal_api_key: String,
    pub dev_mode: bool,

    // Provider connection
    pub provider_base_url: String,
    pub provider_username: String,
    pub provider_password: String,
    /// Merchant invoice template code assigned by the provider
    pub provider_invoice_code: String,
    pub provider_timeout_secs: u64,

    // Access token cache
    pub token_buffer_secs: i64,
    pub token_lock_ttl_secs: u64,
    pub token_retry_attempts: u32,
    pub token_retry_delay_ms: u64,

    // Sessions
    pub session_ttl_secs: i64,
    pub session_cache_ttl_secs: u64,
    /// Absolute tolerance when comparing paid vs expected amount (minor units)
    pub amount_tolerance: i64,

    // Status endpoint
    pub status_check_window_secs: u64,

    // Reconciliation
    pub reconcile_interval_secs: u64,
    pub reconcile_lease_secs: u64,
    pub reconcile_batch_size: i64,

    // Cleanup / retention
    pub cleanup_interval_secs: u64,
    pub cleanup_lease_secs: u64,
    pub session_retention_days: i64,
    pub event_retention_days: i64,
    pub ledger_retention_days: i64,

    // Per-IP rate limits (requests per minute)
    pub rate_limit_standard_rpm: u32,
    pub rate_limit_relaxed_rpm: u32,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("PAYGATE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env_parse("PORT", 3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "paygate.db".to_string()),
            base_url,
            internal_api_key: env::var("INTERNAL_API_KEY").unwrap_or_default(),
            dev_mode,

            provider_base_url: env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "https://merchant.qpay.mn/v2".to_string()),
            provider_username: env::var("PROVIDER_USERNAME").unwrap_or_default(),
            provider_password: env::var("PROVIDER_PASSWORD").unwrap_or_default(),
            provider_invoice_code: env::var("PROVIDER_INVOICE_CODE").unwrap_or_default(),
            provider_timeout_secs: env_parse("PROVIDER_TIMEOUT_SECS", 12),

            token_buffer_secs: env_parse("TOKEN_BUFFER_SECS", 60),
            token_lock_ttl_secs: env_parse("TOKEN_LOCK_TTL_SECS", 5),
            token_retry_attempts: env_parse("TOKEN_RETRY_ATTEMPTS", 3),
            token_retry_delay_ms: env_parse("TOKEN_RETRY_DELAY_MS", 250),

            session_ttl_secs: env_parse("SESSION_TTL_SECS", 3600),
            session_cache_ttl_secs: env_parse("SESSION_CACHE_TTL_SECS", 3600),
            amount_tolerance: env_parse("AMOUNT_TOLERANCE", 1),

            status_check_window_secs: env_parse("STATUS_CHECK_WINDOW_SECS", 10),

            reconcile_interval_secs: env_parse("RECONCILE_INTERVAL_SECS", 60),
            reconcile_lease_secs: env_parse("RECONCILE_LEASE_SECS", 90),
            reconcile_batch_size: env_parse("RECONCILE_BATCH_SIZE", 50),

            cleanup_interval_secs: env_parse("CLEANUP_INTERVAL_SECS", 6 * 3600),
            cleanup_lease_secs: env_parse("CLEANUP_LEASE_SECS", 600),
            session_retention_days: env_parse("SESSION_RETENTION_DAYS", 30),
            event_retention_days: env_parse("EVENT_RETENTION_DAYS", 14),
            ledger_retention_days: env_parse("LEDGER_RETENTION_DAYS", 180),

            rate_limit_standard_rpm: env_parse("RATE_LIMIT_STANDARD_RPM", 30),
            rate_limit_relaxed_rpm: env_parse("RATE_LIMIT_RELAXED_RPM", 60),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
