//! Test utilities and fixtures for paygate integration tests

#![allow(dead_code, unused_imports)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tower::ServiceExt;

pub use paygate::cache::{CacheStore, MemoryCache};
pub use paygate::config::Config;
pub use paygate::db::{init_db, queries, AppState, DbPool};
pub use paygate::error::{AppError, Result};
pub use paygate::models::*;
pub use paygate::payload::{CartLine, OrderPayload, PAYLOAD_VERSION};
pub use paygate::provider::token::{TokenCache, TokenCacheSettings};
pub use paygate::provider::{
    CreateInvoiceRequest, CreatedInvoice, InvoiceOutcome, PaymentProvider, PaymentRow, TokenGrant,
};

pub const INTERNAL_KEY: &str = "test-internal-key";

/// Scripted payment provider. Payments are keyed by invoice ID; counters
/// expose how often each upstream endpoint was hit.
pub struct MockProvider {
    pub fetch_count: AtomicUsize,
    pub check_count: AtomicUsize,
    pub receipt_count: AtomicUsize,
    invoice_seq: AtomicUsize,
    /// Simulated latency of the token endpoint
    pub fetch_delay: Duration,
    /// Raw expires_in value returned by the token endpoint
    pub expires_in: Mutex<i64>,
    pub payments: Mutex<HashMap<String, Vec<PaymentRow>>>,
    /// When set, invoice creation returns a provider rejection
    pub reject_invoices: AtomicBool,
    /// When set, payment checks fail with a provider error
    pub fail_checks: AtomicBool,
    /// When set, receipt registration fails
    pub fail_receipts: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fetch_count: AtomicUsize::new(0),
            check_count: AtomicUsize::new(0),
            receipt_count: AtomicUsize::new(0),
            invoice_seq: AtomicUsize::new(0),
            fetch_delay: Duration::from_millis(20),
            expires_in: Mutex::new(3600),
            payments: Mutex::new(HashMap::new()),
            reject_invoices: AtomicBool::new(false),
            fail_checks: AtomicBool::new(false),
            fail_receipts: AtomicBool::new(false),
        })
    }

    /// Script a single PAID row for an invoice.
    pub fn set_paid(&self, invoice_id: &str, amount: i64) {
        self.payments.lock().unwrap().insert(
            invoice_id.to_string(),
            vec![PaymentRow {
                payment_id: format!("pay_{}", invoice_id),
                payment_status: "PAID".to_string(),
                payment_amount: amount,
            }],
        );
    }

    pub fn set_rows(&self, invoice_id: &str, rows: Vec<PaymentRow>) {
        self.payments
            .lock()
            .unwrap()
            .insert(invoice_id.to_string(), rows);
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn provider_name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_token(&self) -> Result<TokenGrant> {
        let n = self.fetch_count.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.fetch_delay).await;
        Ok(TokenGrant {
            access_token: format!("tok-{}", n),
            expires_in: *self.expires_in.lock().unwrap(),
        })
    }

    async fn create_invoice(
        &self,
        _token: &str,
        req: &CreateInvoiceRequest,
    ) -> Result<InvoiceOutcome> {
        if self.reject_invoices.load(Ordering::SeqCst) {
            return Ok(InvoiceOutcome::Rejected {
                status: 400,
                message: "NO_CREDIT".to_string(),
            });
        }
        let n = self.invoice_seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(InvoiceOutcome::Created(CreatedInvoice {
            invoice_id: format!("inv_{}", n),
            qr_text: format!("qr-text-{}", req.session_id),
            qr_image: "base64-qr".to_string(),
            short_url: Some("https://s.example/abc".to_string()),
            deeplinks: Vec::new(),
        }))
    }

    async fn check_payment(&self, _token: &str, invoice_id: &str) -> Result<Vec<PaymentRow>> {
        self.check_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_checks.load(Ordering::SeqCst) {
            return Err(AppError::Provider("check unavailable".to_string()));
        }
        Ok(self
            .payments
            .lock()
            .unwrap()
            .get(invoice_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn register_receipt(&self, _token: &str, _payment_id: &str) -> Result<()> {
        if self.fail_receipts.load(Ordering::SeqCst) {
            return Err(AppError::Provider("receipt service down".to_string()));
        }
        self.receipt_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory pool with the schema applied. Size 1 so every pooled connection
/// sees the same database.
pub fn test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to build test pool");
    init_db(&pool.get().expect("pool conn")).expect("Failed to initialize schema");
    pool
}

/// Config with short windows suitable for tests.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: ":memory:".to_string(),
        base_url: "http://test.local".to_string(),
        internal_api_key: INTERNAL_KEY.to_string(),
        dev_mode: true,

        provider_base_url: "http://provider.local".to_string(),
        provider_username: "u".to_string(),
        provider_password: "p".to_string(),
        provider_invoice_code: "TEST_INVOICE".to_string(),
        provider_timeout_secs: 2,

        token_buffer_secs: 60,
        token_lock_ttl_secs: 2,
        token_retry_attempts: 3,
        token_retry_delay_ms: 50,

        session_ttl_secs: 3600,
        session_cache_ttl_secs: 3600,
        amount_tolerance: 1,

        status_check_window_secs: 10,

        reconcile_interval_secs: 60,
        reconcile_lease_secs: 90,
        reconcile_batch_size: 50,

        cleanup_interval_secs: 6 * 3600,
        cleanup_lease_secs: 600,
        session_retention_days: 30,
        event_retention_days: 14,
        ledger_retention_days: 180,

        rate_limit_standard_rpm: 1000,
        rate_limit_relaxed_rpm: 1000,
    }
}

pub fn create_test_state(provider: Arc<MockProvider>) -> AppState {
    create_test_state_with(provider, test_config())
}

pub fn create_test_state_with(provider: Arc<MockProvider>, config: Config) -> AppState {
    let config = Arc::new(config);
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
    let token_cache = TokenCache::new(
        cache.clone(),
        provider.clone(),
        TokenCacheSettings {
            buffer_secs: config.token_buffer_secs,
            lock_ttl: Duration::from_secs(config.token_lock_ttl_secs),
            retry_attempts: config.token_retry_attempts,
            retry_delay: Duration::from_millis(config.token_retry_delay_ms),
        },
    );
    AppState {
        db: test_pool(),
        cache,
        provider,
        orders: Arc::new(paygate::orders::SellerSplitOrders),
        token_cache,
        config,
    }
}

/// Full router: public and internal surfaces merged, no rate-limit layers.
pub fn app(state: AppState) -> Router {
    paygate::handlers::public_router()
        .merge(paygate::handlers::internal_router())
        .with_state(state)
}

/// Standard test payload: one seller, total 100_000 minor units.
pub fn sample_payload() -> OrderPayload {
    OrderPayload {
        schema_version: PAYLOAD_VERSION,
        cart: vec![CartLine {
            product_id: "prod-1".to_string(),
            seller_id: "seller-1".to_string(),
            quantity: 2,
            unit_price: 50_000,
        }],
        sellers: vec!["seller-1".to_string()],
        total_amount: 100_000,
        shipping_address_id: None,
        coupon: None,
    }
}

/// Create a session directly against the store, with an invoice attached.
pub async fn seeded_session(state: &AppState, invoice_id: &str) -> PaymentSession {
    let payload = sample_payload();
    let input = NewSession {
        provider: "mock".to_string(),
        user_id: "user-1".to_string(),
        amount: payload.total_amount,
        currency: "MNT".to_string(),
        payload: payload.to_json().unwrap(),
        payload_version: PAYLOAD_VERSION,
        callback_token: "cbtok-test-0123456789abcdefghijkl".to_string(),
        expires_at: Utc::now().timestamp() + 3600,
    };
    let sessions = state.sessions();
    let session = sessions.create(&input).await.expect("create session");
    sessions
        .attach_invoice(&session.id, invoice_id)
        .await
        .expect("attach invoice");
    sessions
        .get(&session.id)
        .await
        .expect("reload session")
        .expect("session exists")
}

/// POST a JSON body and return (status, parsed body).
pub async fn post_json(
    app: Router,
    uri: &str,
    headers: &[(&str, &str)],
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = app
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    split_response(response).await
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    split_response(response).await
}

async fn split_response(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}
