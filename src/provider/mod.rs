pub mod qpay;
pub mod token;

pub use qpay::QpayClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A raw credential grant from the provider's token endpoint. `expires_in`
/// is left unnormalized here; see `token::normalize_expiry`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
}

/// Payment deeplink (bank app button) returned with an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deeplink {
    pub name: String,
    pub description: String,
    pub link: String,
}

/// A successfully created provider invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedInvoice {
    pub invoice_id: String,
    pub qr_text: String,
    pub qr_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_url: Option<String>,
    pub deeplinks: Vec<Deeplink>,
}

/// Invoice creation result. Provider-side rejections (4xx/5xx) are a value,
/// not an error: the caller persists the session with the failure recorded
/// instead of losing it.
#[derive(Debug, Clone)]
pub enum InvoiceOutcome {
    Created(CreatedInvoice),
    Rejected { status: u16, message: String },
}

/// One payment row from the provider's payment-check API.
#[derive(Debug, Clone)]
pub struct PaymentRow {
    pub payment_id: String,
    pub payment_status: String,
    /// Amount in minor units
    pub payment_amount: i64,
}

const PAID_STATUS: &str = "PAID";

/// Sum of paid rows, or None when no row is PAID. The caller, never this
/// layer, decides what a paid or missing payment means for the session.
pub fn paid_total(rows: &[PaymentRow]) -> Option<i64> {
    let paid: Vec<&PaymentRow> = rows
        .iter()
        .filter(|r| r.payment_status.eq_ignore_ascii_case(PAID_STATUS))
        .collect();
    if paid.is_empty() {
        None
    } else {
        Some(paid.iter().map(|r| r.payment_amount).sum())
    }
}

/// Payment provider RPC surface. Methods that need a credential take it
/// explicitly; the stampede-protected `token::TokenCache` owns the sharing.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Provider name for session rows and logging (e.g. "qpay").
    fn provider_name(&self) -> &'static str;

    /// Fetch a fresh access token from the provider's auth endpoint.
    async fn fetch_token(&self) -> Result<TokenGrant>;

    /// Create an invoice for a session. Provider rejections come back as
    /// `InvoiceOutcome::Rejected`, transport failures as `Err`.
    async fn create_invoice(&self, token: &str, req: &CreateInvoiceRequest)
        -> Result<InvoiceOutcome>;

    /// List payment rows for an invoice. This is the sole source of truth
    /// for paid status; webhook bodies are never trusted.
    async fn check_payment(&self, token: &str, invoice_id: &str) -> Result<Vec<PaymentRow>>;

    /// Register a compliance receipt for a settled payment. Best-effort:
    /// callers must never let its failure block order creation.
    async fn register_receipt(&self, token: &str, payment_id: &str) -> Result<()>;
}

/// Inputs for invoice creation, assembled by the seed handler.
#[derive(Debug, Clone)]
pub struct CreateInvoiceRequest {
    pub session_id: String,
    pub user_id: String,
    pub amount: i64,
    pub description: String,
    pub callback_token: String,
}

/// Sanitize a merchant reference to the provider's allowed character set.
/// Anything outside `[A-Za-z0-9_-]` is replaced, and the result is bounded
/// to the provider's 45-char field limit.
pub fn sanitize_reference(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .take(45)
        .collect()
}
