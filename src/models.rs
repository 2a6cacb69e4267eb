use serde::{Deserialize, Serialize};

/// Lifecycle of a payment session. Transitions are forward-only:
/// pending -> paid -> processed, or pending/paid -> failed, pending -> expired.
/// The conditional updates in `db::queries` enforce this at the SQL level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Paid,
    Processed,
    Failed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processed => "processed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending payment intent linking a draft order to a provider invoice.
///
/// `payload` is the serialized order-construction data and is immutable after
/// creation; only provider-assigned fields (`invoice_id`, `invoice_error`,
/// `paid_amount`, `status`, `last_check_at`) change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: String,
    pub provider: String,
    pub invoice_id: Option<String>,
    pub user_id: String,
    /// Expected amount in minor units
    pub amount: i64,
    pub currency: String,
    pub payload: String,
    pub payload_version: i64,
    /// Opaque per-session secret embedded in the provider callback URL
    pub callback_token: String,
    pub status: SessionStatus,
    /// Recorded provider rejection from invoice creation, if any
    pub invoice_error: Option<String>,
    /// Verified paid amount, set once the provider confirms payment
    pub paid_amount: Option<i64>,
    pub last_check_at: Option<i64>,
    pub expires_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Write-once input for session creation.
#[derive(Debug)]
pub struct NewSession {
    pub provider: String,
    pub user_id: String,
    pub amount: i64,
    pub currency: String,
    pub payload: String,
    pub payload_version: i64,
    pub callback_token: String,
    pub expires_at: i64,
}

/// Idempotency ledger row: at most one per invoice_id, ever. Its uniqueness
/// constraint is the mutual-exclusion gate for order creation.
#[derive(Debug, Clone)]
pub struct ProcessedInvoice {
    pub invoice_id: String,
    pub session_id: String,
    pub order_ids: Vec<String>,
    pub paid_amount: i64,
    pub receipt_status: ReceiptStatus,
    pub processed_at: i64,
}

/// Best-effort compliance-receipt registration state on a ledger row.
/// `Pending` rows are retried by the reconciler; failures never block
/// order creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Pending,
    Registered,
    Skipped,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Registered => "registered",
            Self::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for ReceiptStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "registered" => Ok(Self::Registered),
            "skipped" => Ok(Self::Skipped),
            _ => Err(()),
        }
    }
}
