//! Shared helpers.

use axum::http::HeaderMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use subtle::ConstantTimeEq;

/// Length of per-session callback tokens (alphanumeric, ~190 bits).
const CALLBACK_TOKEN_LEN: usize = 32;

/// Generate an opaque per-session callback token. Embedded in the provider
/// callback URL so the provider can call back without holding internal
/// service credentials.
pub fn generate_callback_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CALLBACK_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Constant-time string comparison for secrets. Length is compared first;
/// token lengths are not secret.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Extract and verify the trusted-internal header against the configured
/// shared secret. An unset secret disables internal access entirely.
pub fn internal_caller_authorized(headers: &HeaderMap, internal_api_key: &str) -> bool {
    if internal_api_key.is_empty() {
        return false;
    }
    headers
        .get("x-internal-key")
        .and_then(|v| v.to_str().ok())
        .map(|provided| constant_time_eq(provided, internal_api_key))
        .unwrap_or(false)
}
