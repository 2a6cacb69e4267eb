pub mod seed;
pub mod status;
pub mod webhook;

pub use seed::seed_session;
pub use status::get_status;
pub use webhook::{handle_internal_webhook, handle_webhook};

use axum::routing::{get, post};
use axum::Router;

use crate::db::AppState;

/// Public surface: reached by the payment provider and polling clients.
/// The health route is attached separately in `main` so it can carry the
/// relaxed rate tier.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/status", get(get_status))
}

/// Internal surface: trusted callers holding the shared internal key.
pub fn internal_router() -> Router<AppState> {
    Router::new()
        .route("/seed-session", post(seed_session))
        .route("/internal/webhook", post(handle_internal_webhook))
}
