//! Tests for POST /seed-session.

use axum::http::StatusCode;
use serde_json::json;

mod common;
use common::*;

fn seed_body() -> serde_json::Value {
    json!({
        "user_id": "user-1",
        "cart": [
            {"product_id": "prod-1", "seller_id": "seller-1", "quantity": 2, "unit_price": 50_000}
        ],
        "sellers": ["seller-1"],
        "total_amount": 100_000
    })
}

#[tokio::test]
async fn test_seed_session_returns_invoice() {
    let provider = MockProvider::new();
    let state = create_test_state(provider);

    let (status, body) = post_json(
        app(state.clone()),
        "/seed-session",
        &[("x-internal-key", INTERNAL_KEY)],
        seed_body(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let session_id = body["session_id"].as_str().unwrap();
    assert!(session_id.starts_with("pg_sess_"));
    assert_eq!(body["ttl_sec"], json!(3600));
    let invoice_id = body["invoice"]["invoice_id"].as_str().unwrap();
    assert!(!body["invoice"]["qr_text"].as_str().unwrap().is_empty());

    // Session persisted durably, pending, with the invoice attached.
    let conn = state.db.get().unwrap();
    let session = queries::get_session(&conn, session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Pending);
    assert_eq!(session.invoice_id.as_deref(), Some(invoice_id));
    assert_eq!(session.amount, 100_000);
    assert!(!session.callback_token.is_empty());
}

#[tokio::test]
async fn test_seed_session_requires_internal_key() {
    let provider = MockProvider::new();
    let state = create_test_state(provider);

    let (status, _) = post_json(app(state.clone()), "/seed-session", &[], seed_body()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post_json(
        app(state),
        "/seed-session",
        &[("x-internal-key", "wrong")],
        seed_body(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_provider_rejection_keeps_session() {
    let provider = MockProvider::new();
    provider
        .reject_invoices
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let state = create_test_state(provider);

    let (status, body) = post_json(
        app(state.clone()),
        "/seed-session",
        &[("x-internal-key", INTERNAL_KEY)],
        seed_body(),
    )
    .await;

    // Rejection is a 200 with an error field; the session row survives so
    // invoice creation can be retried.
    assert_eq!(status, StatusCode::OK);
    assert!(body["invoice"].is_null());
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("NO_CREDIT"));

    let session_id = body["session_id"].as_str().unwrap();
    let conn = state.db.get().unwrap();
    let session = queries::get_session(&conn, session_id).unwrap().unwrap();
    assert!(session.invoice_id.is_none());
    assert!(session.invoice_error.is_some());
}

#[tokio::test]
async fn test_empty_cart_rejected() {
    let provider = MockProvider::new();
    let state = create_test_state(provider);

    let mut body = seed_body();
    body["cart"] = json!([]);
    let (status, _) = post_json(
        app(state),
        "/seed-session",
        &[("x-internal-key", INTERNAL_KEY)],
        body,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cart_with_unknown_seller_rejected() {
    let provider = MockProvider::new();
    let state = create_test_state(provider);

    let mut body = seed_body();
    body["sellers"] = json!(["seller-2"]);
    let (status, _) = post_json(
        app(state),
        "/seed-session",
        &[("x-internal-key", INTERNAL_KEY)],
        body,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_seeded_sessions_get_distinct_callback_tokens() {
    let provider = MockProvider::new();
    let state = create_test_state(provider);

    let (_, first) = post_json(
        app(state.clone()),
        "/seed-session",
        &[("x-internal-key", INTERNAL_KEY)],
        seed_body(),
    )
    .await;
    let (_, second) = post_json(
        app(state.clone()),
        "/seed-session",
        &[("x-internal-key", INTERNAL_KEY)],
        seed_body(),
    )
    .await;

    let conn = state.db.get().unwrap();
    let a = queries::get_session(&conn, first["session_id"].as_str().unwrap())
        .unwrap()
        .unwrap();
    let b = queries::get_session(&conn, second["session_id"].as_str().unwrap())
        .unwrap()
        .unwrap();
    assert_ne!(a.callback_token, b.callback_token);
    assert_eq!(a.callback_token.len(), 32);
}
