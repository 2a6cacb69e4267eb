//! Tests for the retention sweeper.
//!
//! The hard safety rule: pending and paid sessions are never deleted,
//! regardless of age. Only terminal rows past their retention window go.

use rusqlite::params;

use paygate::cleanup::RetentionSweeper;

mod common;
use common::*;

const SIXTY_DAYS: i64 = 60 * 86400;

fn age_session(state: &AppState, session_id: &str) {
    let conn = state.db.get().unwrap();
    conn.execute(
        "UPDATE payment_sessions SET updated_at = updated_at - ?1 WHERE id = ?2",
        params![SIXTY_DAYS, session_id],
    )
    .unwrap();
}

#[tokio::test]
async fn test_old_terminal_sessions_are_purged() {
    let provider = MockProvider::new();
    let state = create_test_state(provider);

    let processed = seeded_session(&state, "inv_cl_processed").await;
    let failed = seeded_session(&state, "inv_cl_failed").await;
    let expired = seeded_session(&state, "inv_cl_expired").await;
    {
        let conn = state.db.get().unwrap();
        queries::mark_session_paid(&conn, &processed.id, 100_000).unwrap();
        queries::mark_session_processed(&conn, &processed.id).unwrap();
        queries::mark_session_failed(&conn, &failed.id).unwrap();
        queries::mark_session_expired(&conn, &expired.id).unwrap();
    }
    age_session(&state, &processed.id);
    age_session(&state, &failed.id);
    age_session(&state, &expired.id);

    RetentionSweeper::new(state.clone()).tick().unwrap();

    let conn = state.db.get().unwrap();
    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM payment_sessions", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn test_old_pending_and_paid_sessions_survive() {
    let provider = MockProvider::new();
    let state = create_test_state(provider);

    let pending = seeded_session(&state, "inv_cl_pending").await;
    let paid = seeded_session(&state, "inv_cl_paid").await;
    {
        let conn = state.db.get().unwrap();
        queries::mark_session_paid(&conn, &paid.id, 100_000).unwrap();
    }
    age_session(&state, &pending.id);
    age_session(&state, &paid.id);

    RetentionSweeper::new(state.clone()).tick().unwrap();

    let conn = state.db.get().unwrap();
    assert!(queries::get_session(&conn, &pending.id).unwrap().is_some());
    assert!(queries::get_session(&conn, &paid.id).unwrap().is_some());
}

#[tokio::test]
async fn test_fresh_terminal_sessions_survive() {
    let provider = MockProvider::new();
    let state = create_test_state(provider);

    let session = seeded_session(&state, "inv_cl_fresh").await;
    {
        let conn = state.db.get().unwrap();
        queries::mark_session_failed(&conn, &session.id).unwrap();
    }

    RetentionSweeper::new(state.clone()).tick().unwrap();

    let conn = state.db.get().unwrap();
    assert!(queries::get_session(&conn, &session.id).unwrap().is_some());
}

#[tokio::test]
async fn test_old_webhook_events_are_purged() {
    let provider = MockProvider::new();
    let state = create_test_state(provider);

    {
        let conn = state.db.get().unwrap();
        queries::insert_webhook_event(&conn, Some("s1"), Some("i1"), "{}", "NOT_PAID").unwrap();
        queries::insert_webhook_event(&conn, Some("s2"), Some("i2"), "{}", "PROCESSED").unwrap();
        conn.execute(
            "UPDATE webhook_events SET created_at = created_at - ?1 WHERE session_id = 's1'",
            params![SIXTY_DAYS],
        )
        .unwrap();
    }

    RetentionSweeper::new(state.clone()).tick().unwrap();

    let conn = state.db.get().unwrap();
    let remaining: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT session_id FROM webhook_events")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap()
    };
    assert_eq!(remaining, vec!["s2".to_string()]);
}

#[tokio::test]
async fn test_ledger_rows_outlive_sessions() {
    // Ledger retention (180d) is longer than session retention (30d): the
    // duplicate guard must survive any plausible provider retry horizon.
    let provider = MockProvider::new();
    let state = create_test_state(provider);

    {
        let conn = state.db.get().unwrap();
        queries::try_claim_invoice(&conn, "inv_cl_ledger", "pg_sess_gone", 100_000).unwrap();
        conn.execute(
            "UPDATE processed_invoices SET processed_at = processed_at - ?1",
            params![SIXTY_DAYS],
        )
        .unwrap();
    }

    RetentionSweeper::new(state.clone()).tick().unwrap();

    let conn = state.db.get().unwrap();
    assert!(queries::get_processed_invoice(&conn, "inv_cl_ledger")
        .unwrap()
        .is_some());

    // Past the ledger window it goes too.
    conn.execute(
        "UPDATE processed_invoices SET processed_at = processed_at - ?1",
        params![200 * 86400_i64],
    )
    .unwrap();
    drop(conn);
    RetentionSweeper::new(state.clone()).tick().unwrap();
    let conn = state.db.get().unwrap();
    assert!(queries::get_processed_invoice(&conn, "inv_cl_ledger")
        .unwrap()
        .is_none());
}
