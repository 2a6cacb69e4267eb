use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Payment sessions: one per checkout attempt.
        -- payload is write-once; provider-assigned fields (invoice_id,
        -- invoice_error, paid_amount, status, last_check_at) mutate afterwards.
        CREATE TABLE IF NOT EXISTS payment_sessions (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            invoice_id TEXT UNIQUE,
            user_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            payload TEXT NOT NULL,
            payload_version INTEGER NOT NULL,
            callback_token TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'paid', 'processed', 'failed', 'expired')),
            invoice_error TEXT,
            paid_amount INTEGER,
            last_check_at INTEGER,
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_status ON payment_sessions(status);
        CREATE INDEX IF NOT EXISTS idx_sessions_reconcile
            ON payment_sessions(status, last_check_at)
            WHERE invoice_id IS NOT NULL AND status IN ('pending', 'paid');

        -- Idempotency ledger: the PRIMARY KEY on invoice_id is the
        -- mutual-exclusion gate for order creation. Inserted via
        -- INSERT OR IGNORE so a concurrent loser observes 0 affected rows.
        CREATE TABLE IF NOT EXISTS processed_invoices (
            invoice_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            order_ids TEXT NOT NULL DEFAULT '[]',
            paid_amount INTEGER NOT NULL,
            receipt_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (receipt_status IN ('pending', 'registered', 'skipped')),
            processed_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ledger_receipt
            ON processed_invoices(receipt_status) WHERE receipt_status = 'pending';

        -- Webhook ingest audit log. Write-only: never read for business logic.
        CREATE TABLE IF NOT EXISTS webhook_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT,
            invoice_id TEXT,
            raw_body TEXT NOT NULL,
            outcome TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_created ON webhook_events(created_at);
        "#,
    )
}
