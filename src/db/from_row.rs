//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::{PaymentSession, ProcessedInvoice, ReceiptStatus, SessionStatus};

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt rows.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const SESSION_COLS: &str = "id, provider, invoice_id, user_id, amount, currency, payload, \
     payload_version, callback_token, status, invoice_error, paid_amount, last_check_at, \
     expires_at, created_at, updated_at";

pub const LEDGER_COLS: &str =
    "invoice_id, session_id, order_ids, paid_amount, receipt_status, processed_at";

impl FromRow for PaymentSession {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentSession {
            id: row.get(0)?,
            provider: row.get(1)?,
            invoice_id: row.get(2)?,
            user_id: row.get(3)?,
            amount: row.get(4)?,
            currency: row.get(5)?,
            payload: row.get(6)?,
            payload_version: row.get(7)?,
            callback_token: row.get(8)?,
            status: parse_enum::<SessionStatus>(row, 9, "status")?,
            invoice_error: row.get(10)?,
            paid_amount: row.get(11)?,
            last_check_at: row.get(12)?,
            expires_at: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

impl FromRow for ProcessedInvoice {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let order_ids_json: String = row.get(2)?;
        let order_ids: Vec<String> = serde_json::from_str(&order_ids_json).map_err(|_| {
            rusqlite::Error::InvalidColumnType(2, "order_ids".into(), rusqlite::types::Type::Text)
        })?;
        Ok(ProcessedInvoice {
            invoice_id: row.get(0)?,
            session_id: row.get(1)?,
            order_ids,
            paid_amount: row.get(3)?,
            receipt_status: parse_enum::<ReceiptStatus>(row, 4, "receipt_status")?,
            processed_at: row.get(5)?,
        })
    }
}
