//! paygate - asynchronous payment-confirmation engine
//!
//! Guarantees exactly-once order creation against an at-least-once,
//! possibly delayed or lost, payment-provider callback. Sessions live in a
//! durable store fronted by an ephemeral cache; a webhook push path and a
//! background reconciliation pull path converge on one idempotency ledger.

pub mod cache;
pub mod cleanup;
pub mod config;
pub mod confirm;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod models;
pub mod orders;
pub mod payload;
pub mod provider;
pub mod rate_limit;
pub mod reconcile;
pub mod session;
pub mod util;
