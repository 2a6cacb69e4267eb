//! Per-IP rate limiting for public endpoints.
//!
//! This is DoS protection only; the per-session status-check window is a
//! separate business rule enforced in `handlers::status` with a cache stamp.
//!
//! Tiers:
//! - Standard: /webhook, /status
//! - Relaxed: /health
//!
//! Configure via RATE_LIMIT_STANDARD_RPM and RATE_LIMIT_RELAXED_RPM.

use std::sync::Arc;
use std::time::Duration;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;

/// Rate limiter layer type alias using governor types directly
pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

fn create_layer(requests_per_minute: u32) -> RateLimitLayer {
    assert!(requests_per_minute > 0, "Rate limit must be greater than 0");

    let period_secs = 60 / requests_per_minute as u64;
    let config = GovernorConfigBuilder::default()
        .period(Duration::from_secs(period_secs.max(1)))
        .burst_size(requests_per_minute)
        .finish()
        .expect("Failed to build rate limiter config");

    GovernorLayer::new(Arc::new(config))
}

/// Standard tier: webhook ingest and status polling.
pub fn standard_layer(requests_per_minute: u32) -> RateLimitLayer {
    create_layer(requests_per_minute)
}

/// Relaxed tier: health checks.
pub fn relaxed_layer(requests_per_minute: u32) -> RateLimitLayer {
    create_layer(requests_per_minute)
}
