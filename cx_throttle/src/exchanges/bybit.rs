//! Bybit exchange throttler presets
//!
//! Bybit enforces per-IP and per-UID request limits that vary by account level.
//!
//! Reference: https://bybit-exchange.github.io/docs/v5/rate-limit

use std::time::Duration;

use crate::config::AdmissionPolicy;
use crate::config::ThrottlerConfig;
use crate::config::DEFAULT_MAX_QUEUE_LEN;

fn per_minute(requests: f64, burst: f64) -> ThrottlerConfig {
    ThrottlerConfig {
        refill_rate: requests / 60_000.0,
        max_capacity: Some(burst),
        delay: Duration::from_millis(1),
        cost: 1.0,
        initial_tokens: None,
        max_queue_len: Some(DEFAULT_MAX_QUEUE_LEN),
        policy: AdmissionPolicy::FullCost,
    }
}

/// Bybit public API limits
///
/// Public endpoints (market data):
/// - 120 requests per minute
/// - 10 requests burst
pub fn public() -> ThrottlerConfig {
    per_minute(120.0, 10.0)
}

/// Bybit private API limits (default account)
///
/// - 120 requests per minute
/// - 10 requests burst
pub fn private() -> ThrottlerConfig {
    per_minute(120.0, 10.0)
}

/// Bybit private API limits for VIP accounts
///
/// - 600 requests per minute
/// - 50 requests burst
pub fn private_vip() -> ThrottlerConfig {
    per_minute(600.0, 50.0)
}

/// Bybit WebSocket send budget (one message every 20ms)
pub fn websocket() -> ThrottlerConfig {
    ThrottlerConfig::from_rate_limit(20.0)
}
