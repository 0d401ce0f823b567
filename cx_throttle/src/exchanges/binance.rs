//! Binance exchange throttler presets
//!
//! Binance bills REST calls by weight against a per-IP budget:
//! - **REQUEST_WEIGHT**: 1_200 weight per minute
//! - **ORDERS**: 100 orders per 10 seconds
//! - WebSocket: 5 incoming messages per second per connection
//!
//! Reference: https://binance-docs.github.io/apidocs/spot/en/#limits

use std::time::Duration;

use crate::config::AdmissionPolicy;
use crate::config::ThrottlerConfig;
use crate::config::DEFAULT_MAX_QUEUE_LEN;
use crate::costs::CostRule;
use crate::costs::EndpointCosts;

/// Milliseconds between unit-weight requests at 1_200 weight per minute
pub const RATE_LIMIT_MS: f64 = 50.0;

/// Binance Spot REST pacing
///
/// One weight unit per 50ms with a single-unit bucket. Heavy endpoints are
/// admitted on overdraft and delay whatever comes after them.
pub fn spot() -> ThrottlerConfig {
    ThrottlerConfig::from_rate_limit(RATE_LIMIT_MS)
}

/// Binance Spot REST with the full minute of weight available as burst
///
/// Weight must be covered before a request goes out, so a full bucket can
/// be spent at once but never overdrawn.
pub fn spot_burst() -> ThrottlerConfig {
    ThrottlerConfig {
        refill_rate: 1_200.0 / 60_000.0,
        max_capacity: Some(1_200.0),
        delay: Duration::from_millis(1),
        cost: 1.0,
        initial_tokens: None,
        max_queue_len: Some(DEFAULT_MAX_QUEUE_LEN),
        policy: AdmissionPolicy::FullCost,
    }
}

/// Binance order placement limits
///
/// - 100 orders per 10 seconds
pub fn orders() -> ThrottlerConfig {
    ThrottlerConfig {
        refill_rate: 100.0 / 10_000.0,
        max_capacity: Some(100.0),
        delay: Duration::from_millis(1),
        cost: 1.0,
        initial_tokens: None,
        max_queue_len: Some(DEFAULT_MAX_QUEUE_LEN),
        policy: AdmissionPolicy::FullCost,
    }
}

/// Binance WebSocket send budget
///
/// - 5 messages per second per connection (subscribe, unsubscribe, ping)
pub fn websocket() -> ThrottlerConfig {
    ThrottlerConfig::from_rate_limit(200.0)
}

/// Request weights of common Binance Spot endpoints
pub fn spot_costs() -> EndpointCosts {
    EndpointCosts::from_static(
        1.0,
        &[
            ("GET /api/v3/ping", CostRule::Fixed(1.0)),
            ("GET /api/v3/time", CostRule::Fixed(1.0)),
            ("GET /api/v3/exchangeInfo", CostRule::Fixed(20.0)),
            ("GET /api/v3/depth", CostRule::ByLimit { cost: 5.0, tiers: vec![(100, 5.0), (500, 25.0), (1000, 50.0), (5000, 250.0)] }),
            ("GET /api/v3/trades", CostRule::Fixed(25.0)),
            ("GET /api/v3/klines", CostRule::Fixed(2.0)),
            ("GET /api/v3/ticker/24hr", CostRule::Fixed(2.0)),
            ("GET /api/v3/avgPrice", CostRule::Fixed(2.0)),
            ("GET /api/v3/account", CostRule::Fixed(20.0)),
            ("GET /api/v3/openOrders", CostRule::Fixed(6.0)),
            ("POST /api/v3/order", CostRule::Fixed(1.0)),
            ("DELETE /api/v3/order", CostRule::Fixed(1.0)),
        ],
    )
}
