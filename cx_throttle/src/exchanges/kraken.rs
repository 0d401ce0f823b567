//! Kraken exchange throttler presets
//!
//! Kraken keeps a per-key call counter that each call increments and that
//! decays over time; a call is refused once the counter would pass the
//! tier maximum. That is a token bucket where the cost must be covered
//! up front, so the private presets use full-cost admission.
//!
//! Reference: https://docs.kraken.com/rest/#section/Rate-Limits

use std::time::Duration;

use crate::config::AdmissionPolicy;
use crate::config::ThrottlerConfig;
use crate::config::DEFAULT_MAX_QUEUE_LEN;
use crate::costs::CostRule;
use crate::costs::EndpointCosts;

fn counter(max: f64, decay_per_second: f64) -> ThrottlerConfig {
    ThrottlerConfig {
        refill_rate: decay_per_second / 1_000.0,
        max_capacity: Some(max),
        delay: Duration::from_millis(10),
        cost: 1.0,
        initial_tokens: None,
        max_queue_len: Some(DEFAULT_MAX_QUEUE_LEN),
        policy: AdmissionPolicy::FullCost,
    }
}

/// Kraken public API limits
///
/// - 1 request per second baseline
/// - Burst up to 15 requests
pub fn public() -> ThrottlerConfig {
    counter(15.0, 1.0)
}

/// Kraken private API limits for Starter tier
///
/// - Counter maximum 15
/// - Decays 0.33 per second
pub fn private_starter() -> ThrottlerConfig {
    counter(15.0, 0.33)
}

/// Kraken private API limits for Intermediate tier
///
/// - Counter maximum 20
/// - Decays 0.5 per second
pub fn private_intermediate() -> ThrottlerConfig {
    counter(20.0, 0.5)
}

/// Kraken private API limits for Pro tier
///
/// - Counter maximum 20
/// - Decays 1.0 per second
pub fn private_pro() -> ThrottlerConfig {
    counter(20.0, 1.0)
}

/// Counter increments of Kraken private endpoints
///
/// History queries cost 2, order placement is metered separately and costs 0.
pub fn private_costs() -> EndpointCosts {
    EndpointCosts::from_static(
        1.0,
        &[
            ("POST /0/private/Ledgers", CostRule::Fixed(2.0)),
            ("POST /0/private/QueryLedgers", CostRule::Fixed(2.0)),
            ("POST /0/private/TradesHistory", CostRule::Fixed(2.0)),
            ("POST /0/private/AddOrder", CostRule::Fixed(0.0)),
            ("POST /0/private/CancelOrder", CostRule::Fixed(0.0)),
        ],
    )
}
