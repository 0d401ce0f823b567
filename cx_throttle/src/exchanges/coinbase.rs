//! Coinbase exchange throttler presets
//!
//! Coinbase enforces different rate limits for public and private endpoints.
//!
//! Reference: https://docs.cloud.coinbase.com/exchange/docs/rate-limits

use std::time::Duration;

use crate::config::AdmissionPolicy;
use crate::config::ThrottlerConfig;
use crate::config::DEFAULT_MAX_QUEUE_LEN;

fn per_second(requests: f64) -> ThrottlerConfig {
    ThrottlerConfig {
        refill_rate: requests / 1_000.0,
        max_capacity: Some(requests),
        delay: Duration::from_millis(1),
        cost: 1.0,
        initial_tokens: None,
        max_queue_len: Some(DEFAULT_MAX_QUEUE_LEN),
        policy: AdmissionPolicy::FullCost,
    }
}

/// Coinbase public API limits
///
/// Public endpoints (market data):
/// - 10 requests per second
///
/// # Example
/// ```
/// use cx_throttle::exchanges::coinbase;
/// use cx_throttle::Throttler;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> cx_throttle::Result<()> {
/// let throttler = Throttler::new(coinbase::public())?;
///
/// throttler.throttle_default()?.await?;
/// // Make public API request
/// # Ok(())
/// # }
/// ```
pub fn public() -> ThrottlerConfig {
    per_second(10.0)
}

/// Coinbase private API limits (authenticated)
///
/// Private endpoints (trading, account):
/// - 15 requests per second for most accounts
pub fn private() -> ThrottlerConfig {
    per_second(15.0)
}

/// Coinbase Advanced Trade API limits
///
/// - 30 requests per second
pub fn advanced_trade() -> ThrottlerConfig {
    per_second(30.0)
}

/// Coinbase WebSocket send budget (8 messages per second)
pub fn websocket() -> ThrottlerConfig {
    ThrottlerConfig::from_rate_limit(125.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for config in [public(), private(), advanced_trade(), websocket()] {
            assert!(config.validate().is_ok(), "{config:?}");
        }
    }

    #[test]
    fn test_public_limits() {
        let config = public();
        assert_eq!(config.max_capacity, Some(10.0));
        assert!((config.refill_rate - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_private_above_public() {
        assert!(private().refill_rate > public().refill_rate);
        assert!(advanced_trade().refill_rate > private().refill_rate);
    }
}
