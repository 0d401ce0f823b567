//! Throttler presets for major cryptocurrency exchanges
//!
//! Each preset derives a [`ThrottlerConfig`](crate::ThrottlerConfig) from the
//! exchange's published limits and, where the exchange bills endpoints by
//! weight, an [`EndpointCosts`](crate::EndpointCosts) table. Presets are plain
//! data: build one `Throttler` per connection from them.
//!
//! # Supported Exchanges
//!
//! - **Binance**: weight-based REST limits, order limits, WebSocket sends
//! - **Bybit**: per-IP REST limits and VIP tiers
//! - **Coinbase**: public and private REST limits
//! - **Kraken**: tiered counter-decay limits

pub mod binance;
pub mod bybit;
pub mod coinbase;
pub mod kraken;
