use thiserror::Error;

/// Result type for throttling operations
pub type Result<T> = std::result::Result<T, ThrottleError>;

/// Errors that can occur while configuring or using a throttler
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThrottleError {
    /// Invalid configuration, rejected at construction
    #[error("Invalid throttler configuration: {0}")]
    InvalidConfig(&'static str),

    /// Negative or non-finite cost passed to `throttle()`
    #[error("Invalid cost: {0}")]
    InvalidCost(f64),

    /// Cost can never be covered by a bounded bucket under full-cost admission
    #[error("Cost {cost} exceeds bucket capacity {capacity}")]
    CostExceedsCapacity { cost: f64, capacity: f64 },

    /// The queue already holds the configured maximum of pending entries
    #[error("Throttle queue is full ({0} pending requests)")]
    QueueFull(usize),

    /// `throttle()` was called outside a tokio runtime
    #[error("No tokio runtime available to drive the throttler")]
    NoRuntime,

    /// The drain loop went away before the entry was admitted
    #[error("Throttler closed before admission")]
    Closed,
}
