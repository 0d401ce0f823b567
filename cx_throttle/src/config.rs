use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::error::ThrottleError;

/// Default polling granularity of the drain loop
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1);

/// Default cost of a request when the caller supplies none
pub const DEFAULT_COST: f64 = 1.0;

/// Default bound on pending entries
pub const DEFAULT_MAX_QUEUE_LEN: usize = 1_000;

/// When the entry at the head of the queue may be admitted
///
/// Exchanges disagree on whether a request may "borrow" against future
/// refill, so the choice is per throttler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Admit once `tokens >= 0`, then charge the full cost.
    ///
    /// Tokens may go negative; the next admission waits for the overdraft
    /// to be earned back.
    #[default]
    Overdraft,

    /// Admit only once `tokens >= cost`. Tokens never go negative.
    FullCost,
}

impl AdmissionPolicy {
    /// Tokens still missing before `cost` may be admitted with `tokens` available
    #[inline(always)]
    pub(crate) fn deficit(self, tokens: f64, cost: f64) -> f64 {
        match self {
            AdmissionPolicy::Overdraft => -tokens,
            AdmissionPolicy::FullCost => cost - tokens,
        }
    }
}

/// Throttler configuration
///
/// Rates are expressed per millisecond, matching how exchanges publish
/// "N weight per minute" style limits once divided out.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ThrottlerSettings")]
pub struct ThrottlerConfig {
    /// Tokens added per millisecond of elapsed time
    pub refill_rate: f64,

    /// Upper bound of accumulated tokens (`None` = unbounded)
    pub max_capacity: Option<f64>,

    /// Longest the drain loop sleeps before re-checking the head of the queue
    pub delay: Duration,

    /// Cost used by `throttle_default()`
    pub cost: f64,

    /// Starting balance (`None` = full bucket, or zero when unbounded)
    pub initial_tokens: Option<f64>,

    /// Maximum number of pending entries (`None` = unlimited)
    pub max_queue_len: Option<usize>,

    /// Head-of-line admission rule
    pub policy: AdmissionPolicy,
}

impl ThrottlerConfig {
    /// Create a builder for configuring a throttler
    pub fn builder() -> ThrottlerConfigBuilder {
        ThrottlerConfigBuilder::new()
    }

    /// Configuration for an exchange that publishes a minimum spacing between requests
    ///
    /// One token per `rate_limit_ms`, a bucket of one token, unit default cost.
    pub fn from_rate_limit(rate_limit_ms: f64) -> Self {
        Self {
            refill_rate: 1.0 / rate_limit_ms,
            max_capacity: Some(1.0),
            delay: DEFAULT_DELAY,
            cost: DEFAULT_COST,
            initial_tokens: None,
            max_queue_len: Some(DEFAULT_MAX_QUEUE_LEN),
            policy: AdmissionPolicy::Overdraft,
        }
    }

    /// Balance the bucket starts with (and returns to on reset)
    pub fn starting_tokens(&self) -> f64 {
        let tokens = self.initial_tokens.unwrap_or_else(|| self.max_capacity.unwrap_or(0.0));
        self.clamp(tokens)
    }

    /// Clamp `tokens` to the bucket capacity when bounded
    #[inline(always)]
    pub(crate) fn clamp(&self, tokens: f64) -> f64 {
        match self.max_capacity {
            Some(max) => tokens.min(max),
            None => tokens,
        }
    }

    /// Check the configuration, failing on values that would stall or spin the drain loop
    pub fn validate(&self) -> Result<()> {
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(ThrottleError::InvalidConfig("refill_rate must be a positive finite number"));
        }
        if self.delay.is_zero() {
            return Err(ThrottleError::InvalidConfig("delay must be greater than 0"));
        }
        if let Some(max) = self.max_capacity {
            if !max.is_finite() || max < 0.0 {
                return Err(ThrottleError::InvalidConfig("max_capacity must be a non-negative finite number"));
            }
        }
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err(ThrottleError::InvalidConfig("default cost must be a non-negative finite number"));
        }
        if let Some(tokens) = self.initial_tokens {
            if !tokens.is_finite() {
                return Err(ThrottleError::InvalidConfig("initial_tokens must be finite"));
            }
        }
        if self.max_queue_len == Some(0) {
            return Err(ThrottleError::InvalidConfig("max_queue_len must be greater than 0"));
        }
        if let (AdmissionPolicy::FullCost, Some(max)) = (self.policy, self.max_capacity) {
            if self.cost > max {
                return Err(ThrottleError::InvalidConfig("default cost exceeds max_capacity under full-cost admission"));
            }
        }
        Ok(())
    }
}

/// Builder for configuring a throttler
pub struct ThrottlerConfigBuilder {
    refill_rate: Option<f64>,
    max_capacity: Option<f64>,
    delay: Duration,
    cost: f64,
    initial_tokens: Option<f64>,
    max_queue_len: Option<usize>,
    policy: AdmissionPolicy,
}

impl ThrottlerConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            refill_rate: None,
            max_capacity: None,
            delay: DEFAULT_DELAY,
            cost: DEFAULT_COST,
            initial_tokens: None,
            max_queue_len: Some(DEFAULT_MAX_QUEUE_LEN),
            policy: AdmissionPolicy::Overdraft,
        }
    }

    /// Set the refill rate in tokens per millisecond
    pub fn refill_rate(mut self, tokens_per_ms: f64) -> Self {
        self.refill_rate = Some(tokens_per_ms);
        self
    }

    /// Set the refill rate in tokens per second
    pub fn rate_per_second(mut self, rate: f64) -> Self {
        self.refill_rate = Some(rate / 1_000.0);
        self
    }

    /// Set the refill rate in tokens per minute
    pub fn rate_per_minute(mut self, rate: f64) -> Self {
        self.refill_rate = Some(rate / 60_000.0);
        self
    }

    /// Set the refill rate as one token every `millis`
    pub fn rate_limit_ms(mut self, millis: f64) -> Self {
        self.refill_rate = Some(1.0 / millis);
        self
    }

    /// Bound the bucket (burst allowance)
    pub fn max_capacity(mut self, capacity: f64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    /// Let the bucket accumulate without bound
    pub fn unbounded(mut self) -> Self {
        self.max_capacity = None;
        self
    }

    /// Set the drain loop polling granularity
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the default request cost
    pub fn cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Set the starting balance
    pub fn initial_tokens(mut self, tokens: f64) -> Self {
        self.initial_tokens = Some(tokens);
        self
    }

    /// Bound the number of pending entries
    pub fn max_queue_len(mut self, len: usize) -> Self {
        self.max_queue_len = Some(len);
        self
    }

    /// Allow an unlimited number of pending entries
    pub fn unlimited_queue(mut self) -> Self {
        self.max_queue_len = None;
        self
    }

    /// Set the admission policy
    pub fn policy(mut self, policy: AdmissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ThrottlerConfig> {
        let refill_rate = self.refill_rate.ok_or(ThrottleError::InvalidConfig("refill rate must be set"))?;
        let config = ThrottlerConfig {
            refill_rate,
            max_capacity: self.max_capacity,
            delay: self.delay,
            cost: self.cost,
            initial_tokens: self.initial_tokens,
            max_queue_len: self.max_queue_len,
            policy: self.policy,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for ThrottlerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// File representation of a [`ThrottlerConfig`]
///
/// Exactly one of `refill_rate` (tokens/ms) or `rate_limit_ms` (ms per token)
/// must be present. A missing `max_capacity` means an unbounded bucket.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottlerSettings {
    pub refill_rate: Option<f64>,
    pub rate_limit_ms: Option<f64>,
    pub max_capacity: Option<f64>,
    pub delay_ms: Option<f64>,
    pub cost: Option<f64>,
    pub initial_tokens: Option<f64>,
    pub max_queue_len: Option<usize>,
    pub policy: Option<AdmissionPolicy>,
}

impl TryFrom<ThrottlerSettings> for ThrottlerConfig {
    type Error = ThrottleError;

    fn try_from(settings: ThrottlerSettings) -> Result<Self> {
        let mut builder = ThrottlerConfig::builder();

        builder = match (settings.refill_rate, settings.rate_limit_ms) {
            (Some(rate), None) => builder.refill_rate(rate),
            (None, Some(millis)) => builder.rate_limit_ms(millis),
            (Some(_), Some(_)) => return Err(ThrottleError::InvalidConfig("set either refill_rate or rate_limit_ms, not both")),
            (None, None) => return Err(ThrottleError::InvalidConfig("one of refill_rate or rate_limit_ms must be set")),
        };

        if let Some(capacity) = settings.max_capacity {
            builder = builder.max_capacity(capacity);
        }
        if let Some(millis) = settings.delay_ms {
            if !millis.is_finite() || millis <= 0.0 {
                return Err(ThrottleError::InvalidConfig("delay must be greater than 0"));
            }
            builder = builder.delay(Duration::from_nanos((millis * 1_000_000.0).round() as u64));
        }
        if let Some(cost) = settings.cost {
            builder = builder.cost(cost);
        }
        if let Some(tokens) = settings.initial_tokens {
            builder = builder.initial_tokens(tokens);
        }
        if let Some(len) = settings.max_queue_len {
            builder = builder.max_queue_len(len);
        }
        if let Some(policy) = settings.policy {
            builder = builder.policy(policy);
        }

        builder.build()
    }
}
