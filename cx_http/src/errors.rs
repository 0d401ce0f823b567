use cx_throttle::ThrottleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Throttler rejected request: {0}")]
    Throttle(#[from] ThrottleError),

    #[error("Not admitted by throttler within {0:?}")]
    ThrottleTimeout(std::time::Duration),

    #[error("Rate limit exceeded (HTTP {0})")]
    RateLimitExceeded(u16),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, HttpError>;

/// Error from [`ThrottledSink`](crate::ThrottledSink)
#[derive(Error, Debug)]
pub enum SendError<E> {
    #[error("Throttler rejected message: {0}")]
    Throttle(#[from] ThrottleError),

    #[error("Sink error: {0}")]
    Sink(E),
}
