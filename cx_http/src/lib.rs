pub mod client;
pub mod errors;
pub mod sink;
pub mod throttled;

pub use client::HttpClient;
pub use client::HttpClientConfig;
pub use errors::HttpError;
pub use errors::Result;
pub use errors::SendError;
pub use sink::ThrottledSink;
pub use throttled::ThrottledClient;
pub use throttled::ThrottledClientBuilder;
