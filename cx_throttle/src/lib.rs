pub mod config;
pub mod costs;
pub mod error;
pub mod exchanges;
pub mod throttler;
pub mod time;

pub use config::AdmissionPolicy;
pub use config::ThrottlerConfig;
pub use config::ThrottlerConfigBuilder;
pub use config::ThrottlerSettings;
pub use costs::CostRule;
pub use costs::EndpointCosts;
pub use error::Result;
pub use error::ThrottleError;
pub use throttler::Admission;
pub use throttler::Throttler;
pub use throttler::Ticket;
pub use time::Clock;
pub use time::ManualClock;
pub use time::TokioClock;
