pub mod config;
pub mod error;
pub mod rate_limiter;
pub mod types;

pub use config::DocgraphConfig;
pub use error::{DocgraphError, Result};
pub use rate_limiter::{RateLimiter, SlidingWindowRateLimiter};
pub use types::{CodeComponent, ComponentId, ComponentKind, ComponentMap, Location};
