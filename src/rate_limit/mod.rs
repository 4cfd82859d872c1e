//! Outbound request accounting for the upstream API.

mod limiter;
mod window;

pub use limiter::{AdaptiveRateLimiter, RateLimiterStats};
pub use window::RateWindow;
