//! Request rate limiting backed by the shared key-value store

mod limiter;

pub use limiter::{FixedWindowRateLimiter, RateLimitDecision};
