//! Pictor Infrastructure Library
//!
//! Shared components used by the API and worker binaries:
//! - Middleware (request ID)
//! - Telemetry initialization
//! - HTTP error body
//! - Fixed-window rate limiting over the shared key-value store
//! - Periodic maintenance of the key-value store

#[cfg(feature = "middleware")]
pub mod middleware;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

pub mod error;

#[cfg(feature = "rate-limit")]
pub mod rate_limit;

#[cfg(feature = "maintenance")]
pub mod maintenance;

#[cfg(feature = "middleware")]
pub use middleware::{get_request_id, request_id_middleware, RequestId};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat};

pub use error::ErrorResponse;

#[cfg(feature = "rate-limit")]
pub use rate_limit::{FixedWindowRateLimiter, RateLimitDecision};

#[cfg(feature = "maintenance")]
pub use maintenance::KvPurgeTask;
