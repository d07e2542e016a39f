//! Pictor Core Library
//!
//! Domain models, fingerprinting, error types and configuration shared by
//! every Pictor component.

pub mod config;
pub mod constants;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod storage_types;

pub use config::{BaseConfig, Config, PictorConfig, RateLimitConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use fingerprint::fingerprint;
pub use storage_types::StorageBackend;
