//! Pictor Storage Library
//!
//! The [`Storage`] trait and its S3, local filesystem and in-memory
//! implementations.
//!
//! # Storage key format
//!
//! Keys are owner-scoped: `media/{owner_id}/{filename}`. Keys must not contain
//! `..` or a leading `/`. Key generation lives in [`keys`] so all backends
//! stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use pictor_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
