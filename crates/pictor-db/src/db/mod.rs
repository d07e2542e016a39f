//! Repositories and stores for data access
//!
//! `artifact` and `kv` define the store contracts the services depend on, with
//! Postgres implementations. `memory` provides in-process implementations of
//! the same contracts. `job` is the queue table behind worker dispatch.

pub mod artifact;
pub mod job;
pub mod kv;
pub mod memory;

pub use artifact::{ArtifactStore, InsertOutcome, PgArtifactStore};
pub use job::{JobRepository, JobStatus, TransformationJob};
pub use kv::{KeyValueStore, KvError, KvResult, PgKeyValueStore};
pub use memory::{MemoryArtifactStore, MemoryKeyValueStore};
