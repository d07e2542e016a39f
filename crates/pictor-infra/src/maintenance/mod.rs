//! Background maintenance of the shared key-value store

mod kv_purge;

pub use kv_purge::KvPurgeTask;
