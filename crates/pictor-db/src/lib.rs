//! Pictor Database Layer
//!
//! Artifact records, the shared key-value store and the transformation job
//! queue, each behind a trait so services can be wired to Postgres in
//! production and to memory in tests.

pub mod db;

pub use db::{
    ArtifactStore, InsertOutcome, JobRepository, JobStatus, KeyValueStore, KvError, KvResult,
    MemoryArtifactStore, MemoryKeyValueStore, PgArtifactStore, PgKeyValueStore,
    TransformationJob,
};

use anyhow::Context;
use std::path::Path;

/// Apply pending migrations from the workspace `migrations/` directory.
pub async fn run_migrations(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(())
}
