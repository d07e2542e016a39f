use async_trait::async_trait;
use pictor_core::models::{
    ArtifactPage, ArtifactRecord, DispatchState, NewArtifact, TransformationOutcome,
};
use pictor_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

const ARTIFACT_COLUMNS: &str = "id, owner_id, filename, storage_url, mimetype, size_bytes, \
     metadata, is_transformed, source_id, dispatch_state, created_at, updated_at";

/// Result of an atomic insert-if-absent
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// This caller's row was written
    Created(ArtifactRecord),
    /// A row with the same id already existed; it is returned unchanged
    Existing(ArtifactRecord),
}

impl InsertOutcome {
    pub fn record(&self) -> &ArtifactRecord {
        match self {
            InsertOutcome::Created(r) | InsertOutcome::Existing(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, InsertOutcome::Created(_))
    }
}

/// Persistence for source and derived image records.
///
/// Every multi-caller decision goes through one conditional statement against
/// the backing store; implementations must not rely on process memory for it.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Insert a record whose id is known to be fresh (uploads).
    async fn create(&self, artifact: NewArtifact) -> Result<ArtifactRecord, AppError>;

    async fn get(&self, id: &str) -> Result<Option<ArtifactRecord>, AppError>;

    /// Insert `artifact` unless its id exists. Backend failures surface as
    /// [`AppError::StoreUnavailable`] and are never reported as `Created`.
    async fn insert_if_absent(&self, artifact: NewArtifact) -> Result<InsertOutcome, AppError>;

    async fn set_dispatch_state(&self, id: &str, state: DispatchState) -> Result<(), AppError>;

    /// Move an untransformed record from `expected` to `next`. Returns false
    /// if the record was not in `expected`.
    async fn transition_dispatch_state(
        &self,
        id: &str,
        expected: DispatchState,
        next: DispatchState,
    ) -> Result<bool, AppError>;

    /// Compare-and-set `failed -> pending`. Returns true for the single caller
    /// that wins the right to re-dispatch.
    async fn claim_redispatch(&self, id: &str) -> Result<bool, AppError> {
        self.transition_dispatch_state(id, DispatchState::Failed, DispatchState::Pending)
            .await
    }

    /// Record worker completion on a derived record. This is the only path
    /// that sets `is_transformed`. Returns `None` if no derived record has `id`.
    async fn complete_transformation(
        &self,
        id: &str,
        outcome: &TransformationOutcome,
    ) -> Result<Option<ArtifactRecord>, AppError>;

    /// Newest first. `page` is 1-based.
    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<ArtifactPage, AppError>;

    /// Fetch `id` only if `owner_id` owns it; a foreign record reads as absent.
    async fn get_owned(
        &self,
        id: &str,
        owner_id: Uuid,
    ) -> Result<Option<ArtifactRecord>, AppError> {
        Ok(self.get(id).await?.filter(|r| r.owner_id == owner_id))
    }
}

/// Postgres-backed artifact store
#[derive(Clone)]
pub struct PgArtifactStore {
    pool: PgPool,
}

impl PgArtifactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        artifact: &NewArtifact,
        on_conflict_do_nothing: bool,
    ) -> Result<Option<ArtifactRecord>, sqlx::Error> {
        let conflict = if on_conflict_do_nothing {
            "ON CONFLICT (id) DO NOTHING"
        } else {
            ""
        };
        let sql = format!(
            "INSERT INTO artifacts (id, owner_id, filename, storage_url, mimetype, size_bytes, \
             metadata, is_transformed, source_id, dispatch_state) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8, $9) {} RETURNING {}",
            conflict, ARTIFACT_COLUMNS
        );
        sqlx::query_as::<Postgres, ArtifactRecord>(&sql)
            .bind(&artifact.id)
            .bind(artifact.owner_id)
            .bind(&artifact.filename)
            .bind(&artifact.storage_url)
            .bind(&artifact.mimetype)
            .bind(artifact.size_bytes)
            .bind(&artifact.metadata)
            .bind(&artifact.source_id)
            .bind(artifact.dispatch_state)
            .fetch_optional(&self.pool)
            .await
    }
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    #[tracing::instrument(skip(self, artifact), fields(db.table = "artifacts", db.operation = "insert", db.record_id = %artifact.id))]
    async fn create(&self, artifact: NewArtifact) -> Result<ArtifactRecord, AppError> {
        self.insert(&artifact, false)
            .await?
            .ok_or_else(|| AppError::Internal("Insert returned no row".to_string()))
    }

    #[tracing::instrument(skip(self), fields(db.table = "artifacts", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: &str) -> Result<Option<ArtifactRecord>, AppError> {
        let sql = format!("SELECT {} FROM artifacts WHERE id = $1", ARTIFACT_COLUMNS);
        let row = sqlx::query_as::<Postgres, ArtifactRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    #[tracing::instrument(skip(self, artifact), fields(db.table = "artifacts", db.operation = "insert_if_absent", db.record_id = %artifact.id))]
    async fn insert_if_absent(&self, artifact: NewArtifact) -> Result<InsertOutcome, AppError> {
        let inserted = self
            .insert(&artifact, true)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Conditional insert failed: {}", e)))?;

        if let Some(record) = inserted {
            return Ok(InsertOutcome::Created(record));
        }

        // Lost to an existing row. Read it in a fresh statement so a row
        // committed concurrently with our insert is visible.
        let existing = self
            .get(&artifact.id)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Read after conflict failed: {}", e)))?;

        existing.map(InsertOutcome::Existing).ok_or_else(|| {
            AppError::StoreUnavailable(format!(
                "Record {} conflicted on insert but could not be read",
                artifact.id
            ))
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "artifacts", db.operation = "update", db.record_id = %id))]
    async fn set_dispatch_state(&self, id: &str, state: DispatchState) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE artifacts SET dispatch_state = $2, updated_at = NOW() \
             WHERE id = $1 AND is_transformed = FALSE",
        )
        .bind(id)
        .bind(state)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "artifacts", db.operation = "update", db.record_id = %id))]
    async fn transition_dispatch_state(
        &self,
        id: &str,
        expected: DispatchState,
        next: DispatchState,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE artifacts SET dispatch_state = $3, updated_at = NOW() \
             WHERE id = $1 AND dispatch_state = $2 AND is_transformed = FALSE",
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, outcome), fields(db.table = "artifacts", db.operation = "update", db.record_id = %id))]
    async fn complete_transformation(
        &self,
        id: &str,
        outcome: &TransformationOutcome,
    ) -> Result<Option<ArtifactRecord>, AppError> {
        let sql = format!(
            "UPDATE artifacts SET is_transformed = TRUE, storage_url = $2, mimetype = $3, \
             size_bytes = $4, dispatch_state = 'dispatched', updated_at = NOW() \
             WHERE id = $1 AND source_id IS NOT NULL RETURNING {}",
            ARTIFACT_COLUMNS
        );
        let row = sqlx::query_as::<Postgres, ArtifactRecord>(&sql)
            .bind(id)
            .bind(&outcome.storage_url)
            .bind(&outcome.mimetype)
            .bind(outcome.size_bytes)
            .fetch_optional(&self.pool)
            .await?;

        if row.is_some() {
            tracing::info!(artifact_id = %id, size_bytes = outcome.size_bytes, "Transformation completed");
        }
        Ok(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "artifacts", db.operation = "select"))]
    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<ArtifactPage, AppError> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);
        let sql = format!(
            "SELECT {} FROM artifacts WHERE owner_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            ARTIFACT_COLUMNS
        );
        let items = sqlx::query_as::<Postgres, ArtifactRecord>(&sql)
            .bind(owner_id)
            .bind(i64::from(limit))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM artifacts WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(ArtifactPage::new(items, page, limit, total))
    }

    #[tracing::instrument(skip(self), fields(db.table = "artifacts", db.operation = "select", db.record_id = %id))]
    async fn get_owned(
        &self,
        id: &str,
        owner_id: Uuid,
    ) -> Result<Option<ArtifactRecord>, AppError> {
        let sql = format!(
            "SELECT {} FROM artifacts WHERE id = $1 AND owner_id = $2",
            ARTIFACT_COLUMNS
        );
        let row = sqlx::query_as::<Postgres, ArtifactRecord>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
