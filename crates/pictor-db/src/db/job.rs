use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pictor_core::constants::TRANSFORMATION_NOTIFY_CHANNEL;
use pictor_core::models::TransformationRequest;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, artifact_id, payload, status, attempts, max_attempts, last_error, \
     scheduled_at, started_at, completed_at, created_at, updated_at";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A queued transformation request
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransformationJob {
    pub id: Uuid,
    pub artifact_id: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Attempts started so far, including the current one while running
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransformationJob {
    pub fn request(&self) -> Result<TransformationRequest> {
        serde_json::from_value(self.payload.clone())
            .with_context(|| format!("Job {} carries an invalid payload", self.id))
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Queue table backing the worker dispatch transport
#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a job and wake listening workers in the same transaction.
    #[tracing::instrument(skip(self, request), fields(artifact_id = %request.new_id))]
    pub async fn enqueue(
        &self,
        request: &TransformationRequest,
        max_attempts: i32,
    ) -> Result<TransformationJob> {
        let payload = serde_json::to_value(request).context("Failed to serialize request")?;
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let sql = format!(
            "INSERT INTO transformation_jobs (id, artifact_id, payload, max_attempts) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            JOB_COLUMNS
        );
        let job = sqlx::query_as::<Postgres, TransformationJob>(&sql)
            .bind(Uuid::new_v4())
            .bind(&request.new_id)
            .bind(payload)
            .bind(max_attempts)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to insert transformation job")?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(TRANSFORMATION_NOTIFY_CHANNEL)
            .bind(job.id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to notify workers")?;

        tx.commit().await.context("Failed to commit transaction")?;

        tracing::debug!(job_id = %job.id, artifact_id = %job.artifact_id, "Transformation job enqueued");
        Ok(job)
    }

    /// Claim the oldest runnable job. Concurrent workers never claim the same row.
    #[tracing::instrument(skip(self))]
    pub async fn claim_next(&self) -> Result<Option<TransformationJob>> {
        let sql = format!(
            r#"
            UPDATE transformation_jobs
            SET status = 'running',
                attempts = attempts + 1,
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM transformation_jobs
                WHERE status = 'pending' AND scheduled_at <= NOW()
                ORDER BY scheduled_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        );
        let job = sqlx::query_as::<Postgres, TransformationJob>(&sql)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to claim next transformation job")?;

        if let Some(job) = &job {
            tracing::debug!(job_id = %job.id, attempt = job.attempts, "Transformation job claimed");
        }
        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_completed(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE transformation_jobs SET status = 'completed', completed_at = NOW(), \
             last_error = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark job as completed")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, error))]
    pub async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE transformation_jobs SET status = 'failed', completed_at = NOW(), \
             last_error = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to mark job as failed")?;

        tracing::error!(job_id = %job_id, error = %error, "Transformation job failed permanently");
        Ok(())
    }

    /// Put a failed attempt back in the queue after `delay_secs`.
    #[tracing::instrument(skip(self, error))]
    pub async fn reschedule(&self, job_id: Uuid, delay_secs: u64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE transformation_jobs SET status = 'pending', last_error = $2, \
             scheduled_at = NOW() + make_interval(secs => $3), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(error)
        .bind(delay_secs as f64)
        .execute(&self.pool)
        .await
        .context("Failed to reschedule job")?;
        Ok(())
    }

    /// Return jobs stuck in `running` longer than `grace_secs` to the queue.
    /// Covers workers that died mid-job.
    #[tracing::instrument(skip(self))]
    pub async fn requeue_stale(&self, grace_secs: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE transformation_jobs SET status = 'pending', scheduled_at = NOW(), \
             updated_at = NOW() \
             WHERE status = 'running' AND started_at < NOW() - make_interval(secs => $1)",
        )
        .bind(grace_secs as f64)
        .execute(&self.pool)
        .await
        .context("Failed to requeue stale jobs")?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::warn!(count, "Requeued stale transformation jobs");
        }
        Ok(count)
    }
}
