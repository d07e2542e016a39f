//! Worker pool over `transformation_jobs`: LISTEN/NOTIFY or polling, retry and
//! stale job recovery.
//!
//! Shutdown: [`TransformationWorker::shutdown`] stops the pool from claiming
//! new jobs; it does not wait for running ones. A job interrupted by process
//! exit stays `running` until the stale job reaper returns it to the queue.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use pictor_core::constants::TRANSFORMATION_NOTIFY_CHANNEL;
use pictor_core::models::DispatchState;
use pictor_core::Config;
use pictor_db::{ArtifactStore, JobRepository, TransformationJob};

use crate::executor::{ExecutionError, TransformationExecutor};

/// Maximum delay in seconds before retrying a failed job.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

#[inline]
pub(crate) fn compute_retry_backoff_seconds(attempt: i32) -> u64 {
    2_u64
        .checked_pow(attempt.max(0) as u32)
        .unwrap_or(u64::MAX)
        .min(MAX_RETRY_BACKOFF_SECS)
}

/// What to do with a job after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobDisposition {
    Retry { delay_secs: u64 },
    Fail,
}

pub(crate) fn disposition_after_failure(
    job: &TransformationJob,
    error: &ExecutionError,
) -> JobDisposition {
    if error.is_recoverable() && job.can_retry() {
        JobDisposition::Retry {
            delay_secs: compute_retry_backoff_seconds(job.attempts),
        }
    } else {
        JobDisposition::Fail
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    /// Upper bound on a single executor run
    pub job_timeout_secs: u64,
    /// Interval between runs of the stale job reaper; 0 disables it
    pub stale_job_reap_interval_secs: u64,
    /// How long a job may sit in `running` before it is considered abandoned
    pub stale_job_grace_period_secs: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            job_timeout_secs: 300,
            stale_job_reap_interval_secs: 60,
            stale_job_grace_period_secs: 600,
        }
    }
}

impl From<&Config> for WorkerConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_workers: config.worker_max_concurrency().max(1),
            poll_interval_ms: config.worker_poll_interval_ms(),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
struct WorkerDeps {
    jobs: JobRepository,
    artifacts: Arc<dyn ArtifactStore>,
    executor: Arc<dyn TransformationExecutor>,
    job_timeout: Duration,
}

#[derive(Clone)]
pub struct TransformationWorker {
    shutdown_tx: mpsc::Sender<()>,
}

impl TransformationWorker {
    /// Spawn the worker pool.
    ///
    /// The pool listens on the job notification channel using the repository's
    /// pool and also polls every `poll_interval_ms`, so a missed notification
    /// only delays a job.
    pub fn start(
        jobs: JobRepository,
        artifacts: Arc<dyn ArtifactStore>,
        executor: Arc<dyn TransformationExecutor>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let deps = WorkerDeps {
            jobs,
            artifacts,
            executor,
            job_timeout: Duration::from_secs(config.job_timeout_secs),
        };

        tokio::spawn(async move {
            Self::worker_pool(deps, config, shutdown_rx).await;
        });

        Self { shutdown_tx }
    }

    async fn worker_pool(
        deps: WorkerDeps,
        config: WorkerConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            "Transformation worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        let pool = deps.jobs.pool().clone();
        let listener_task = tokio::spawn(async move {
            loop {
                match sqlx::postgres::PgListener::connect_with(&pool).await {
                    Ok(mut listener) => {
                        if let Err(e) = listener.listen(TRANSFORMATION_NOTIFY_CHANNEL).await {
                            tracing::warn!(error = %e, "LISTEN failed, will retry");
                            sleep(Duration::from_secs(5)).await;
                            continue;
                        }
                        while listener.recv().await.is_ok() {
                            let _ = notify_tx.try_send(());
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "PgListener connect failed, will retry");
                        sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        let reaper_task = (config.stale_job_reap_interval_secs > 0).then(|| {
            let jobs = deps.jobs.clone();
            let every = Duration::from_secs(config.stale_job_reap_interval_secs);
            let grace = config.stale_job_grace_period_secs;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(every);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    if let Err(e) = jobs.requeue_stale(grace).await {
                        tracing::error!(error = %e, "Stale job reaper failed");
                    }
                }
            })
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Transformation worker pool shutting down");
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_run_one(&deps, &semaphore).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_run_one(&deps, &semaphore).await;
                }
            }
        }

        listener_task.abort();
        if let Some(task) = reaper_task {
            task.abort();
        }
        tracing::info!("Transformation worker pool stopped");
    }

    async fn claim_and_run_one(deps: &WorkerDeps, semaphore: &Arc<Semaphore>) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match deps.jobs.claim_next().await {
            Ok(Some(job)) => {
                let deps = deps.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = Self::process_job(job, &deps).await {
                        tracing::error!(error = %e, "Transformation job bookkeeping failed");
                    }
                });
            }
            Ok(None) => tracing::trace!("No transformation jobs available"),
            Err(e) => tracing::error!(error = %e, "Failed to claim transformation job"),
        }
    }

    #[tracing::instrument(skip_all, fields(job.id = %job.id, artifact_id = %job.artifact_id, attempt = job.attempts))]
    async fn process_job(job: TransformationJob, deps: &WorkerDeps) -> Result<()> {
        let request = match job.request() {
            Ok(request) => request,
            Err(e) => {
                deps.jobs.mark_failed(job.id, &e.to_string()).await?;
                return Ok(());
            }
        };

        let result = match tokio::time::timeout(deps.job_timeout, deps.executor.execute(&request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::recoverable(anyhow::anyhow!(
                "Transformation timed out after {}s",
                deps.job_timeout.as_secs()
            ))),
        };

        match result {
            Ok(outcome) => {
                let completed = deps
                    .artifacts
                    .complete_transformation(&request.new_id, &outcome)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to record transformation result: {}", e))?;
                if completed.is_none() {
                    tracing::warn!("Placeholder missing, transformation result discarded");
                }
                deps.jobs
                    .mark_completed(job.id)
                    .await
                    .context("Failed to mark job as completed")?;
                tracing::info!("Transformation job completed");
            }
            Err(error) => {
                tracing::error!(
                    error = %error,
                    recoverable = error.is_recoverable(),
                    max_attempts = job.max_attempts,
                    "Transformation attempt failed"
                );
                match disposition_after_failure(&job, &error) {
                    JobDisposition::Retry { delay_secs } => {
                        tracing::info!(backoff_seconds = delay_secs, "Scheduling job retry");
                        deps.jobs
                            .reschedule(job.id, delay_secs, &error.to_string())
                            .await?;
                    }
                    JobDisposition::Fail => {
                        deps.jobs.mark_failed(job.id, &error.to_string()).await?;
                        // Lets the next identical request re-dispatch.
                        deps.artifacts
                            .set_dispatch_state(&request.new_id, DispatchState::Failed)
                            .await
                            .map_err(|e| anyhow::anyhow!("Failed to flag placeholder: {}", e))?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Stop claiming new jobs. Returns without waiting for running jobs.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating transformation worker shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}
