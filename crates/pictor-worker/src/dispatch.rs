//! Dispatch transports
//!
//! A dispatcher only has to get the message to the worker side. It reports a
//! failure instead of blocking when the transport cannot take the message, so
//! admission can surface it to the caller and leave the placeholder for a
//! later retry.

use async_trait::async_trait;
use pictor_core::models::TransformationRequest;
use pictor_core::AppError;
use pictor_db::JobRepository;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatch transport unavailable: {0}")]
    Unavailable(String),

    #[error("Dispatch queue is full")]
    Full,
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        AppError::DispatchUnavailable(err.to_string())
    }
}

#[async_trait]
pub trait TransformationDispatcher: Send + Sync {
    async fn dispatch(&self, request: &TransformationRequest) -> Result<(), DispatchError>;
}

/// Persists requests in `transformation_jobs` and wakes listening workers
#[derive(Clone)]
pub struct QueueDispatcher {
    jobs: JobRepository,
    max_attempts: i32,
}

impl QueueDispatcher {
    pub fn new(jobs: JobRepository, max_attempts: i32) -> Self {
        Self { jobs, max_attempts }
    }
}

#[async_trait]
impl TransformationDispatcher for QueueDispatcher {
    #[tracing::instrument(skip(self, request), fields(artifact_id = %request.new_id))]
    async fn dispatch(&self, request: &TransformationRequest) -> Result<(), DispatchError> {
        let job = self
            .jobs
            .enqueue(request, self.max_attempts)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, artifact_id = %request.new_id, "Failed to enqueue transformation job");
                DispatchError::Unavailable(e.to_string())
            })?;

        tracing::info!(
            job_id = %job.id,
            artifact_id = %request.new_id,
            original_id = %request.original_id,
            "Transformation dispatched"
        );
        Ok(())
    }
}

/// In-process transport over a bounded tokio channel
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<TransformationRequest>,
}

impl ChannelDispatcher {
    /// Build the dispatcher and the receiving end for the consumer.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransformationRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TransformationDispatcher for ChannelDispatcher {
    async fn dispatch(&self, request: &TransformationRequest) -> Result<(), DispatchError> {
        self.tx.try_send(request.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::Full,
            mpsc::error::TrySendError::Closed(_) => {
                DispatchError::Unavailable("consumer has shut down".to_string())
            }
        })?;
        tracing::debug!(artifact_id = %request.new_id, "Transformation sent to in-process consumer");
        Ok(())
    }
}
