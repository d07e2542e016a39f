//! The transformation itself.
//!
//! Pictor does not ship pixel code. Whoever runs a worker implements
//! [`TransformationExecutor`]: fetch the source blob, apply the transformations,
//! store the result and describe it in a [`TransformationOutcome`].

use std::fmt;

use async_trait::async_trait;
use pictor_core::models::{TransformationOutcome, TransformationRequest};

#[async_trait]
pub trait TransformationExecutor: Send + Sync {
    async fn execute(
        &self,
        request: &TransformationRequest,
    ) -> Result<TransformationOutcome, ExecutionError>;
}

/// Executor failure, flagged as worth retrying or not.
#[derive(Debug)]
pub struct ExecutionError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl ExecutionError {
    /// Fails the job immediately, e.g. for a source that no longer exists or
    /// a format the executor cannot produce.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// Retried under the job's backoff policy, e.g. for storage timeouts.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}
