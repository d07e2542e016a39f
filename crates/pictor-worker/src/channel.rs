//! Consumer for [`ChannelDispatcher`](crate::ChannelDispatcher).
//!
//! Each message is executed once. A failure marks the placeholder's dispatch
//! as failed so the next identical request re-dispatches it.

use std::sync::Arc;

use pictor_core::models::{DispatchState, TransformationRequest};
use pictor_db::ArtifactStore;
use tokio::sync::{mpsc, Semaphore};

use crate::executor::TransformationExecutor;

pub fn spawn_channel_consumer(
    mut rx: mpsc::Receiver<TransformationRequest>,
    executor: Arc<dyn TransformationExecutor>,
    artifacts: Arc<dyn ArtifactStore>,
    max_workers: usize,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
        tracing::info!(max_workers, "In-process transformation consumer started");

        while let Some(request) = rx.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let executor = executor.clone();
            let artifacts = artifacts.clone();
            tokio::spawn(async move {
                let _permit = permit;
                run_once(&request, executor.as_ref(), artifacts.as_ref()).await;
            });
        }

        tracing::info!("In-process transformation consumer stopped");
    })
}

#[tracing::instrument(skip_all, fields(artifact_id = %request.new_id))]
async fn run_once(
    request: &TransformationRequest,
    executor: &dyn TransformationExecutor,
    artifacts: &dyn ArtifactStore,
) {
    match executor.execute(request).await {
        Ok(outcome) => match artifacts.complete_transformation(&request.new_id, &outcome).await {
            Ok(Some(_)) => tracing::info!("Transformation completed"),
            Ok(None) => tracing::warn!("Placeholder missing, transformation result discarded"),
            Err(e) => tracing::error!(error = %e, "Failed to record transformation result"),
        },
        Err(e) => {
            tracing::error!(error = %e, recoverable = e.is_recoverable(), "Transformation failed");
            if let Err(e) = artifacts
                .set_dispatch_state(&request.new_id, DispatchState::Failed)
                .await
            {
                tracing::error!(error = %e, "Failed to flag placeholder for re-dispatch");
            }
        }
    }
}
