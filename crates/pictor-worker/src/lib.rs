//! Transformation dispatch and the worker side of the dispatch transports.
//!
//! The API hands [`TransformationRequest`](pictor_core::models::TransformationRequest)
//! messages to a [`TransformationDispatcher`]. The queue transport persists them
//! in `transformation_jobs`, where a [`TransformationWorker`] pool picks them
//! up; the channel transport moves them through a tokio channel for
//! single-process setups. Both end by running a [`TransformationExecutor`]
//! and recording the result on the placeholder artifact.

pub mod channel;
pub mod dispatch;
pub mod executor;
pub mod queue;

pub use channel::spawn_channel_consumer;
pub use dispatch::{ChannelDispatcher, DispatchError, QueueDispatcher, TransformationDispatcher};
pub use executor::{ExecutionError, TransformationExecutor};
pub use queue::{TransformationWorker, WorkerConfig, MAX_RETRY_BACKOFF_SECS};
