//! Transformation admission
//!
//! Turns a transformation request into at most one outstanding dispatch per
//! fingerprint. The decision to dispatch is taken by the store's
//! insert-if-absent, never by a read followed by a write, so concurrent
//! callers across any number of instances agree on a single winner.

use std::sync::Arc;

use pictor_core::fingerprint;
use pictor_core::models::{
    ArtifactRecord, DispatchState, TransformationRequest, TransformationSpec,
};
use pictor_core::AppError;
use pictor_db::{ArtifactStore, InsertOutcome};
use pictor_worker::TransformationDispatcher;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Result of one admission call
#[derive(Debug, Clone)]
pub struct Admission {
    pub record: ArtifactRecord,
    /// True only for the caller that sent the dispatch message
    pub dispatched: bool,
}

#[derive(Clone)]
pub struct JobAdmission {
    artifacts: Arc<dyn ArtifactStore>,
    dispatcher: Arc<dyn TransformationDispatcher>,
}

impl JobAdmission {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        dispatcher: Arc<dyn TransformationDispatcher>,
    ) -> Self {
        Self {
            artifacts,
            dispatcher,
        }
    }

    /// Resolve `spec` applied to `original_id` to its derived record,
    /// dispatching the work if nobody has yet.
    ///
    /// - completed record: returned as is, no dispatch
    /// - placeholder pending or dispatched: returned as is, no dispatch
    /// - placeholder whose last dispatch failed: the caller that wins the
    ///   `failed -> pending` claim dispatches again
    /// - no record: a placeholder is created and the creator dispatches
    ///
    /// Fails with `NotFound` when the source is absent or owned by someone
    /// else, and with `DispatchUnavailable` when the transport rejects the
    /// message. The placeholder survives a failed dispatch.
    #[tracing::instrument(skip(self, spec), fields(original_id = %original_id, owner_id = %owner_id))]
    pub async fn request_transformation(
        &self,
        original_id: &str,
        owner_id: Uuid,
        spec: &TransformationSpec,
    ) -> Result<Admission, AppError> {
        spec.ensure_valid()?;

        let source = self
            .artifacts
            .get_owned(original_id, owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;

        if source.is_in_flight() {
            return Err(AppError::InvalidInput(
                "Image is still being transformed and cannot be used as a source yet".to_string(),
            ));
        }

        let id = fingerprint(original_id, spec);
        let transformations = spec.to_flat_map();
        let placeholder =
            ArtifactRecord::placeholder_for(&source, id.clone(), transformations.clone());

        match self.artifacts.insert_if_absent(placeholder).await? {
            InsertOutcome::Created(record) => {
                tracing::debug!(artifact_id = %record.id, "Placeholder created");
                self.dispatch_claimed(record, original_id, owner_id, transformations)
                    .await
            }
            InsertOutcome::Existing(record) if record.is_transformed => {
                tracing::debug!(artifact_id = %record.id, "Transformation already completed");
                Ok(Admission {
                    record,
                    dispatched: false,
                })
            }
            InsertOutcome::Existing(record) => {
                if record.dispatch_state == Some(DispatchState::Failed)
                    && self.artifacts.claim_redispatch(&record.id).await?
                {
                    tracing::info!(artifact_id = %record.id, "Retrying failed transformation");
                    let mut record = record;
                    record.dispatch_state = Some(DispatchState::Pending);
                    return self
                        .dispatch_claimed(record, original_id, owner_id, transformations)
                        .await;
                }

                tracing::debug!(
                    artifact_id = %record.id,
                    dispatch_state = ?record.dispatch_state,
                    "Transformation already in flight"
                );
                Ok(Admission {
                    record,
                    dispatched: false,
                })
            }
        }
    }

    /// Send the message for a placeholder this caller holds in `pending`.
    async fn dispatch_claimed(
        &self,
        mut record: ArtifactRecord,
        original_id: &str,
        owner_id: Uuid,
        transformations: Map<String, Value>,
    ) -> Result<Admission, AppError> {
        let request = TransformationRequest {
            original_id: original_id.to_string(),
            new_id: record.id.clone(),
            user_id: owner_id,
            transformations,
        };

        match self.dispatcher.dispatch(&request).await {
            Ok(()) => {
                // A fast worker may already have moved the record on.
                match self
                    .artifacts
                    .transition_dispatch_state(
                        &record.id,
                        DispatchState::Pending,
                        DispatchState::Dispatched,
                    )
                    .await
                {
                    Ok(true) => record.dispatch_state = Some(DispatchState::Dispatched),
                    Ok(false) => {
                        tracing::debug!(artifact_id = %record.id, "Worker reported before dispatch was recorded")
                    }
                    Err(e) => tracing::warn!(
                        error = %e,
                        artifact_id = %record.id,
                        "Dispatch sent but could not be recorded"
                    ),
                }
                Ok(Admission {
                    record,
                    dispatched: true,
                })
            }
            Err(dispatch_err) => {
                tracing::warn!(
                    error = %dispatch_err,
                    artifact_id = %record.id,
                    "Dispatch failed, placeholder left for retry"
                );
                if let Err(e) = self
                    .artifacts
                    .transition_dispatch_state(
                        &record.id,
                        DispatchState::Pending,
                        DispatchState::Failed,
                    )
                    .await
                {
                    tracing::error!(
                        error = %e,
                        artifact_id = %record.id,
                        "Failed to record dispatch failure; placeholder stays pending"
                    );
                }
                Err(dispatch_err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pictor_core::models::{NewArtifact, Resize, TransformationOutcome};
    use pictor_db::MemoryArtifactStore;
    use pictor_worker::DispatchError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<TransformationRequest>>,
        failing: AtomicBool,
    }

    impl RecordingDispatcher {
        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TransformationDispatcher for RecordingDispatcher {
        async fn dispatch(&self, request: &TransformationRequest) -> Result<(), DispatchError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(DispatchError::Unavailable("broker down".to_string()));
            }
            // Yield so concurrent callers interleave around the insert.
            tokio::task::yield_now().await;
            self.sent.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    struct Fixture {
        store: MemoryArtifactStore,
        dispatcher: Arc<RecordingDispatcher>,
        admission: Arc<JobAdmission>,
        owner: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = MemoryArtifactStore::new();
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let admission = Arc::new(JobAdmission::new(
            Arc::new(store.clone()),
            dispatcher.clone(),
        ));
        let owner = Uuid::new_v4();
        store
            .create(NewArtifact {
                id: "abc".to_string(),
                owner_id: owner,
                filename: "cat.png".to_string(),
                storage_url: format!("media/{}/cat.png", owner),
                mimetype: "image/png".to_string(),
                size_bytes: 2048,
                metadata: serde_json::json!({ "original_filename": "cat.png" }),
                source_id: None,
                dispatch_state: None,
            })
            .await
            .unwrap();
        Fixture {
            store,
            dispatcher,
            admission,
            owner,
        }
    }

    fn resize_spec() -> TransformationSpec {
        TransformationSpec {
            resize: Some(Resize {
                width: 800,
                height: 600,
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_request_creates_placeholder_and_dispatches() {
        let fx = fixture().await;
        let spec = resize_spec();

        let admission = fx
            .admission
            .request_transformation("abc", fx.owner, &spec)
            .await
            .unwrap();

        assert!(admission.dispatched);
        assert_eq!(admission.record.id, fingerprint("abc", &spec));
        assert!(!admission.record.is_transformed);
        assert_eq!(admission.record.source_id.as_deref(), Some("abc"));
        assert_eq!(
            admission.record.dispatch_state,
            Some(DispatchState::Dispatched)
        );

        let sent = fx.dispatcher.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].original_id, "abc");
        assert_eq!(sent[0].new_id, admission.record.id);
        assert_eq!(sent[0].user_id, fx.owner);
        assert_eq!(
            sent[0].transformations.get("resize"),
            Some(&serde_json::json!({ "width": 800, "height": 600 }))
        );
    }

    #[tokio::test]
    async fn test_back_to_back_identical_requests_dispatch_once() {
        let fx = fixture().await;
        let spec = resize_spec();

        let first = fx
            .admission
            .request_transformation("abc", fx.owner, &spec)
            .await
            .unwrap();
        let second = fx
            .admission
            .request_transformation("abc", fx.owner, &spec)
            .await
            .unwrap();

        assert!(first.dispatched);
        assert!(!second.dispatched);
        assert_eq!(first.record.id, second.record.id);
        assert_eq!(fx.dispatcher.count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_requests_dispatch_once() {
        let fx = fixture().await;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let admission = fx.admission.clone();
            let owner = fx.owner;
            handles.push(tokio::spawn(async move {
                admission
                    .request_transformation("abc", owner, &resize_spec())
                    .await
                    .unwrap()
            }));
        }

        let mut ids = std::collections::HashSet::new();
        let mut dispatched = 0;
        for handle in handles {
            let admission = handle.await.unwrap();
            ids.insert(admission.record.id);
            if admission.dispatched {
                dispatched += 1;
            }
        }

        assert_eq!(ids.len(), 1);
        assert_eq!(dispatched, 1);
        assert_eq!(fx.dispatcher.count(), 1);
        // Source plus one placeholder.
        assert_eq!(fx.store.len(), 2);
    }

    #[tokio::test]
    async fn test_completed_transformation_is_served_without_dispatch() {
        let fx = fixture().await;
        let spec = resize_spec();
        let first = fx
            .admission
            .request_transformation("abc", fx.owner, &spec)
            .await
            .unwrap();

        fx.store
            .complete_transformation(
                &first.record.id,
                &TransformationOutcome {
                    storage_url: "media/derived.webp".to_string(),
                    mimetype: "image/webp".to_string(),
                    size_bytes: 512,
                },
            )
            .await
            .unwrap();

        let again = fx
            .admission
            .request_transformation("abc", fx.owner, &spec)
            .await
            .unwrap();

        assert!(!again.dispatched);
        assert!(again.record.is_transformed);
        assert_eq!(again.record.storage_url, "media/derived.webp");
        assert_eq!(fx.dispatcher.count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_surfaced_and_retried_later() {
        let fx = fixture().await;
        let spec = resize_spec();

        fx.dispatcher.failing.store(true, Ordering::SeqCst);
        let err = fx
            .admission
            .request_transformation("abc", fx.owner, &spec)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DispatchUnavailable(_)));

        let placeholder = fx
            .store
            .get(&fingerprint("abc", &spec))
            .await
            .unwrap()
            .expect("placeholder survives a failed dispatch");
        assert_eq!(placeholder.dispatch_state, Some(DispatchState::Failed));

        fx.dispatcher.failing.store(false, Ordering::SeqCst);
        let retried = fx
            .admission
            .request_transformation("abc", fx.owner, &spec)
            .await
            .unwrap();
        assert!(retried.dispatched);
        assert_eq!(retried.record.id, placeholder.id);
        assert_eq!(fx.dispatcher.count(), 1);

        let settled = fx
            .admission
            .request_transformation("abc", fx.owner, &spec)
            .await
            .unwrap();
        assert!(!settled.dispatched);
        assert_eq!(fx.dispatcher.count(), 1);
    }

    #[tokio::test]
    async fn test_foreign_or_missing_source_is_not_found() {
        let fx = fixture().await;
        let spec = resize_spec();

        let foreign = fx
            .admission
            .request_transformation("abc", Uuid::new_v4(), &spec)
            .await
            .unwrap_err();
        assert!(matches!(foreign, AppError::NotFound(_)));

        let missing = fx
            .admission
            .request_transformation("nope", fx.owner, &spec)
            .await
            .unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
        assert_eq!(fx.dispatcher.count(), 0);
    }

    #[tokio::test]
    async fn test_store_outage_is_fatal_to_admission() {
        let fx = fixture().await;
        fx.store.set_unavailable(true);

        let err = fx
            .admission
            .request_transformation("abc", fx.owner, &resize_spec())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        assert_eq!(fx.dispatcher.count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_or_empty_spec_rejected_before_any_write() {
        let fx = fixture().await;

        let empty = fx
            .admission
            .request_transformation("abc", fx.owner, &TransformationSpec::default())
            .await
            .unwrap_err();
        assert!(matches!(empty, AppError::InvalidInput(_)));

        let bad_format = TransformationSpec {
            format: Some("bmp".to_string()),
            ..Default::default()
        };
        assert!(fx
            .admission
            .request_transformation("abc", fx.owner, &bad_format)
            .await
            .is_err());

        assert_eq!(fx.store.len(), 1);
        assert_eq!(fx.dispatcher.count(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_placeholder_cannot_be_a_source() {
        let fx = fixture().await;
        let first = fx
            .admission
            .request_transformation("abc", fx.owner, &resize_spec())
            .await
            .unwrap();

        let rotate = TransformationSpec {
            rotate: Some(90),
            ..Default::default()
        };
        let err = fx
            .admission
            .request_transformation(&first.record.id, fx.owner, &rotate)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
