use async_trait::async_trait;
use pictor_core::models::TransformationRequest;
use pictor_worker::{DispatchError, TransformationDispatcher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Records every request it accepts; can be switched to failing.
#[derive(Clone, Default)]
pub struct CountingDispatcher {
    accepted: Arc<Mutex<Vec<TransformationRequest>>>,
    failing: Arc<AtomicBool>,
}

impl CountingDispatcher {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn accepted(&self) -> Vec<TransformationRequest> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransformationDispatcher for CountingDispatcher {
    async fn dispatch(&self, request: &TransformationRequest) -> Result<(), DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Unavailable("queue offline".to_string()));
        }
        self.accepted.lock().unwrap().push(request.clone());
        Ok(())
    }
}
