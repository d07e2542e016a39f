//! In-process storage for tests and local development.

use crate::keys::{generate_storage_key, is_valid_key};
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Blob storage held in a map. Presigned URLs are numbered so callers can
/// tell a freshly generated URL from a reused one.
#[derive(Clone)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    base_url: String,
    presign_calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            base_url: base_url.into(),
            presign_calls: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of `get_presigned_url` calls so far
    pub fn presign_calls(&self) -> usize {
        self.presign_calls.load(Ordering::SeqCst)
    }

    /// Make every operation fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::BackendError(
                "memory storage marked failing".to_string(),
            ));
        }
        Ok(())
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload(
        &self,
        owner_id: Uuid,
        filename: &str,
        _content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)> {
        self.check()?;
        let key = generate_storage_key(owner_id, filename);
        self.objects().insert(key.clone(), data);
        let url = self.url(&key);
        Ok((key, url))
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        self.check()?;
        self.objects()
            .get(storage_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.check()?;
        self.objects().remove(storage_key);
        Ok(())
    }

    async fn get_presigned_url(
        &self,
        storage_key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.check()?;
        if !is_valid_key(storage_key) {
            return Err(StorageError::InvalidKey(storage_key.to_string()));
        }
        let n = self.presign_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!(
            "{}?expires_in={}&signature={}",
            self.url(storage_key),
            expires_in.as_secs(),
            n
        ))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
