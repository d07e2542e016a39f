//! In-process store implementations for local development and tests.
//!
//! Each store guards its whole state with one mutex, which makes every
//! operation atomic for callers sharing the same instance. They are not
//! shared across processes. Expiry uses `tokio::time::Instant`, so tests can
//! pause and advance the clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pictor_core::models::{
    ArtifactPage, ArtifactRecord, DispatchState, NewArtifact, TransformationOutcome,
};
use pictor_core::AppError;
use tokio::time::Instant;
use uuid::Uuid;

use super::artifact::{ArtifactStore, InsertOutcome};
use super::kv::{KeyValueStore, KvError, KvResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A poisoned lock only means another test thread panicked.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Key-value store held in process memory
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every operation fails with [`KvError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> KvResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        self.check_available()?;
        let now = Instant::now();
        let entries = lock(&self.entries);
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        self.check_available()?;
        let expires_at = Instant::now() + ttl;
        lock(&self.entries).insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> KvResult<i64> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = lock(&self.entries);

        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                let current: i64 = entry.value.parse().map_err(|_| KvError::NotACounter {
                    key: key.to_string(),
                })?;
                let next = current + 1;
                entry.value = next.to_string();
                if entry.expires_at.is_none() {
                    entry.expires_at = Some(now + ttl);
                }
                Ok(next)
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: Some(now + ttl),
                    },
                );
                Ok(1)
            }
        }
    }

    async fn ttl(&self, key: &str) -> KvResult<Option<Duration>> {
        self.check_available()?;
        let now = Instant::now();
        let entries = lock(&self.entries);
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> KvResult<bool> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|t| now + t),
            },
        );
        Ok(true)
    }
}

/// Artifact store held in process memory
#[derive(Clone, Default)]
pub struct MemoryArtifactStore {
    records: Arc<Mutex<HashMap<String, ArtifactRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage of the backing database.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable(
                "memory artifact store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn create(&self, artifact: NewArtifact) -> Result<ArtifactRecord, AppError> {
        self.check_available()?;
        let mut records = lock(&self.records);
        if records.contains_key(&artifact.id) {
            return Err(AppError::Internal(format!(
                "Artifact {} already exists",
                artifact.id
            )));
        }
        let record = artifact.into_record(Utc::now());
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<ArtifactRecord>, AppError> {
        self.check_available()?;
        Ok(lock(&self.records).get(id).cloned())
    }

    async fn insert_if_absent(&self, artifact: NewArtifact) -> Result<InsertOutcome, AppError> {
        self.check_available()?;
        let mut records = lock(&self.records);
        if let Some(existing) = records.get(&artifact.id) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        let record = artifact.into_record(Utc::now());
        records.insert(record.id.clone(), record.clone());
        Ok(InsertOutcome::Created(record))
    }

    async fn set_dispatch_state(&self, id: &str, state: DispatchState) -> Result<(), AppError> {
        self.check_available()?;
        if let Some(record) = lock(&self.records)
            .get_mut(id)
            .filter(|r| !r.is_transformed)
        {
            record.dispatch_state = Some(state);
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn transition_dispatch_state(
        &self,
        id: &str,
        expected: DispatchState,
        next: DispatchState,
    ) -> Result<bool, AppError> {
        self.check_available()?;
        let mut records = lock(&self.records);
        match records.get_mut(id) {
            Some(record) if !record.is_transformed && record.dispatch_state == Some(expected) => {
                record.dispatch_state = Some(next);
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_transformation(
        &self,
        id: &str,
        outcome: &TransformationOutcome,
    ) -> Result<Option<ArtifactRecord>, AppError> {
        self.check_available()?;
        let mut records = lock(&self.records);
        let Some(record) = records.get_mut(id).filter(|r| r.source_id.is_some()) else {
            return Ok(None);
        };
        record.is_transformed = true;
        record.storage_url = outcome.storage_url.clone();
        record.mimetype = outcome.mimetype.clone();
        record.size_bytes = outcome.size_bytes;
        record.dispatch_state = Some(DispatchState::Dispatched);
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<ArtifactPage, AppError> {
        self.check_available()?;
        let mut owned: Vec<ArtifactRecord> = lock(&self.records)
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = owned.len() as i64;
        let offset = page.saturating_sub(1) as usize * limit as usize;
        let items = owned
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();
        Ok(ArtifactPage::new(items, page, limit, total))
    }
}
