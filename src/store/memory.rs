//! In-memory `RecordStore` used by tests and local demos.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::models::StoredRecord;

/// Call counts per operation, for asserting "exactly one write".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub list_all: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl CallCounts {
    pub fn writes(&self) -> usize {
        self.create + self.update + self.delete
    }
}

pub struct MemoryStore<R: StoredRecord> {
    records: Mutex<Vec<R>>,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    fail_writes: Mutex<Option<String>>,
    fail_lists: Mutex<Option<String>>,
}

impl<R: StoredRecord> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::with_records(Vec::new())
    }
}

impl<R: StoredRecord> MemoryStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<R>) -> Self {
        Self {
            records: Mutex::new(records),
            list_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            fail_writes: Mutex::new(None),
            fail_lists: Mutex::new(None),
        }
    }

    /// Make every subsequent write fail with `message` (counted, not applied).
    pub async fn fail_writes_with(&self, message: impl Into<String>) {
        *self.fail_writes.lock().await = Some(message.into());
    }

    /// Make every subsequent `list_all` fail with `message`.
    pub async fn fail_lists_with(&self, message: impl Into<String>) {
        *self.fail_lists.lock().await = Some(message.into());
    }

    pub async fn clear_failures(&self) {
        *self.fail_writes.lock().await = None;
        *self.fail_lists.lock().await = None;
    }

    pub async fn records(&self) -> Vec<R> {
        self.records.lock().await.clone()
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            list_all: self.list_calls.load(Ordering::SeqCst),
            create: self.create_calls.load(Ordering::SeqCst),
            update: self.update_calls.load(Ordering::SeqCst),
            delete: self.delete_calls.load(Ordering::SeqCst),
        }
    }

    async fn check_write(&self) -> Result<(), StoreError> {
        match self.fail_writes.lock().await.as_ref() {
            Some(message) => Err(StoreError::Backend(message.clone())),
            None => Ok(()),
        }
    }

    fn not_found(id: &str) -> StoreError {
        StoreError::NotFound {
            entity: R::KIND,
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl<R: StoredRecord> RecordStore<R> for MemoryStore<R> {
    async fn list_all(&self, user_id: &str) -> Result<Vec<R>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_lists.lock().await.as_ref() {
            return Err(StoreError::Backend(message.clone()));
        }
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|r| r.user_profile_id() == user_id)
            .cloned()
            .collect())
    }

    async fn create(&self, draft: R::Draft) -> Result<R, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write().await?;
        let record = R::from_draft(Uuid::new_v4().to_string(), draft);
        self.records.lock().await.push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, patch: R::Patch) -> Result<R, StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write().await?;
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| Self::not_found(id))?;
        record.apply_patch(patch);
        Ok(record.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write().await?;
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            return Err(Self::not_found(id));
        }
        Ok(())
    }
}
