pub mod memory;

pub use memory::*;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AppointmentReminder, EntityKind, HealthLog, MedicationReminder, StoredRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No {} found with id {id}", .entity.display_name())]
    NotFound { entity: EntityKind, id: String },

    #[error("{0}")]
    Backend(String),
}

/// Persistence for one record kind. Implementations own durability;
/// the assistant only sees these four operations.
#[async_trait]
pub trait RecordStore<R: StoredRecord>: Send + Sync {
    async fn list_all(&self, user_id: &str) -> Result<Vec<R>, StoreError>;

    /// Returns the stored record with its assigned id.
    async fn create(&self, draft: R::Draft) -> Result<R, StoreError>;

    async fn update(&self, id: &str, patch: R::Patch) -> Result<R, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// One store per entity kind the assistant can touch.
#[derive(Clone)]
pub struct Stores {
    pub appointments: Arc<dyn RecordStore<AppointmentReminder>>,
    pub medications: Arc<dyn RecordStore<MedicationReminder>>,
    pub health_logs: Arc<dyn RecordStore<HealthLog>>,
}

impl Stores {
    pub fn new(
        appointments: Arc<dyn RecordStore<AppointmentReminder>>,
        medications: Arc<dyn RecordStore<MedicationReminder>>,
        health_logs: Arc<dyn RecordStore<HealthLog>>,
    ) -> Self {
        Self {
            appointments,
            medications,
            health_logs,
        }
    }
}
