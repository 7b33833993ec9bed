//! Executes a confirmed action: validate, resolve the target, exactly one
//! write, then refresh that kind's snapshot.

use chrono::TimeZone;

use super::dates::DateTimeResolver;
use super::error::ActionError;
use super::resolver::{EntityResolver, Snapshot};
use super::types::{ActionPayload, ApplyOutcome, EntityAction, ValidatedAction};
use super::validation::validate;
use crate::config::AmbiguityPolicy;
use crate::models::{AppointmentReminder, HealthLog, Intent, MedicationReminder, StoredRecord};
use crate::store::{RecordStore, Stores};

/// Cached listings for every kind, the search space for resolution.
#[derive(Debug, Default)]
pub struct Snapshots {
    pub appointments: Snapshot<AppointmentReminder>,
    pub medications: Snapshot<MedicationReminder>,
    pub health_logs: Snapshot<HealthLog>,
}

impl Snapshots {
    /// Fetch all three listings. Failures leave that snapshot empty so it is
    /// fetched again on first use.
    pub async fn refresh_all(&mut self, stores: &Stores, user_id: &str) {
        if let Err(e) = self.appointments.refresh(stores.appointments.as_ref(), user_id).await {
            tracing::warn!(entity = "appointment", error = %e, "Snapshot refresh failed");
            self.appointments.invalidate();
        }
        if let Err(e) = self.medications.refresh(stores.medications.as_ref(), user_id).await {
            tracing::warn!(entity = "medication", error = %e, "Snapshot refresh failed");
            self.medications.invalidate();
        }
        if let Err(e) = self.health_logs.refresh(stores.health_logs.as_ref(), user_id).await {
            tracing::warn!(entity = "health_log", error = %e, "Snapshot refresh failed");
            self.health_logs.invalidate();
        }
    }
}

pub struct ActionApplier<'a> {
    stores: &'a Stores,
    user_id: &'a str,
    policy: AmbiguityPolicy,
}

impl<'a> ActionApplier<'a> {
    pub fn new(stores: &'a Stores, user_id: &'a str, policy: AmbiguityPolicy) -> Self {
        Self {
            stores,
            user_id,
            policy,
        }
    }

    /// Validate `payload` and apply it. Validation failures return before any
    /// store is touched.
    pub async fn apply_payload<Tz: TimeZone>(
        &self,
        payload: &ActionPayload,
        dates: &DateTimeResolver<Tz>,
        snapshots: &mut Snapshots,
    ) -> Result<ApplyOutcome, ActionError> {
        let action = validate(payload, self.user_id, dates)?;
        self.apply(action, snapshots).await
    }

    pub async fn apply(
        &self,
        action: ValidatedAction,
        snapshots: &mut Snapshots,
    ) -> Result<ApplyOutcome, ActionError> {
        match action {
            ValidatedAction::Appointment(a) => {
                self.apply_entity(self.stores.appointments.as_ref(), a, &mut snapshots.appointments)
                    .await
            }
            ValidatedAction::Medication(a) => {
                self.apply_entity(self.stores.medications.as_ref(), a, &mut snapshots.medications)
                    .await
            }
            ValidatedAction::HealthLog(a) => {
                self.apply_entity(self.stores.health_logs.as_ref(), a, &mut snapshots.health_logs)
                    .await
            }
        }
    }

    async fn apply_entity<R: StoredRecord>(
        &self,
        store: &dyn RecordStore<R>,
        action: EntityAction<R::Draft, R::Patch>,
        snapshot: &mut Snapshot<R>,
    ) -> Result<ApplyOutcome, ActionError> {
        let intent = action.intent();
        let resolver = EntityResolver::new(store, self.user_id, self.policy);

        let record_id = match action {
            EntityAction::Create(draft) => store.create(draft).await?.id().to_string(),
            EntityAction::Update { target, patch } => {
                let id = resolver.resolve(&target, intent, snapshot).await?;
                if R::patch_needs_current(&patch) {
                    self.check_against_current(store, &id, &patch, snapshot).await?;
                }
                store.update(&id, patch).await?;
                id
            }
            EntityAction::Delete { target } => {
                let id = resolver.resolve(&target, intent, snapshot).await?;
                store.delete(&id).await?;
                id
            }
        };

        tracing::info!(entity = %R::KIND, %intent, record_id = %record_id, "Action applied");

        // The write stands even if the re-fetch fails.
        if let Err(e) = snapshot.refresh(store, self.user_id).await {
            tracing::warn!(entity = %R::KIND, error = %e, "Snapshot refresh failed after apply");
            snapshot.invalidate();
        }

        Ok(ApplyOutcome {
            entity: R::KIND,
            intent,
            record_id,
        })
    }

    /// Judge `patch` against the stored record before writing it. An id the
    /// snapshot does not know triggers one re-fetch; if it is still unknown
    /// the store's own not-found error is left to surface.
    async fn check_against_current<R: StoredRecord>(
        &self,
        store: &dyn RecordStore<R>,
        id: &str,
        patch: &R::Patch,
        snapshot: &mut Snapshot<R>,
    ) -> Result<(), ActionError> {
        if !snapshot.records().iter().any(|r| r.id() == id) {
            snapshot.refresh(store, self.user_id).await?;
        }
        let Some(current) = snapshot.records().iter().find(|r| r.id() == id) else {
            return Ok(());
        };
        current.check_patch(patch).map_err(|conflict| ActionError::InvalidField {
            entity: R::KIND,
            intent: Intent::Update,
            field: conflict.field,
            reason: conflict.reason.to_string(),
        })
    }
}
