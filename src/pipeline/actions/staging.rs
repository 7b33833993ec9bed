//! Single-slot confirmation staging.
//!
//! At most one action waits for the user at a time. Staging replaces whatever
//! was there; nothing is queued and nothing is written until `begin_apply`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ActionError;
use super::types::{ActionPayload, ActionSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PendingStatus {
    Staged,
    Applying,
    /// Last apply failed; the action stays reviewable so the user can retry
    /// or dismiss.
    Failed { message: String },
}

/// An action awaiting confirm or dismiss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: Uuid,
    pub payload: ActionPayload,
    pub source: ActionSource,
    pub status: PendingStatus,
    pub staged_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ConfirmationStaging {
    slot: Option<PendingAction>,
}

impl ConfirmationStaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.slot.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    /// Stage `payload`, discarding any previous pending action.
    pub fn stage(
        &mut self,
        payload: ActionPayload,
        source: ActionSource,
        staged_at: DateTime<Utc>,
    ) -> &PendingAction {
        if let Some(previous) = self.slot.take() {
            tracing::debug!(
                previous = %previous.id,
                entity = %previous.payload.entity,
                "Replacing pending action"
            );
        }
        let pending = PendingAction {
            id: Uuid::new_v4(),
            payload,
            source,
            status: PendingStatus::Staged,
            staged_at,
        };
        tracing::info!(
            pending = %pending.id,
            entity = %pending.payload.entity,
            intent = %pending.payload.intent,
            source = ?pending.source,
            target_id = ?pending.payload.explicit_id(),
            "Action staged for confirmation"
        );
        self.slot.insert(pending)
    }

    /// Move the pending action to `applying` and hand out its payload.
    /// A failed action may be applied again.
    pub fn begin_apply(&mut self) -> Result<ActionPayload, ActionError> {
        let pending = self.slot.as_mut().ok_or(ActionError::NothingPending)?;
        if pending.status == PendingStatus::Applying {
            return Err(ActionError::AlreadyApplying);
        }
        pending.status = PendingStatus::Applying;
        Ok(pending.payload.clone())
    }

    /// Like [`begin_apply`](Self::begin_apply), but hands out a guard that
    /// settles the slot. If the guard is dropped unsettled (the apply future
    /// was cancelled), the action is marked failed instead of staying
    /// `applying` forever.
    pub fn start_apply(&mut self) -> Result<(ActionPayload, ApplyInFlight<'_>), ActionError> {
        let payload = self.begin_apply()?;
        Ok((
            payload,
            ApplyInFlight {
                staging: self,
                settled: false,
            },
        ))
    }

    /// Return the pending action to the user with the failure attached.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        if let Some(pending) = self.slot.as_mut() {
            pending.status = PendingStatus::Failed {
                message: message.into(),
            };
        }
    }

    /// Clear the slot after a successful apply.
    pub fn complete(&mut self) -> Option<PendingAction> {
        self.slot.take()
    }

    /// Drop the pending action without side effects.
    pub fn dismiss(&mut self) -> Result<PendingAction, ActionError> {
        match &self.slot {
            None => Err(ActionError::NothingPending),
            Some(p) if p.status == PendingStatus::Applying => Err(ActionError::AlreadyApplying),
            Some(_) => self.slot.take().ok_or(ActionError::NothingPending),
        }
    }
}

/// Shown when an apply was abandoned before the store answered. The write
/// may or may not have landed.
pub const INTERRUPTED_MESSAGE: &str =
    "Saving was interrupted before it finished. Check your records before trying again.";

/// An apply in progress. Settle it with `complete` or `fail`.
pub struct ApplyInFlight<'a> {
    staging: &'a mut ConfirmationStaging,
    settled: bool,
}

impl ApplyInFlight<'_> {
    pub fn complete(mut self) -> Option<PendingAction> {
        self.settled = true;
        self.staging.complete()
    }

    pub fn fail(mut self, message: impl Into<String>) {
        self.settled = true;
        self.staging.mark_failed(message);
    }
}

impl Drop for ApplyInFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Apply abandoned before completion");
            self.staging.mark_failed(INTERRUPTED_MESSAGE);
        }
    }
}
