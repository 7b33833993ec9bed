//! Core types for the chat action pipeline.
//!
//! These model the lifecycle:
//! Assistant reply → ActionPayload (loose, wire shape) → ValidatedAction
//! (strict, one variant per entity/intent) → write → ApplyOutcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{
    AppointmentDraft, AppointmentPatch, EntityKind, HealthLogDraft, HealthLogPatch, Intent,
    MedicationDraft, MedicationPatch,
};

// ═══════════════════════════════════════════
// Wire payload
// ═══════════════════════════════════════════

/// The action exactly as it travels in a `symptomsync-action` block.
///
/// `data` stays loosely typed until validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    pub entity: EntityKind,
    pub intent: Intent,
    pub data: Map<String, Value>,
}

impl ActionPayload {
    pub fn new(entity: EntityKind, intent: Intent, data: Map<String, Value>) -> Self {
        Self {
            entity,
            intent,
            data,
        }
    }

    /// Explicit record id, only when it is a JSON string.
    pub fn explicit_id(&self) -> Option<&str> {
        self.data.get("id").and_then(Value::as_str)
    }
}

/// Where a staged action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    /// The assistant emitted an action block.
    Assistant,
    /// Derived heuristically from the user's own message.
    Fallback,
}

// ═══════════════════════════════════════════
// Validated action
// ═══════════════════════════════════════════

/// Loose reference to an existing record, matched by label OR date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupKey {
    pub label: Option<String>,
    pub when: Option<DateTime<Utc>>,
}

impl LookupKey {
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.when.is_none()
    }
}

/// How an update/delete names its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    /// Explicit id from the payload; trusted without a lookup.
    Id(String),
    Lookup(LookupKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityAction<D, P> {
    Create(D),
    Update { target: TargetRef, patch: P },
    Delete { target: TargetRef },
}

impl<D, P> EntityAction<D, P> {
    pub fn intent(&self) -> Intent {
        match self {
            Self::Create(_) => Intent::Create,
            Self::Update { .. } => Intent::Update,
            Self::Delete { .. } => Intent::Delete,
        }
    }
}

/// An action whose required fields have been checked, one variant per entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedAction {
    Appointment(EntityAction<AppointmentDraft, AppointmentPatch>),
    Medication(EntityAction<MedicationDraft, MedicationPatch>),
    HealthLog(EntityAction<HealthLogDraft, HealthLogPatch>),
}

impl ValidatedAction {
    pub fn entity(&self) -> EntityKind {
        match self {
            Self::Appointment(_) => EntityKind::Appointment,
            Self::Medication(_) => EntityKind::Medication,
            Self::HealthLog(_) => EntityKind::HealthLog,
        }
    }

    pub fn intent(&self) -> Intent {
        match self {
            Self::Appointment(a) => a.intent(),
            Self::Medication(a) => a.intent(),
            Self::HealthLog(a) => a.intent(),
        }
    }
}

// ═══════════════════════════════════════════
// Apply result
// ═══════════════════════════════════════════

/// Result of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub entity: EntityKind,
    pub intent: Intent,
    pub record_id: String,
}

impl ApplyOutcome {
    /// Notification text for a successful apply.
    pub fn message(&self) -> String {
        let verb = match self.intent {
            Intent::Create => "created",
            Intent::Update => "updated",
            Intent::Delete => "deleted",
        };
        let name = self.entity.display_name();
        let mut chars = name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        format!("{capitalized} {verb}")
    }
}
