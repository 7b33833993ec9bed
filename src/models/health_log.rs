use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::EntityKind;
use super::{PatchConflict, StoredRecord};
use crate::pipeline::actions::dates::to_canonical;

/// Upper bound of the 0–10 severity scale.
pub const MAX_SEVERITY: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthLog {
    pub id: String,
    pub user_profile_id: String,
    pub symptom_type: Option<String>,
    pub severity: Option<u8>,
    pub mood: Option<String>,
    pub medication_intake: Option<String>,
    pub notes: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthLogDraft {
    pub user_profile_id: String,
    pub symptom_type: String,
    pub severity: Option<u8>,
    pub mood: Option<String>,
    pub medication_intake: Option<String>,
    pub notes: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthLogPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptom_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medication_intake: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

impl HealthLogPatch {
    pub fn is_empty(&self) -> bool {
        self.symptom_type.is_none()
            && self.severity.is_none()
            && self.mood.is_none()
            && self.medication_intake.is_none()
            && self.notes.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }
}

impl StoredRecord for HealthLog {
    const KIND: EntityKind = EntityKind::HealthLog;
    type Draft = HealthLogDraft;
    type Patch = HealthLogPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn user_profile_id(&self) -> &str {
        &self.user_profile_id
    }

    fn label(&self) -> Option<&str> {
        self.symptom_type.as_deref()
    }

    fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        Some(self.start_date)
    }

    fn from_draft(id: String, draft: HealthLogDraft) -> Self {
        Self {
            id,
            user_profile_id: draft.user_profile_id,
            symptom_type: Some(draft.symptom_type),
            severity: draft.severity,
            mood: draft.mood,
            medication_intake: draft.medication_intake,
            notes: draft.notes,
            start_date: draft.start_date,
            end_date: draft.end_date,
        }
    }

    fn apply_patch(&mut self, patch: HealthLogPatch) {
        if patch.symptom_type.is_some() {
            self.symptom_type = patch.symptom_type;
        }
        if patch.severity.is_some() {
            self.severity = patch.severity;
        }
        if patch.mood.is_some() {
            self.mood = patch.mood;
        }
        if patch.medication_intake.is_some() {
            self.medication_intake = patch.medication_intake;
        }
        if patch.notes.is_some() {
            self.notes = patch.notes;
        }
        if let Some(start) = patch.start_date {
            self.start_date = start;
        }
        if patch.end_date.is_some() {
            self.end_date = patch.end_date;
        }
    }

    fn patch_needs_current(patch: &HealthLogPatch) -> bool {
        patch.start_date.is_some() || patch.end_date.is_some()
    }

    fn check_patch(&self, patch: &HealthLogPatch) -> Result<(), PatchConflict> {
        let start = patch.start_date.unwrap_or(self.start_date);
        let Some(end) = patch.end_date.or(self.end_date) else {
            return Ok(());
        };
        if end >= start {
            return Ok(());
        }
        Err(if patch.end_date.is_some() {
            PatchConflict {
                field: "end_date",
                reason: "must not be before `start_date`",
            }
        } else {
            PatchConflict {
                field: "start_date",
                reason: "must not be after `end_date`",
            }
        })
    }

    fn summary(&self) -> String {
        let mut line = format!(
            "id={} \"{}\"",
            self.id,
            self.symptom_type.as_deref().unwrap_or("unspecified")
        );
        if let Some(severity) = self.severity {
            line.push_str(&format!(" severity {severity}/{MAX_SEVERITY}"));
        }
        line.push_str(&format!(" from {}", to_canonical(&self.start_date)));
        if let Some(ref end) = self.end_date {
            line.push_str(&format!(" to {}", to_canonical(end)));
        }
        line
    }
}
