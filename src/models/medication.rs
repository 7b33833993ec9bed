use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::EntityKind;
use super::StoredRecord;
use crate::pipeline::actions::dates::to_canonical;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationReminder {
    pub id: String,
    pub user_profile_id: String,
    pub medication_name: String,
    pub dosage: Option<String>,
    pub reminder_time: DateTime<Utc>,
    /// Free-form schedule such as "daily" or "every 8 hours".
    pub recurrence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationDraft {
    pub user_profile_id: String,
    pub medication_name: String,
    pub dosage: Option<String>,
    pub reminder_time: DateTime<Utc>,
    pub recurrence: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medication_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
}

impl MedicationPatch {
    pub fn is_empty(&self) -> bool {
        self.medication_name.is_none()
            && self.dosage.is_none()
            && self.reminder_time.is_none()
            && self.recurrence.is_none()
    }
}

impl StoredRecord for MedicationReminder {
    const KIND: EntityKind = EntityKind::Medication;
    type Draft = MedicationDraft;
    type Patch = MedicationPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn user_profile_id(&self) -> &str {
        &self.user_profile_id
    }

    fn label(&self) -> Option<&str> {
        Some(&self.medication_name)
    }

    fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        Some(self.reminder_time)
    }

    fn from_draft(id: String, draft: MedicationDraft) -> Self {
        Self {
            id,
            user_profile_id: draft.user_profile_id,
            medication_name: draft.medication_name,
            dosage: draft.dosage,
            reminder_time: draft.reminder_time,
            recurrence: draft.recurrence,
        }
    }

    fn apply_patch(&mut self, patch: MedicationPatch) {
        if let Some(name) = patch.medication_name {
            self.medication_name = name;
        }
        if patch.dosage.is_some() {
            self.dosage = patch.dosage;
        }
        if let Some(time) = patch.reminder_time {
            self.reminder_time = time;
        }
        if patch.recurrence.is_some() {
            self.recurrence = patch.recurrence;
        }
    }

    fn summary(&self) -> String {
        let mut line = format!("id={} \"{}\"", self.id, self.medication_name);
        if let Some(ref dosage) = self.dosage {
            line.push_str(&format!(" {dosage}"));
        }
        line.push_str(&format!(" at {}", to_canonical(&self.reminder_time)));
        if let Some(ref recurrence) = self.recurrence {
            line.push_str(&format!(" ({recurrence})"));
        }
        line
    }
}
