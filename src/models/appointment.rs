use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::EntityKind;
use super::StoredRecord;
use crate::pipeline::actions::dates::to_canonical;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentReminder {
    pub id: String,
    pub user_profile_id: String,
    pub appointment_name: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentDraft {
    pub user_profile_id: String,
    pub appointment_name: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl AppointmentPatch {
    pub fn is_empty(&self) -> bool {
        self.appointment_name.is_none() && self.date.is_none()
    }
}

impl StoredRecord for AppointmentReminder {
    const KIND: EntityKind = EntityKind::Appointment;
    type Draft = AppointmentDraft;
    type Patch = AppointmentPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn user_profile_id(&self) -> &str {
        &self.user_profile_id
    }

    fn label(&self) -> Option<&str> {
        Some(&self.appointment_name)
    }

    fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        Some(self.date)
    }

    fn from_draft(id: String, draft: AppointmentDraft) -> Self {
        Self {
            id,
            user_profile_id: draft.user_profile_id,
            appointment_name: draft.appointment_name,
            date: draft.date,
        }
    }

    fn apply_patch(&mut self, patch: AppointmentPatch) {
        if let Some(name) = patch.appointment_name {
            self.appointment_name = name;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
    }

    fn summary(&self) -> String {
        format!(
            "id={} \"{}\" on {}",
            self.id,
            self.appointment_name,
            to_canonical(&self.date)
        )
    }
}
