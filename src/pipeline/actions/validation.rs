//! Required-field matrix per entity and intent.
//!
//! Turns a loose `ActionPayload` into a `ValidatedAction`. Nothing here
//! touches a store: update/delete targets come out as `TargetRef`s and are
//! resolved by the applier, so a payload with a missing field is rejected
//! before any lookup or write.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use super::dates::DateTimeResolver;
use super::error::ActionError;
use super::resolver::lookup_key;
use super::types::{ActionPayload, EntityAction, TargetRef, ValidatedAction};
use crate::models::{
    AppointmentDraft, AppointmentPatch, EntityKind, HealthLogDraft, HealthLogPatch, Intent,
    MedicationDraft, MedicationPatch, MAX_SEVERITY,
};

/// Validate `payload` for `user_id`. Relative dates resolve against `dates`,
/// which also supplies the default `start_date` for new health logs.
pub fn validate<Tz: TimeZone>(
    payload: &ActionPayload,
    user_id: &str,
    dates: &DateTimeResolver<Tz>,
) -> Result<ValidatedAction, ActionError> {
    let fields = Fields {
        entity: payload.entity,
        intent: payload.intent,
        data: &payload.data,
        dates,
    };

    let action = match payload.entity {
        EntityKind::Appointment => ValidatedAction::Appointment(appointment(&fields, user_id)?),
        EntityKind::Medication => ValidatedAction::Medication(medication(&fields, user_id)?),
        EntityKind::HealthLog => ValidatedAction::HealthLog(health_log(&fields, user_id)?),
    };

    tracing::debug!(
        entity = %action.entity(),
        intent = %action.intent(),
        "Action validated"
    );
    Ok(action)
}

// ═══════════════════════════════════════════
// Per-entity rules
// ═══════════════════════════════════════════

fn appointment<Tz: TimeZone>(
    f: &Fields<'_, Tz>,
    user_id: &str,
) -> Result<EntityAction<AppointmentDraft, AppointmentPatch>, ActionError> {
    match f.intent {
        Intent::Create => Ok(EntityAction::Create(AppointmentDraft {
            user_profile_id: user_id.to_string(),
            appointment_name: f.required_text("appointment_name")?,
            date: f.required_date("date")?,
        })),
        Intent::Update => {
            let patch = AppointmentPatch {
                appointment_name: f.text("appointment_name")?,
                date: f.date("date")?,
            };
            if patch.is_empty() {
                return Err(f.nothing_to_update());
            }
            Ok(EntityAction::Update {
                target: f.target()?,
                patch,
            })
        }
        Intent::Delete => Ok(EntityAction::Delete { target: f.target()? }),
    }
}

fn medication<Tz: TimeZone>(
    f: &Fields<'_, Tz>,
    user_id: &str,
) -> Result<EntityAction<MedicationDraft, MedicationPatch>, ActionError> {
    match f.intent {
        Intent::Create => Ok(EntityAction::Create(MedicationDraft {
            user_profile_id: user_id.to_string(),
            medication_name: f.required_text("medication_name")?,
            dosage: f.text("dosage")?,
            reminder_time: f.required_date("reminder_time")?,
            recurrence: f.text("recurrence")?,
        })),
        Intent::Update => {
            let patch = MedicationPatch {
                medication_name: f.text("medication_name")?,
                dosage: f.text("dosage")?,
                reminder_time: f.date("reminder_time")?,
                recurrence: f.text("recurrence")?,
            };
            if patch.is_empty() {
                return Err(f.nothing_to_update());
            }
            Ok(EntityAction::Update {
                target: f.target()?,
                patch,
            })
        }
        Intent::Delete => Ok(EntityAction::Delete { target: f.target()? }),
    }
}

fn health_log<Tz: TimeZone>(
    f: &Fields<'_, Tz>,
    user_id: &str,
) -> Result<EntityAction<HealthLogDraft, HealthLogPatch>, ActionError> {
    match f.intent {
        Intent::Create => {
            let symptom_type = f.required_text("symptom_type")?;
            // The only required field that is ever defaulted.
            let start_date = f
                .present("start_date")
                .and_then(|v| v.as_str())
                .and_then(|raw| f.dates.resolve_str(raw))
                .unwrap_or_else(|| f.dates.now_utc());
            let end_date = f.date("end_date")?;
            if end_date.is_some_and(|end| end < start_date) {
                return Err(f.invalid("end_date", "must not be before `start_date`"));
            }
            Ok(EntityAction::Create(HealthLogDraft {
                user_profile_id: user_id.to_string(),
                symptom_type,
                severity: f.severity()?,
                mood: f.text("mood")?,
                medication_intake: f.text("medication_intake")?,
                notes: f.text("notes")?,
                start_date,
                end_date,
            }))
        }
        Intent::Update => {
            let patch = HealthLogPatch {
                symptom_type: f.text("symptom_type")?,
                severity: f.severity()?,
                mood: f.text("mood")?,
                medication_intake: f.text("medication_intake")?,
                notes: f.text("notes")?,
                start_date: f.date("start_date")?,
                end_date: f.date("end_date")?,
            };
            if let (Some(start), Some(end)) = (patch.start_date, patch.end_date) {
                if end < start {
                    return Err(f.invalid("end_date", "must not be before `start_date`"));
                }
            }
            if patch.is_empty() {
                return Err(f.nothing_to_update());
            }
            Ok(EntityAction::Update {
                target: f.target()?,
                patch,
            })
        }
        Intent::Delete => Ok(EntityAction::Delete { target: f.target()? }),
    }
}

// ═══════════════════════════════════════════
// Field access
// ═══════════════════════════════════════════

struct Fields<'a, Tz: TimeZone> {
    entity: EntityKind,
    intent: Intent,
    data: &'a Map<String, Value>,
    dates: &'a DateTimeResolver<Tz>,
}

impl<Tz: TimeZone> Fields<'_, Tz> {
    /// The value under `field`, treating JSON `null` as absent.
    fn present(&self, field: &str) -> Option<&Value> {
        self.data.get(field).filter(|v| !v.is_null())
    }

    /// Optional text. Blank strings count as absent; numbers are accepted
    /// as their decimal form (`"dosage": 100`).
    fn text(&self, field: &'static str) -> Result<Option<String>, ActionError> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(self.invalid(field, "must be text")),
        }
    }

    fn required_text(&self, field: &'static str) -> Result<String, ActionError> {
        self.text(field)?.ok_or_else(|| self.missing(field))
    }

    /// Optional date; present but unresolvable is an error, never dropped.
    fn date(&self, field: &'static str) -> Result<Option<DateTime<Utc>>, ActionError> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => self
                .dates
                .resolve_str(s)
                .map(Some)
                .ok_or_else(|| self.invalid(field, format!("could not be read as a date: {s:?}"))),
            Some(_) => Err(self.invalid(field, "must be a date string")),
        }
    }

    fn required_date(&self, field: &'static str) -> Result<DateTime<Utc>, ActionError> {
        self.date(field)?.ok_or_else(|| self.missing(field))
    }

    /// Integer severity on the 0–10 scale, from a number or numeric string.
    fn severity(&self) -> Result<Option<u8>, ActionError> {
        const FIELD: &str = "severity";
        let number = match self.present(FIELD) {
            None => return Ok(None),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        let number = number.ok_or_else(|| self.invalid(FIELD, "must be a number"))?;
        if number.fract() != 0.0 || !(0.0..=f64::from(MAX_SEVERITY)).contains(&number) {
            return Err(self.invalid(
                FIELD,
                format!("must be a whole number from 0 to {MAX_SEVERITY}"),
            ));
        }
        Ok(Some(number as u8))
    }

    /// Target for update/delete: a string `id` is trusted as-is, anything
    /// else falls back to a lookup by the kind's label and date fields.
    fn target(&self) -> Result<TargetRef, ActionError> {
        if let Some(id) = self.data.get("id").and_then(Value::as_str) {
            let id = id.trim();
            if !id.is_empty() {
                return Ok(TargetRef::Id(id.to_string()));
            }
        }
        let key = lookup_key(self.entity, self.data, self.dates);
        if key.is_empty() {
            return Err(self.missing("id"));
        }
        Ok(TargetRef::Lookup(key))
    }

    fn missing(&self, field: &'static str) -> ActionError {
        ActionError::MissingField {
            entity: self.entity,
            intent: self.intent,
            field,
        }
    }

    fn invalid(&self, field: &'static str, reason: impl Into<String>) -> ActionError {
        ActionError::InvalidField {
            entity: self.entity,
            intent: self.intent,
            field,
            reason: reason.into(),
        }
    }

    fn nothing_to_update(&self) -> ActionError {
        ActionError::NothingToUpdate {
            entity: self.entity,
        }
    }
}
