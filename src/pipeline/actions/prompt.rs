//! System instruction for the assistant: how to propose an action, plus the
//! user's current records so the model can reference ids directly.

use chrono::{DateTime, Utc};

use super::apply::Snapshots;
use super::dates::to_canonical;
use crate::config::ACTION_MARKER;
use crate::models::StoredRecord;

/// Records listed per kind; older context is rarely referenced by name.
const MAX_LISTED: usize = 25;

fn format_records<R: StoredRecord>(records: &[R]) -> String {
    if records.is_empty() {
        return "None recorded".to_string();
    }
    let mut lines: Vec<String> = records
        .iter()
        .take(MAX_LISTED)
        .map(|r| format!("  - {}", r.summary()))
        .collect();
    if records.len() > MAX_LISTED {
        lines.push(format!("  - ... and {} more", records.len() - MAX_LISTED));
    }
    format!("\n{}", lines.join("\n"))
}

/// Build the system instruction sent with every chat turn.
pub fn build_system_prompt(snapshots: &Snapshots, now: DateTime<Utc>) -> String {
    format!(
        "You are SymptomSync, a health assistant that helps the user keep track of \
appointments, medication reminders and symptom logs. Answer conversationally.\n\n\
When the user asks to add, change or remove a record, propose exactly ONE action \
by appending a fenced block tagged `{marker}` to your reply:\n\n\
```{marker}\n\
{{\"entity\": \"appointment|medication|health_log\", \"intent\": \"create|update|delete\", \"data\": {{...}}}}\n\
```\n\n\
RULES:\n\
1. The user confirms every action before it is saved. Never claim it is already done.\n\
2. Fields per entity:\n\
   - appointment: appointment_name, date\n\
   - medication: medication_name, dosage, reminder_time, recurrence\n\
   - health_log: symptom_type, severity (0-10), mood, medication_intake, notes, start_date, end_date\n\
3. create needs appointment_name + date, medication_name + reminder_time, or symptom_type.\n\
4. For update and delete, include the record's \"id\" from the lists below when you know it.\n\
5. Dates: ISO 8601, or phrases like \"tomorrow 5:00 PM\". NOW is {now}.\n\
6. Use null for unknown optional fields. Do not invent values.\n\n\
USER RECORDS:\n\
- Appointments: {appointments}\n\
- Medication reminders: {medications}\n\
- Health logs: {health_logs}",
        marker = ACTION_MARKER,
        now = to_canonical(&now),
        appointments = format_records(snapshots.appointments.records()),
        medications = format_records(snapshots.medications.records()),
        health_logs = format_records(snapshots.health_logs.records()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MedicationReminder;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn prompt_teaches_wire_format() {
        let prompt = build_system_prompt(&Snapshots::default(), now());
        assert!(prompt.contains("```symptomsync-action"));
        assert!(prompt.contains("\"intent\": \"create|update|delete\""));
        assert!(prompt.contains("NOW is 2025-01-01T09:00:00.000Z"));
    }

    #[test]
    fn empty_snapshots_say_none() {
        let prompt = build_system_prompt(&Snapshots::default(), now());
        assert!(prompt.contains("- Appointments: None recorded"));
    }

    #[test]
    fn records_are_listed_with_ids() {
        let mut snapshots = Snapshots::default();
        snapshots.medications.replace(vec![MedicationReminder {
            id: "m1".into(),
            user_profile_id: "u1".into(),
            medication_name: "Aspirin".into(),
            dosage: Some("100mg".into()),
            reminder_time: Utc.with_ymd_and_hms(2025, 1, 5, 8, 30, 0).unwrap(),
            recurrence: Some("daily".into()),
        }]);
        let prompt = build_system_prompt(&snapshots, now());
        assert!(prompt.contains("id=m1 \"Aspirin\""));
    }

    #[test]
    fn long_listings_are_truncated() {
        let mut snapshots = Snapshots::default();
        let records = (0..30)
            .map(|i| MedicationReminder {
                id: format!("m{i}"),
                user_profile_id: "u1".into(),
                medication_name: format!("Med {i}"),
                dosage: None,
                reminder_time: now(),
                recurrence: None,
            })
            .collect();
        snapshots.medications.replace(records);
        let prompt = build_system_prompt(&snapshots, now());
        assert!(prompt.contains("... and 5 more"));
        assert!(!prompt.contains("id=m29"));
    }
}
