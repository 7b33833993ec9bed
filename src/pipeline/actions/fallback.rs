//! Heuristic health-log action derived from the user's own message.
//!
//! Only used when the assistant reply carried no action. The result is always
//! staged for review, never applied directly. Best effort by nature: phrases
//! like "log" or a small number are taken as a hint that the user wants a
//! health log entry.

use std::sync::LazyLock;

use chrono::TimeZone;
use regex::Regex;
use serde_json::{json, Map};

use super::dates::{to_canonical, DateTimeResolver};
use super::types::ActionPayload;
use crate::models::{EntityKind, Intent};

static LOG_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:log|record)\b").unwrap());

static SMALL_INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(10|[1-9])\b").unwrap());

/// Explicit severity phrasing, "7/10" before "severity 7" or "pain: 4".
static SEVERITY_CUES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\b(10|[1-9])\s*/\s*10\b").unwrap(),
        Regex::new(r"(?i)\b(?:severity|pain|level|intensity)\s*(?:of|is|at|:|=)?\s*(10|[1-9])\b")
            .unwrap(),
    ]
});

static DATE_VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:today|tonight|tomorrow|tmrw|tmr|yesterday|noon|midnight|\d{1,2}:\d{2}|\d{1,2}\s*(?:am|pm)|\d{4}-\d{2}-\d{2})\b",
    )
    .unwrap()
});

static LEADING_FILLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:please|pls|can you|could you)\s+)?(?:(?:log|record|note)\b\s*(?:that\s+)?)?(?:(?:i\s+have|i've\s+got|i\s+got|i\s+feel|i'm\s+feeling|i\s+am\s+feeling|feeling|i'm\s+having|i\s+am\s+having|having)\s+)?(?:(?:a|an|my|some)\s+)?",
    )
    .unwrap()
});

/// Derive a `health_log`/`create` action from `message`, or `None` when the
/// message does not look like a log request or names no symptom.
pub fn derive_fallback_action<Tz: TimeZone>(
    message: &str,
    dates: &DateTimeResolver<Tz>,
) -> Option<ActionPayload> {
    let text = message.trim();
    // Questions are conversation, not data entry.
    if text.is_empty() || text.ends_with('?') || !is_triggered(text) {
        return None;
    }

    let mut segments: Vec<String> = text
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return None;
    }

    // Date first, so a "3pm" segment is never mistaken for a severity.
    let mut start_date = None;
    let mut date_index = None;
    for (i, segment) in segments.iter().enumerate().skip(1) {
        if !DATE_VOCABULARY.is_match(segment) {
            continue;
        }
        if let Some(instant) = dates.resolve_str(segment) {
            start_date = Some(instant);
            date_index = Some(i);
            break;
        }
    }

    let severity = take_severity(&mut segments, date_index);

    let symptom_type = clean_symptom(&segments[0])?;

    let notes: Vec<&str> = segments
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(i, s)| Some(*i) != date_index && !s.is_empty())
        .map(|(_, s)| s.as_str())
        .collect();

    let mut data = Map::new();
    data.insert("symptom_type".into(), json!(symptom_type));
    if let Some(severity) = severity {
        data.insert("severity".into(), json!(severity));
    }
    if let Some(instant) = start_date {
        data.insert("start_date".into(), json!(to_canonical(&instant)));
    }
    if !notes.is_empty() {
        data.insert("notes".into(), json!(notes.join(", ")));
    }

    Some(ActionPayload::new(EntityKind::HealthLog, Intent::Create, data))
}

fn is_triggered(text: &str) -> bool {
    LOG_KEYWORD.is_match(text) || SMALL_INTEGER.is_match(text)
}

/// Find a 1–10 severity, preferring explicit cues, and cut the matched text
/// out of its segment. The date segment is never searched.
fn take_severity(segments: &mut [String], date_index: Option<usize>) -> Option<u8> {
    let searchable: Vec<usize> = (0..segments.len())
        .filter(|i| Some(*i) != date_index)
        .collect();

    for cue in SEVERITY_CUES.iter() {
        for &i in &searchable {
            if let Some(value) = cut_match(&mut segments[i], cue) {
                return Some(value);
            }
        }
    }

    // A bare number only counts outside the symptom segment, e.g. "headache, 6".
    for &i in searchable.iter().filter(|&&i| i > 0) {
        if let Some(value) = cut_match(&mut segments[i], &SMALL_INTEGER) {
            return Some(value);
        }
    }
    None
}

/// Remove the first match of `pattern` from `segment`, returning its number.
fn cut_match(segment: &mut String, pattern: &Regex) -> Option<u8> {
    let caps = pattern.captures(segment)?;
    let value: u8 = caps.get(1)?.as_str().parse().ok()?;
    let whole = caps.get(0)?.range();
    segment.replace_range(whole, "");
    *segment = segment.trim().to_string();
    Some(value)
}

fn clean_symptom(segment: &str) -> Option<String> {
    let stripped = LEADING_FILLER.replace(segment.trim(), "");
    let cleaned = stripped
        .trim()
        .trim_end_matches(['.', '!', ';', ':'])
        .trim();
    if !cleaned.chars().any(char::is_alphabetic) {
        return None;
    }
    Some(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn resolver() -> DateTimeResolver<Utc> {
        DateTimeResolver::at(Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap())
    }

    #[test]
    fn headache_message_yields_health_log() {
        let payload =
            derive_fallback_action("I have a headache, severity 7, today 3pm", &resolver()).unwrap();
        assert_eq!(payload.entity, EntityKind::HealthLog);
        assert_eq!(payload.intent, Intent::Create);
        assert_eq!(payload.data["symptom_type"], json!("headache"));
        assert_eq!(payload.data["severity"], json!(7));
        assert_eq!(payload.data["start_date"], json!("2025-01-01T15:00:00.000Z"));
        assert!(payload.data.get("notes").is_none());
    }

    #[test]
    fn log_keyword_triggers_without_number() {
        let payload = derive_fallback_action("Log nausea, after breakfast", &resolver()).unwrap();
        assert_eq!(payload.data["symptom_type"], json!("nausea"));
        assert_eq!(payload.data["notes"], json!("after breakfast"));
        assert!(payload.data.get("severity").is_none());
        assert!(payload.data.get("start_date").is_none());
    }

    #[test]
    fn out_of_ten_and_bare_number_severity() {
        let payload = derive_fallback_action("back pain 6/10, lifting boxes", &resolver()).unwrap();
        assert_eq!(payload.data["symptom_type"], json!("back pain"));
        assert_eq!(payload.data["severity"], json!(6));

        let payload = derive_fallback_action("dizziness, 4", &resolver()).unwrap();
        assert_eq!(payload.data["symptom_type"], json!("dizziness"));
        assert_eq!(payload.data["severity"], json!(4));
        assert!(payload.data.get("notes").is_none());
    }

    #[test]
    fn untriggered_message_yields_none() {
        assert_eq!(derive_fallback_action("Thanks for the help!", &resolver()), None);
        assert_eq!(derive_fallback_action("", &resolver()), None);
    }

    #[test]
    fn questions_are_ignored() {
        assert_eq!(
            derive_fallback_action("Should I log 2 headaches?", &resolver()),
            None
        );
    }

    #[test]
    fn no_symptom_means_no_action() {
        assert_eq!(derive_fallback_action("7, today 3pm", &resolver()), None);
        assert_eq!(derive_fallback_action("log, 5", &resolver()), None);
    }

    #[test]
    fn unresolvable_time_stays_in_notes() {
        let payload =
            derive_fallback_action("record fatigue, since this morning", &resolver()).unwrap();
        assert_eq!(payload.data["symptom_type"], json!("fatigue"));
        assert!(payload.data.get("start_date").is_none());
        assert_eq!(payload.data["notes"], json!("since this morning"));
    }

    #[test]
    fn time_segment_is_not_read_as_severity() {
        let payload = derive_fallback_action("log cramps, 9:30 am", &resolver()).unwrap();
        assert!(payload.data.get("severity").is_none());
        assert_eq!(payload.data["start_date"], json!("2025-01-01T09:30:00.000Z"));
    }
}
