//! Date/time resolution for scheduling fields.
//!
//! Turns what the assistant (or the user) wrote into a canonical UTC instant.
//! Required scheduling fields are never approximated: anything that cannot be
//! pinned to a date *and* a time of day resolves to `None`, and the caller
//! treats the field as missing.

use std::sync::LazyLock;

use chrono::{
    DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat,
    TimeZone, Utc,
};
use regex::Regex;

/// Relative day keywords: (keyword, day offset, evening bias).
/// `tmrw` is listed before `tmr` so the longer form wins.
const RELATIVE_KEYWORDS: &[(&str, i64, bool)] = &[
    ("today", 0, false),
    ("tonight", 0, true),
    ("tomorrow", 1, false),
    ("tmrw", 1, false),
    ("tmr", 1, false),
    ("yesterday", -1, false),
];

/// Zoned formats tried after RFC 3339.
const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Naive date-time formats, interpreted in the resolver's local zone.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%B %d, %Y %I:%M %p",
    "%B %d, %Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%B %d %Y %I:%M %p",
    "%B %d %Y %H:%M",
];

static TIME_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})(?::(\d{2}))?(?::(\d{2}))?\s*(a\.?m\.?|p\.?m\.?)?$").unwrap()
});

/// Canonical wire form of an instant: UTC, millisecond precision, `Z` suffix.
pub fn to_canonical(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ═══════════════════════════════════════════
// Clock
// ═══════════════════════════════════════════

/// Source of "now" for relative date resolution.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in the host's local zone.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Clock pinned to one instant. Used by tests and replay tooling.
pub struct FixedClock(pub DateTime<FixedOffset>);

impl FixedClock {
    pub fn utc(instant: DateTime<Utc>) -> Self {
        Self(instant.fixed_offset())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

// ═══════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════

/// Resolves free-form date/time strings relative to a fixed "now".
///
/// Naive inputs (no offset) are read in the zone of `now`.
#[derive(Debug, Clone)]
pub struct DateTimeResolver<Tz: TimeZone> {
    now: DateTime<Tz>,
}

impl DateTimeResolver<FixedOffset> {
    pub fn from_clock(clock: &dyn Clock) -> Self {
        Self::at(clock.now())
    }
}

impl<Tz: TimeZone> DateTimeResolver<Tz> {
    pub fn at(now: DateTime<Tz>) -> Self {
        Self { now }
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.now.with_timezone(&Utc)
    }

    /// Resolve an optional input. Absent or blank input yields `None`.
    pub fn resolve(&self, input: Option<&str>) -> Option<DateTime<Utc>> {
        input.and_then(|s| self.resolve_str(s))
    }

    /// Same as [`resolve`](Self::resolve) but returns the canonical string.
    pub fn resolve_canonical(&self, input: Option<&str>) -> Option<String> {
        self.resolve(input).map(|dt| to_canonical(&dt))
    }

    pub fn resolve_str(&self, input: &str) -> Option<DateTime<Utc>> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_lowercase();

        if let Some((remainder, offset_days, evening)) = split_relative(&lower) {
            // A bare "tomorrow" is not enough to schedule anything.
            let fragment = clean_fragment(remainder);
            if fragment.is_empty() {
                return None;
            }
            let date = self
                .today()
                .checked_add_signed(Duration::days(offset_days))?;
            let time = parse_time_fragment(fragment, evening)?;
            return self.localize(date.and_time(time));
        }

        if let Some(instant) = self.parse_absolute(trimmed) {
            return Some(instant);
        }

        let time = parse_time_fragment(clean_fragment(&lower), false)?;
        self.localize(self.today().and_time(time))
    }

    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.now
            .timezone()
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn parse_absolute(&self, input: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
            return Some(dt.with_timezone(&Utc));
        }
        for format in ZONED_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(input, format) {
                return Some(dt.with_timezone(&Utc));
            }
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
                return self.localize(naive);
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            return self.localize(date.and_hms_opt(0, 0, 0)?);
        }
        None
    }
}

/// Split a lower-cased input into (remainder, day offset, evening bias)
/// when it starts with a relative keyword followed by a word boundary.
fn split_relative(lower: &str) -> Option<(&str, i64, bool)> {
    RELATIVE_KEYWORDS
        .iter()
        .find_map(|&(keyword, offset, evening)| {
            let rest = lower.strip_prefix(keyword)?;
            match rest.chars().next() {
                Some(c) if c.is_alphabetic() => None,
                _ => Some((rest, offset, evening)),
            }
        })
}

/// Strip separators and a leading "at" around a time fragment.
fn clean_fragment(fragment: &str) -> &str {
    let trimmed = fragment
        .trim()
        .trim_start_matches([',', '@', '-', ' '])
        .trim_end_matches(['.', '!', ','])
        .trim();
    trimmed
        .strip_prefix("at ")
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Parse a lower-cased time-of-day fragment such as `5:00 pm`, `17:00` or `noon`.
fn parse_time_fragment(fragment: &str, evening: bool) -> Option<NaiveTime> {
    match fragment {
        "noon" | "midday" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return NaiveTime::from_hms_opt(0, 0, 0),
        _ => {}
    }

    let caps = TIME_FRAGMENT.captures(fragment)?;
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let second: u32 = caps.get(3).map_or(Ok(0), |m| m.as_str().parse()).ok()?;

    match caps.get(4).map(|m| m.as_str()) {
        Some(meridiem) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            hour %= 12;
            if meridiem.starts_with('p') {
                hour += 12;
            }
        }
        None if evening && (1..12).contains(&hour) => hour += 12,
        None => {}
    }

    NaiveTime::from_hms_opt(hour, minute, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> DateTimeResolver<Utc> {
        DateTimeResolver::at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn tomorrow_with_time_resolves_to_next_day() {
        let r = resolver();
        assert_eq!(
            r.resolve_str("tomorrow, 5:00 PM"),
            Some(utc(2025, 1, 2, 17, 0))
        );
    }

    #[test]
    fn bare_relative_word_is_insufficient() {
        let r = resolver();
        assert_eq!(r.resolve_str("tomorrow"), None);
        assert_eq!(r.resolve_str("Today "), None);
        assert_eq!(r.resolve_str("yesterday,"), None);
    }

    #[test]
    fn iso_instant_is_unchanged() {
        let r = resolver();
        let resolved = r.resolve_str("2025-03-10T08:00:00Z").unwrap();
        assert_eq!(resolved, utc(2025, 3, 10, 8, 0));
        assert_eq!(to_canonical(&resolved), "2025-03-10T08:00:00.000Z");
    }

    #[test]
    fn offset_instant_is_normalized_to_utc() {
        let r = resolver();
        assert_eq!(
            r.resolve_str("2025-03-10T10:00:00+02:00"),
            Some(utc(2025, 3, 10, 8, 0))
        );
        assert_eq!(
            r.resolve_canonical(Some("2025-01-05T08:30:00.000Z")).as_deref(),
            Some("2025-01-05T08:30:00.000Z")
        );
    }

    #[test]
    fn empty_and_absent_inputs() {
        let r = resolver();
        assert_eq!(r.resolve(None), None);
        assert_eq!(r.resolve(Some("   ")), None);
    }

    #[test]
    fn relative_keywords_offset_days() {
        let r = resolver();
        assert_eq!(r.resolve_str("today 3pm"), Some(utc(2025, 1, 1, 15, 0)));
        assert_eq!(r.resolve_str("yesterday at 08:15"), Some(utc(2024, 12, 31, 8, 15)));
        assert_eq!(r.resolve_str("tmr 9am"), Some(utc(2025, 1, 2, 9, 0)));
        assert_eq!(r.resolve_str("tmrw @ noon"), Some(utc(2025, 1, 2, 12, 0)));
    }

    #[test]
    fn tonight_reads_small_hours_as_evening() {
        let r = resolver();
        assert_eq!(r.resolve_str("tonight at 9"), Some(utc(2025, 1, 1, 21, 0)));
        assert_eq!(r.resolve_str("tonight 11:30 pm"), Some(utc(2025, 1, 1, 23, 30)));
    }

    #[test]
    fn keyword_must_end_at_word_boundary() {
        let r = resolver();
        // "todays" is not the keyword "today"; nothing else parses either.
        assert_eq!(r.resolve_str("todays 3pm"), None);
    }

    #[test]
    fn bare_time_uses_today() {
        let r = resolver();
        assert_eq!(r.resolve_str("5:30 PM"), Some(utc(2025, 1, 1, 17, 30)));
        assert_eq!(r.resolve_str("at 07:45"), Some(utc(2025, 1, 1, 7, 45)));
    }

    #[test]
    fn naive_absolute_formats() {
        let r = resolver();
        assert_eq!(r.resolve_str("2025-02-03 14:00"), Some(utc(2025, 2, 3, 14, 0)));
        assert_eq!(r.resolve_str("2025-02-03T14:00"), Some(utc(2025, 2, 3, 14, 0)));
        assert_eq!(
            r.resolve_str("February 3, 2025 2:00 PM"),
            Some(utc(2025, 2, 3, 14, 0))
        );
        assert_eq!(r.resolve_str("2025-02-03"), Some(utc(2025, 2, 3, 0, 0)));
    }

    #[test]
    fn naive_inputs_use_resolver_zone() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = tokyo.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let r = DateTimeResolver::at(now);
        assert_eq!(r.resolve_str("tomorrow 9am"), Some(utc(2025, 1, 2, 0, 0)));
    }

    #[test]
    fn rejects_impossible_times() {
        let r = resolver();
        assert_eq!(r.resolve_str("25:00"), None);
        assert_eq!(r.resolve_str("13pm"), None);
        assert_eq!(r.resolve_str("today at lunch"), None);
        assert_eq!(r.resolve_str("sometime soon"), None);
    }

    #[test]
    fn fixed_clock_drives_resolver() {
        let clock = FixedClock::utc(utc(2025, 6, 1, 12, 0));
        let r = DateTimeResolver::from_clock(&clock);
        assert_eq!(r.now_utc(), utc(2025, 6, 1, 12, 0));
        assert_eq!(r.resolve_str("tomorrow 8am"), Some(utc(2025, 6, 2, 8, 0)));
    }
}
