//! Submission cutoff derived from a round's match list.

use crate::types::Match;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

/// Picks close this long before the first match that is on
pub const DEADLINE_LEAD_MINUTES: i64 = 10;

/// Resolve a match's `date` (YYYY-MM-DD) and `time` (HH:MM) in the contest's offset
pub fn start_instant(date: &str, time: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .ok()?;

    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Earliest start among matches that are on, minus the lead time
pub fn deadline(matches: &[Match]) -> Option<DateTime<Utc>> {
    matches
        .iter()
        .filter(|m| !m.off)
        .filter_map(|m| m.starts_at)
        .min()
        .map(|first| first - Duration::minutes(DEADLINE_LEAD_MINUTES))
}

/// Whether the cutoff has been reached at `now`.
///
/// A match without a usable start time keeps the round open.
pub fn deadline_passed(matches: &[Match], now: DateTime<Utc>) -> bool {
    if matches.is_empty() || matches.iter().any(|m| m.starts_at.is_none()) {
        return false;
    }
    deadline(matches).is_some_and(|cutoff| now >= cutoff)
}
