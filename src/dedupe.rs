//! Duplicate admission decisions for candidate incident records.
//!
//! Independent channels report the same event with varying detail; keeping
//! every report floods the map with redundant markers, keeping only the
//! first loses better-detailed later reports.  `admit` therefore keeps
//! exactly one survivor per real-world event, chosen by information content.

use chrono::DateTime;

use crate::store::IncidentRecord;

/// Outcome of admitting one candidate against the current store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// New event — append to the store.
    Append,
    /// Same event as `existing[index]`, candidate carries more detail —
    /// replace that record.
    Replace(usize),
    /// Already covered — drop the candidate.
    Discard,
}

/// Decide what to do with `candidate`.
///
/// Primary key: a record with the same `(channel, message_id,
/// incident_type)` already exists — discard unconditionally, so
/// re-ingesting a feed is idempotent.  The per-type component lets one
/// message legitimately yield several records, one per detected type.
///
/// Secondary key: same `(incident_type, location, calendar day)` — the same
/// real-world event reported again.  The candidate replaces the stored
/// record only when strictly richer; ties keep the existing record, so the
/// final survivor is the same whichever order the reports arrive in.
pub fn admit(candidate: &IncidentRecord, existing: &[IncidentRecord]) -> Admission {
    let already_stored = existing.iter().any(|r| {
        r.channel == candidate.channel
            && r.message_id == candidate.message_id
            && r.incident_type == candidate.incident_type
    });
    if already_stored {
        return Admission::Discard;
    }

    let candidate_day = day_key(&candidate.date);
    let same_event = existing.iter().position(|r| {
        r.incident_type == candidate.incident_type
            && r.location == candidate.location
            && day_key(&r.date) == candidate_day
    });

    match same_event {
        Some(index) if richness(candidate) > richness(&existing[index]) => {
            Admission::Replace(index)
        }
        Some(_) => Admission::Discard,
        None => Admission::Append,
    }
}

/// Heuristic information content of a record.
pub fn richness(record: &IncidentRecord) -> usize {
    record.details.numbers_found.len()
        + record.details.casualties.len()
        + record.details.summary.chars().count()
}

/// Date portion of an ISO-8601 timestamp, for calendar-day comparison.
/// Falls back to the first ten characters when the timestamp does not parse
/// as RFC 3339 (older dumps use a space separator).
fn day_key(date: &str) -> String {
    match DateTime::parse_from_rfc3339(date) {
        Ok(dt) => dt.date_naive().to_string(),
        Err(_) => date.chars().take(10).collect(),
    }
}
