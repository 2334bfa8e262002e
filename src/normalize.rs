//! # Timestamp Normalization
//!
//! Raw feed records arrive with timestamps in whatever shape the provider
//! favors. This module turns them into [`ArrivalRecord`]s on the local
//! wall clock, which is the only timezone anything downstream ever sees.
//!
//! Accepted timestamp shapes, tried in order:
//! 1. RFC 3339 with an explicit offset, which is respected
//! 2. Naive `YYYY-MM-DDTHH:MM:SS`, interpreted as UTC per the feed
//!    contract's "UTC if absent" rule
//! 3. Integer epoch seconds
//!
//! A record whose timestamp fits none of these is dropped with a warning;
//! it never invalidates the rest of the set.

use crate::fetch::RawArrival;
use crate::{ArrivalRecord, ArrivalSet};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use log::warn;
use thiserror::Error;

/// A single raw record that could not be normalized.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("unparseable arrival timestamp {0:?}")]
    Timestamp(String),
}

/// Parse a provider timestamp into the local display timezone.
pub fn parse_provider_time(raw: &str) -> Result<DateTime<Local>, NormalizeError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Local));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive).with_timezone(&Local));
    }

    if let Ok(epoch_seconds) = raw.parse::<i64>() {
        if let Some(dt) = Utc.timestamp_opt(epoch_seconds, 0).single() {
            return Ok(dt.with_timezone(&Local));
        }
    }

    Err(NormalizeError::Timestamp(raw.to_string()))
}

/// Build a fresh [`ArrivalSet`] from one fetch cycle's raw records.
///
/// Malformed records are dropped (logged) rather than failing the cycle;
/// arrivals already in the past are kept and will render as due. The
/// result is sorted soonest-first and capped at `max_arrivals`.
pub fn build_set(raw: Vec<RawArrival>, now: DateTime<Local>, max_arrivals: usize) -> ArrivalSet {
    let mut records = Vec::with_capacity(raw.len().min(max_arrivals));
    for entry in raw {
        match parse_provider_time(&entry.arrival_time) {
            Ok(scheduled_time) => records.push(ArrivalRecord {
                route_label: entry.route,
                scheduled_time,
            }),
            Err(err) => {
                warn!("dropping arrival for route {}: {}", entry.route, err);
            }
        }
    }
    ArrivalSet::from_records(records, max_arrivals, now)
}
