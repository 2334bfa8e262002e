//! # Arrival Board Core Library
//!
//! This library provides the data model and engine for a transit arrival
//! display: a small long-lived process that periodically fetches upcoming
//! vehicle arrival predictions for one configured stop and renders them to
//! whatever display hardware the host actually has.
//!
//! ## Design Philosophy
//!
//! ### One model, many displays
//! Every render backend (console, desktop window, physical RGB matrix) is
//! handed the same [`ArrivalSet`]. Countdown values are *derived* from the
//! scheduled times at render time, never stored, so a set that sits on
//! screen through a failed refresh still counts down correctly.
//!
//! ### Degrade, don't crash
//! A transit feed is the least reliable part of this system. Fetch failures
//! keep the previous set on screen (marked stale), malformed records are
//! dropped individually, and a dying display backend falls through to the
//! next candidate in a fixed chain that ends at the always-available
//! console.
//!
//! ### Data Flow
//! 1. **Fetch**: [`fetch::FetchPort`] returns raw provider records
//! 2. **Normalize**: [`normalize::build_set`] parses timestamps into a fresh
//!    [`ArrivalSet`], sorted and capped
//! 3. **Render**: the active [`render::RenderBackend`] draws the set
//! 4. **Wait**: the scheduler sleeps for the refresh interval, then repeats
//!
//! ## Core Types
//!
//! - [`ArrivalRecord`]: one predicted vehicle arrival (route + time)
//! - [`ArrivalSet`]: the arrivals from a single fetch cycle, ordered soonest
//!   first

use chrono::{DateTime, Local};

// Module declarations
pub mod config;
pub mod console;
pub mod fetch;
#[cfg(all(feature = "matrix", target_os = "linux"))]
pub mod matrix;
pub mod normalize;
pub mod render;
pub mod scheduler;
pub mod selector;
pub mod window;

/// Arrivals at or under this many minutes out are considered imminent and
/// get visual emphasis on every backend.
pub const IMMINENT_MINUTES: u32 = 5;

/// A single predicted vehicle arrival at the configured stop.
///
/// The record stores the absolute predicted time; the countdown shown on
/// screen is recomputed from it on every render pass.
///
/// # Example
/// ```
/// use arrival_board::ArrivalRecord;
/// use chrono::{Duration, Local};
///
/// let now = Local::now();
/// let record = ArrivalRecord {
///     route_label: "B48".to_string(),
///     scheduled_time: now + Duration::minutes(5),
/// };
///
/// assert_eq!(record.countdown_minutes(now), 5);
/// assert!(record.is_imminent(now));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrivalRecord {
    /// Short human-readable route identifier (e.g. "B48", "G")
    pub route_label: String,
    /// Predicted arrival instant, already converted to the display timezone
    pub scheduled_time: DateTime<Local>,
}

impl ArrivalRecord {
    /// Whole minutes until the scheduled arrival, clamped at zero.
    ///
    /// Feeds routinely report arrivals a few seconds in the past; those are
    /// shown as due now rather than dropped, so negative deltas clamp to 0.
    pub fn countdown_minutes(&self, now: DateTime<Local>) -> u32 {
        (self.scheduled_time - now).num_minutes().max(0) as u32
    }

    /// True when the arrival is [`IMMINENT_MINUTES`] or fewer minutes out.
    pub fn is_imminent(&self, now: DateTime<Local>) -> bool {
        self.countdown_minutes(now) <= IMMINENT_MINUTES
    }
}

/// The arrivals produced by one fetch cycle, ordered soonest first.
///
/// A fresh set replaces the previous one wholesale after every successful
/// fetch; records from different cycles are never mixed. When a fetch fails
/// the previous set is kept on screen with `stale` flipped on.
///
/// An empty set is the only representation of "no data"; there is no
/// separate sentinel.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrivalSet {
    /// Records sorted ascending by `scheduled_time` (stable source order on
    /// ties), at most `max_arrivals` of them
    pub records: Vec<ArrivalRecord>,
    /// When the underlying fetch completed
    pub fetched_at: DateTime<Local>,
    /// True once a newer fetch has failed, leaving this set on screen
    pub stale: bool,
}

impl ArrivalSet {
    /// Build a set from normalized records: sort ascending by scheduled
    /// time (stable, so the source feed breaks ties) and keep only the
    /// earliest `max_arrivals`.
    pub fn from_records(
        mut records: Vec<ArrivalRecord>,
        max_arrivals: usize,
        fetched_at: DateTime<Local>,
    ) -> Self {
        records.sort_by_key(|r| r.scheduled_time);
        records.truncate(max_arrivals);
        ArrivalSet {
            records,
            fetched_at,
            stale: false,
        }
    }

    /// The empty set shown before the first successful fetch.
    pub fn empty(now: DateTime<Local>) -> Self {
        ArrivalSet {
            records: Vec::new(),
            fetched_at: now,
            stale: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
