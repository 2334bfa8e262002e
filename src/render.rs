//! # Render Backend Contract
//!
//! Everything the scheduler needs to know about putting an [`ArrivalSet`]
//! on a screen, without knowing which screen. The three concrete backends
//! (console, window, matrix) implement [`RenderBackend`] and are wrapped in
//! the closed [`ActiveBackend`] sum type so the fallback chain can be
//! matched exhaustively.
//!
//! Shared text formatting lives here too, so all three backends agree on
//! what "5 min" and "due" look like.

use crate::{ArrivalRecord, ArrivalSet};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of display backends, in no particular order.
///
/// Config/env values use the tokens `matrix`, `pygame` (alias `window`) and
/// `console`; `pygame` is kept for compatibility with the windowed
/// backend's historical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Matrix,
    #[serde(rename = "pygame", alias = "window")]
    Window,
    Console,
}

impl BackendKind {
    /// The fixed fallback order tried when no override is configured:
    /// best hardware first, console as the guaranteed last resort.
    pub const DEFAULT_ORDER: [BackendKind; 3] =
        [BackendKind::Matrix, BackendKind::Window, BackendKind::Console];
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Matrix => "matrix",
            BackendKind::Window => "window",
            BackendKind::Console => "console",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for BackendKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "matrix" => Ok(BackendKind::Matrix),
            "pygame" | "window" => Ok(BackendKind::Window),
            "console" => Ok(BackendKind::Console),
            _ => Err(()),
        }
    }
}

/// Why a backend candidate could not be brought up. Never fatal on its own;
/// the selector falls through to the next candidate.
#[derive(Error, Debug)]
pub enum BackendInitError {
    /// Support for this backend was not compiled into the binary
    #[error("{0} backend support not compiled into this binary")]
    NotCompiled(BackendKind),

    /// No display surface to open a window on
    #[error("no display surface available (headless host)")]
    Headless,

    /// Matrix font file missing or unreadable
    #[error("matrix font {path}: {reason}")]
    Font { path: PathBuf, reason: String },

    /// Matrix driver (GPIO) refused to initialize
    #[error("matrix driver: {0}")]
    Driver(String),

    /// Every candidate in the chain failed. Console always succeeds, so
    /// reaching this means the chain was misconfigured.
    #[error("every display backend failed to initialize")]
    Exhausted,
}

/// A draw call that went wrong.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The console's output stream is gone. Fatal: there is nothing left
    /// to report through.
    #[error("output stream closed: {0}")]
    OutputClosed(#[from] std::io::Error),

    /// The window's drawing surface was lost (e.g. closed by the user).
    /// Recoverable by falling back to the next backend.
    #[error("display surface lost: {0}")]
    SurfaceLost(String),

    /// The matrix hardware stopped responding. Recoverable by fallback.
    #[error("matrix driver: {0}")]
    Driver(String),
}

impl RenderError {
    /// Fatal errors stop the process; everything else re-runs backend
    /// selection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RenderError::OutputClosed(_))
    }
}

/// Contract shared by all display backends.
///
/// `draw` receives the full set plus the render instant so countdowns are
/// computed fresh on every call; backends hold no arrival state of their
/// own (the matrix view cursor is the one deliberate exception).
pub trait RenderBackend {
    /// Render the set. Must be deterministic for a given (set, now) pair.
    fn draw(
        &mut self,
        set: &ArrivalSet,
        stop_name: &str,
        now: DateTime<Local>,
    ) -> Result<(), RenderError>;

    /// Release any exclusive window/hardware resource. Idempotent; called
    /// before another backend takes over the device and again at exit.
    fn shutdown(&mut self);
}

/// The one live backend instance, owned by the scheduler.
///
/// A closed enum rather than a boxed trait object: the candidate set is
/// fixed, and fallback handling wants exhaustive matches.
pub enum ActiveBackend {
    Console(crate::console::ConsoleBackend),
    #[cfg(feature = "window")]
    Window(crate::window::WindowBackend),
    #[cfg(all(feature = "matrix", target_os = "linux"))]
    Matrix(crate::matrix::MatrixBackend),
    #[cfg(test)]
    Probe(probe::ProbeBackend),
}

impl ActiveBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            ActiveBackend::Console(_) => BackendKind::Console,
            #[cfg(feature = "window")]
            ActiveBackend::Window(_) => BackendKind::Window,
            #[cfg(all(feature = "matrix", target_os = "linux"))]
            ActiveBackend::Matrix(_) => BackendKind::Matrix,
            #[cfg(test)]
            ActiveBackend::Probe(probe) => probe.kind,
        }
    }

    pub fn draw(
        &mut self,
        set: &ArrivalSet,
        stop_name: &str,
        now: DateTime<Local>,
    ) -> Result<(), RenderError> {
        match self {
            ActiveBackend::Console(b) => b.draw(set, stop_name, now),
            #[cfg(feature = "window")]
            ActiveBackend::Window(b) => b.draw(set, stop_name, now),
            #[cfg(all(feature = "matrix", target_os = "linux"))]
            ActiveBackend::Matrix(b) => b.draw(set, stop_name, now),
            #[cfg(test)]
            ActiveBackend::Probe(b) => b.draw(set, stop_name, now),
        }
    }

    pub fn shutdown(&mut self) {
        match self {
            ActiveBackend::Console(b) => b.shutdown(),
            #[cfg(feature = "window")]
            ActiveBackend::Window(b) => b.shutdown(),
            #[cfg(all(feature = "matrix", target_os = "linux"))]
            ActiveBackend::Matrix(b) => b.shutdown(),
            #[cfg(test)]
            ActiveBackend::Probe(b) => b.shutdown(),
        }
    }
}

// -- Shared formatting --

/// Countdown text: "due" at zero, "N min" otherwise.
pub fn format_countdown(minutes: u32) -> String {
    if minutes == 0 {
        "due".to_string()
    } else {
        format!("{} min", minutes)
    }
}

/// Local wall-clock time for an arrival, e.g. "08:36 PM".
pub fn format_clock(at: DateTime<Local>) -> String {
    at.format("%I:%M %p").to_string()
}

/// Truncate to at most `max_chars` characters (not bytes), for the narrow
/// matrix rows.
pub fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Rotating window over the arrival list for displays that fit fewer rows
/// than the set holds.
///
/// Owned by the backend instance that needs it; advanced once per
/// successful draw so each refresh cycle shows the next slice,
/// wrapping around in set order.
#[derive(Debug, Clone)]
pub struct ViewCycle {
    visible: usize,
    offset: usize,
}

impl ViewCycle {
    pub fn new(visible: usize) -> Self {
        ViewCycle {
            visible: visible.max(1),
            offset: 0,
        }
    }

    /// Indices into a list of `len` records to show right now.
    pub fn indices(&self, len: usize) -> Vec<usize> {
        if len <= self.visible {
            (0..len).collect()
        } else {
            (0..self.visible).map(|i| (self.offset + i) % len).collect()
        }
    }

    /// Step the window forward one record. No-op while everything fits.
    pub fn advance(&mut self, len: usize) {
        if len > self.visible {
            self.offset = (self.offset + 1) % len;
        } else {
            self.offset = 0;
        }
    }
}

/// One arrival as a single text line: route, wall-clock time, countdown.
pub fn record_line(record: &ArrivalRecord, now: DateTime<Local>) -> String {
    format!(
        "{}  {}  {}",
        record.route_label,
        format_clock(record.scheduled_time),
        format_countdown(record.countdown_minutes(now))
    )
}

#[cfg(test)]
pub(crate) mod probe {
    //! Scripted backend for scheduler tests: records every draw and can be
    //! told to fail, without touching any real output device.

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct ProbeHandle {
        pub draws: Arc<Mutex<Vec<String>>>,
        pub fail_draws: Arc<AtomicBool>,
        pub shutdowns: Arc<Mutex<usize>>,
    }

    pub struct ProbeBackend {
        pub kind: BackendKind,
        pub handle: ProbeHandle,
    }

    impl ProbeBackend {
        pub fn new(kind: BackendKind) -> (Self, ProbeHandle) {
            let handle = ProbeHandle::default();
            (
                ProbeBackend {
                    kind,
                    handle: handle.clone(),
                },
                handle,
            )
        }
    }

    impl RenderBackend for ProbeBackend {
        fn draw(
            &mut self,
            set: &ArrivalSet,
            stop_name: &str,
            now: DateTime<Local>,
        ) -> Result<(), RenderError> {
            if self.handle.fail_draws.load(Ordering::SeqCst) {
                return Err(RenderError::Driver("probe told to fail".to_string()));
            }
            let lines: Vec<String> = set.records.iter().map(|r| record_line(r, now)).collect();
            self.handle.draws.lock().unwrap().push(format!(
                "{}|stale={}|{}",
                stop_name,
                set.stale,
                lines.join(";")
            ));
            Ok(())
        }

        fn shutdown(&mut self) {
            *self.handle.shutdowns.lock().unwrap() += 1;
        }
    }
}
