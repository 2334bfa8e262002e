//! # Backend Selection and Fallback
//!
//! Chooses which display backend actually runs: the configured override
//! first if there is one, then the fixed default chain of matrix, window,
//! console. Candidates are tried in order at startup and again whenever
//! the active backend dies mid-run; a candidate that has failed once is
//! never retried within the same process run.

use crate::config::DisplayConfig;
use crate::console::ConsoleBackend;
use crate::render::{ActiveBackend, BackendInitError, BackendKind};
use log::{info, warn};

pub struct BackendSelector {
    // Only the matrix backend consumes per-backend config today
    #[cfg_attr(not(all(feature = "matrix", target_os = "linux")), allow(dead_code))]
    display: DisplayConfig,
    preference: Vec<BackendKind>,
    failed: Vec<BackendKind>,
}

impl BackendSelector {
    /// Build the preference list: the explicit override (config or env,
    /// already merged into `display.backend`) leads, followed by the rest
    /// of the default order so a dead override still degrades instead of
    /// exiting.
    pub fn new(display: DisplayConfig) -> Self {
        let mut preference = Vec::with_capacity(BackendKind::DEFAULT_ORDER.len());
        if let Some(kind) = display.backend {
            preference.push(kind);
        }
        for kind in BackendKind::DEFAULT_ORDER {
            if !preference.contains(&kind) {
                preference.push(kind);
            }
        }

        BackendSelector {
            display,
            preference,
            failed: Vec::new(),
        }
    }

    /// Remember a backend that failed at runtime so it is skipped by every
    /// later selection.
    pub fn mark_failed(&mut self, kind: BackendKind) {
        if !self.failed.contains(&kind) {
            self.failed.push(kind);
        }
    }

    /// Candidates not yet failed, in preference order. Mostly useful for
    /// asserting selection behavior.
    pub fn remaining(&self) -> Vec<BackendKind> {
        self.preference
            .iter()
            .copied()
            .filter(|kind| !self.failed.contains(kind))
            .collect()
    }

    /// Initialize the next usable backend, skipping and remembering every
    /// candidate that fails along the way.
    pub fn next(&mut self) -> Result<ActiveBackend, BackendInitError> {
        for kind in self.preference.clone() {
            if self.failed.contains(&kind) {
                continue;
            }
            match self.try_init(kind) {
                Ok(backend) => {
                    info!("using {} display backend", kind);
                    return Ok(backend);
                }
                Err(err) => {
                    warn!("skipping {} display backend: {}", kind, err);
                    self.mark_failed(kind);
                }
            }
        }
        Err(BackendInitError::Exhausted)
    }

    fn try_init(&self, kind: BackendKind) -> Result<ActiveBackend, BackendInitError> {
        match kind {
            BackendKind::Console => Ok(ActiveBackend::Console(ConsoleBackend::new())),

            #[cfg(feature = "window")]
            BackendKind::Window => {
                crate::window::WindowBackend::new().map(ActiveBackend::Window)
            }
            #[cfg(not(feature = "window"))]
            BackendKind::Window => Err(BackendInitError::NotCompiled(kind)),

            #[cfg(all(feature = "matrix", target_os = "linux"))]
            BackendKind::Matrix => {
                crate::matrix::MatrixBackend::new(&self.display.matrix).map(ActiveBackend::Matrix)
            }
            #[cfg(not(all(feature = "matrix", target_os = "linux")))]
            BackendKind::Matrix => Err(BackendInitError::NotCompiled(kind)),
        }
    }
}
