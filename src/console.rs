//! # Console Backend
//!
//! Plain-text rendering for terminals, headless hosts, and systemd
//! journals. This is the guaranteed last resort of the fallback chain: it
//! needs nothing but a writable output stream, and losing that stream is
//! the one render failure the process cannot recover from.

use crate::render::{format_clock, format_countdown, RenderBackend, RenderError};
use crate::ArrivalSet;
use chrono::{DateTime, Local};
use std::io::{self, Write};

/// Marker appended to arrival lines at or under the imminence threshold.
/// A plain character so it survives dumb terminals and log files.
const IMMINENT_MARKER: &str = " *";

// Sync as well as Send: the scheduler future holds the backend across
// await points and must itself stay spawnable.
pub struct ConsoleBackend {
    out: Box<dyn Write + Send + Sync>,
}

impl ConsoleBackend {
    /// Backend writing to stdout. Never fails to construct; failures show
    /// up on the first draw if the stream is closed.
    pub fn new() -> Self {
        ConsoleBackend {
            out: Box::new(io::stdout()),
        }
    }

    /// Backend writing somewhere else, for tests and captures.
    pub fn with_writer(out: Box<dyn Write + Send + Sync>) -> Self {
        ConsoleBackend { out }
    }
}

impl Default for ConsoleBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for ConsoleBackend {
    fn draw(
        &mut self,
        set: &ArrivalSet,
        stop_name: &str,
        now: DateTime<Local>,
    ) -> Result<(), RenderError> {
        let staleness = if set.stale { " (stale data)" } else { "" };

        writeln!(self.out, "== {} ==", stop_name)?;
        writeln!(
            self.out,
            "updated {}{}",
            format_clock(set.fetched_at),
            staleness
        )?;

        if set.is_empty() {
            writeln!(self.out, "  no arrivals reported")?;
        } else {
            for record in &set.records {
                let marker = if record.is_imminent(now) {
                    IMMINENT_MARKER
                } else {
                    ""
                };
                writeln!(
                    self.out,
                    "  {:<6} {}  {:>7}{}",
                    record.route_label,
                    format_clock(record.scheduled_time),
                    format_countdown(record.countdown_minutes(now)),
                    marker
                )?;
            }
        }

        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }

    fn shutdown(&mut self) {
        // Nothing exclusive to release; a final flush is best-effort.
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArrivalRecord;
    use chrono::Duration;
    use std::sync::{Arc, Mutex};

    /// Writer that keeps its buffer reachable after the backend takes
    /// ownership of the box.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
        fn clear(&self) {
            self.0.lock().unwrap().clear();
        }
    }

    fn sample_set(now: DateTime<Local>) -> ArrivalSet {
        ArrivalSet::from_records(
            vec![
                ArrivalRecord {
                    route_label: "B48".to_string(),
                    scheduled_time: now + Duration::minutes(5),
                },
                ArrivalRecord {
                    route_label: "B62".to_string(),
                    scheduled_time: now + Duration::minutes(18),
                },
            ],
            10,
            now,
        )
    }

    #[test]
    fn renders_header_rows_and_imminence_marker() {
        let buf = SharedBuf::default();
        let mut backend = ConsoleBackend::with_writer(Box::new(buf.clone()));
        let now = Local::now();

        backend
            .draw(&sample_set(now), "Nassau Av / Manhattan Av", now)
            .unwrap();

        let output = buf.contents();
        assert!(output.contains("== Nassau Av / Manhattan Av =="));
        assert!(output.contains("B48"));
        assert!(output.contains("5 min *"));
        assert!(output.contains("18 min"));
        // Only the imminent row gets the marker
        assert_eq!(output.matches(" *").count(), 1);
    }

    #[test]
    fn rendering_is_idempotent_for_a_fixed_now() {
        let buf = SharedBuf::default();
        let mut backend = ConsoleBackend::with_writer(Box::new(buf.clone()));
        let now = Local::now();
        let set = sample_set(now);

        backend.draw(&set, "Stop", now).unwrap();
        let first = buf.contents();
        buf.clear();
        backend.draw(&set, "Stop", now).unwrap();

        assert_eq!(first, buf.contents());
    }

    #[test]
    fn stale_set_is_annotated() {
        let buf = SharedBuf::default();
        let mut backend = ConsoleBackend::with_writer(Box::new(buf.clone()));
        let now = Local::now();
        let mut set = sample_set(now);
        set.stale = true;

        backend.draw(&set, "Stop", now).unwrap();
        assert!(buf.contents().contains("(stale data)"));
    }

    #[test]
    fn empty_set_reports_no_arrivals() {
        let buf = SharedBuf::default();
        let mut backend = ConsoleBackend::with_writer(Box::new(buf.clone()));
        let now = Local::now();

        backend.draw(&ArrivalSet::empty(now), "Stop", now).unwrap();
        assert!(buf.contents().contains("no arrivals reported"));
    }

    #[test]
    fn backend_moves_between_threads() {
        // The scheduler holds the backend across await points inside a
        // spawned task, so the type must be both Send and Sync.
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConsoleBackend>();
    }

    #[test]
    fn closed_stream_is_a_fatal_render_error() {
        struct ClosedStream;
        impl Write for ClosedStream {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
        }

        let mut backend = ConsoleBackend::with_writer(Box::new(ClosedStream));
        let now = Local::now();
        let err = backend.draw(&ArrivalSet::empty(now), "Stop", now).unwrap_err();
        assert!(err.is_fatal());
    }
}
