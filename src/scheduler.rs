//! # Refresh Scheduler
//!
//! The control loop that keeps the board current: fetch, normalize,
//! render, wait, repeat. Phases are strictly sequential, so no shared
//! state needs locking; the only concurrency concern is staying
//! responsive to cancellation, which is checked at every suspension point
//! (the fetch and the inter-cycle wait) through a [`CancellationToken`].
//!
//! Failure handling per phase:
//! - fetch timeout/transport error: keep the previous arrivals on screen,
//!   flagged stale, and retry next cycle
//! - render failure: mark the backend failed, shut it down, and re-run
//!   backend selection immediately; a fatal failure (console output gone)
//!   ends the process instead
//! - cancellation: interrupts a wait or an in-flight fetch promptly; a
//!   render that already started completes first so the hardware is never
//!   left mid-draw

use crate::config::Config;
use crate::fetch::{FetchError, FetchPort, RawArrival};
use crate::normalize;
use crate::render::ActiveBackend;
use crate::selector::BackendSelector;
use crate::ArrivalSet;
use chrono::Local;
use log::{debug, info, warn};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct RefreshScheduler<F: FetchPort> {
    stop_id: String,
    stop_name: String,
    max_arrivals: usize,
    refresh_interval: Duration,
    fetch_timeout: Duration,
    fetcher: F,
    selector: BackendSelector,
    backend: ActiveBackend,
    current: Option<ArrivalSet>,
    cancel: CancellationToken,
}

impl<F: FetchPort> RefreshScheduler<F> {
    pub fn new(
        config: &Config,
        fetcher: F,
        backend: ActiveBackend,
        selector: BackendSelector,
        cancel: CancellationToken,
    ) -> Self {
        RefreshScheduler {
            stop_id: config.stop_id.clone(),
            stop_name: config.stop_name.clone(),
            max_arrivals: config.max_arrivals,
            refresh_interval: Duration::from_secs(config.refresh_interval_seconds),
            fetch_timeout: Duration::from_secs(config.provider.timeout_seconds),
            fetcher,
            selector,
            backend,
            current: None,
            cancel,
        }
    }

    /// Run until cancelled or until a failure nothing can recover from.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(
            "refreshing stop {} every {:?}",
            self.stop_id, self.refresh_interval
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // Release the display on the fatal path too; shutdown is
            // idempotent, so a backend already shut down during fallback
            // is fine to hit again.
            if let Err(err) = self.tick().await {
                self.backend.shutdown();
                return Err(err);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.refresh_interval) => {}
            }
        }

        info!("stopping");
        self.backend.shutdown();
        Ok(())
    }

    /// One full fetch → normalize → render cycle, without the wait.
    /// Public so tests can drive the state machine directly.
    pub async fn tick(&mut self) -> anyhow::Result<()> {
        let now = Local::now();

        match self.fetch_bounded().await {
            Ok(raw) => {
                debug!("fetched {} raw arrivals", raw.len());
                self.current = Some(normalize::build_set(raw, now, self.max_arrivals));
            }
            Err(FetchError::Cancelled) => return Ok(()),
            Err(err) => {
                warn!("arrival fetch failed: {}", err);
                if let Some(set) = self.current.as_mut() {
                    set.stale = true;
                }
            }
        }

        // A cancel that landed during the fetch stops us before, not
        // during, the draw.
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let set = match &self.current {
            Some(set) => set.clone(),
            None => ArrivalSet::empty(now),
        };
        self.render(&set)
    }

    /// Fetch with the configured bound, racing cancellation.
    async fn fetch_bounded(&self) -> Result<Vec<RawArrival>, FetchError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            result = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(&self.stop_id)) => {
                result.map_err(|_| FetchError::Timeout(self.fetch_timeout))?
            }
        }
    }

    /// Draw the set, falling down the backend chain on recoverable
    /// failures.
    fn render(&mut self, set: &ArrivalSet) -> anyhow::Result<()> {
        let now = Local::now();
        loop {
            match self.backend.draw(set, &self.stop_name, now) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_fatal() => {
                    return Err(anyhow::Error::new(err).context("display output unusable"));
                }
                Err(err) => {
                    let kind = self.backend.kind();
                    warn!("{} backend failed to draw: {}", kind, err);
                    self.selector.mark_failed(kind);
                    self.backend.shutdown();
                    self.backend = self
                        .selector
                        .next()
                        .map_err(|e| anyhow::Error::new(e).context("no usable display left"))?;
                }
            }
        }
    }

    /// The backend currently holding the display.
    pub fn backend(&self) -> &ActiveBackend {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplayConfig;
    use crate::render::probe::{ProbeBackend, ProbeHandle};
    use crate::render::BackendKind;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted fetcher: succeeds with a fixed feed, or fails while the
    /// flag is up. Counts attempts so retry behavior is observable.
    #[derive(Clone, Default)]
    struct StubFetcher {
        fail: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
        minutes_out: Vec<i64>,
    }

    impl FetchPort for StubFetcher {
        async fn fetch(&self, _stop_id: &str) -> Result<Vec<RawArrival>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::Timeout(Duration::from_secs(1)));
            }
            let now = Local::now();
            Ok(self
                .minutes_out
                .iter()
                .enumerate()
                .map(|(i, m)| RawArrival {
                    route: format!("R{}", i),
                    arrival_time: (now + ChronoDuration::minutes(*m)).to_rfc3339(),
                })
                .collect())
        }
    }

    fn scheduler_with(
        fetcher: StubFetcher,
        probe_kind: BackendKind,
    ) -> (RefreshScheduler<StubFetcher>, ProbeHandle) {
        let (probe, handle) = ProbeBackend::new(probe_kind);
        let config = Config::default();
        let scheduler = RefreshScheduler::new(
            &config,
            fetcher,
            ActiveBackend::Probe(probe),
            BackendSelector::new(DisplayConfig::default()),
            CancellationToken::new(),
        );
        (scheduler, handle)
    }

    #[tokio::test]
    async fn successful_cycle_renders_a_fresh_set() {
        let fetcher = StubFetcher {
            minutes_out: vec![18, 5],
            ..StubFetcher::default()
        };
        let (mut scheduler, handle) = scheduler_with(fetcher, BackendKind::Console);

        scheduler.tick().await.unwrap();

        let draws = handle.draws.lock().unwrap();
        assert_eq!(draws.len(), 1);
        // Sorted soonest-first: the 5-minute arrival leads
        assert!(draws[0].contains("stale=false"));
        let r1 = draws[0].find("R1").unwrap();
        let r0 = draws[0].find("R0").unwrap();
        assert!(r1 < r0, "soonest arrival should render first: {}", draws[0]);
    }

    #[tokio::test]
    async fn fetch_failure_keeps_previous_set_marked_stale_and_retries() {
        let fetcher = StubFetcher {
            minutes_out: vec![9],
            ..StubFetcher::default()
        };
        let (mut scheduler, handle) = scheduler_with(fetcher.clone(), BackendKind::Console);

        // Cycle N-1 succeeds
        scheduler.tick().await.unwrap();
        // Cycle N fails
        fetcher.fail.store(true, Ordering::SeqCst);
        scheduler.tick().await.unwrap();
        // Cycle N+1 retries and succeeds again
        fetcher.fail.store(false, Ordering::SeqCst);
        scheduler.tick().await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);

        let draws = handle.draws.lock().unwrap();
        assert_eq!(draws.len(), 3);
        assert!(draws[0].contains("stale=false"));
        // The retained set still shows its arrival, now flagged stale
        assert!(draws[1].contains("stale=true"));
        assert!(draws[1].contains("R0"));
        assert!(draws[2].contains("stale=false"));
    }

    #[tokio::test]
    async fn fetch_failure_before_any_success_renders_the_empty_set() {
        let fetcher = StubFetcher {
            fail: Arc::new(AtomicBool::new(true)),
            ..StubFetcher::default()
        };
        let (mut scheduler, handle) = scheduler_with(fetcher, BackendKind::Console);

        scheduler.tick().await.unwrap();

        let draws = handle.draws.lock().unwrap();
        assert_eq!(draws.len(), 1);
        assert!(draws[0].ends_with("stale=false|"));
    }

    #[tokio::test]
    async fn render_failure_falls_back_without_retrying_the_dead_backend() {
        let fetcher = StubFetcher {
            minutes_out: vec![3],
            ..StubFetcher::default()
        };
        let (mut scheduler, handle) = scheduler_with(fetcher, BackendKind::Matrix);

        handle.fail_draws.store(true, Ordering::SeqCst);
        scheduler.tick().await.unwrap();

        // The probe (posing as the matrix) was shut down and replaced by
        // the console, the chain's last resort
        assert_eq!(*handle.shutdowns.lock().unwrap(), 1);
        assert_eq!(scheduler.backend().kind(), BackendKind::Console);

        // Later cycles go straight to the replacement
        scheduler.tick().await.unwrap();
        assert_eq!(*handle.shutdowns.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn exhausted_fallback_still_releases_the_backend() {
        let fetcher = StubFetcher {
            minutes_out: vec![2],
            ..StubFetcher::default()
        };
        let (probe, handle) = ProbeBackend::new(BackendKind::Matrix);
        handle.fail_draws.store(true, Ordering::SeqCst);

        // With console pre-failed and no hardware compiled in, the first
        // draw failure exhausts the chain
        let mut selector = BackendSelector::new(DisplayConfig::default());
        selector.mark_failed(BackendKind::Console);

        let scheduler = RefreshScheduler::new(
            &Config::default(),
            fetcher,
            ActiveBackend::Probe(probe),
            selector,
            CancellationToken::new(),
        );

        assert!(scheduler.run().await.is_err());
        // Once when fallback replaced it, once more on the error exit
        assert_eq!(*handle.shutdowns.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_wait_promptly() {
        let fetcher = StubFetcher {
            minutes_out: vec![3],
            ..StubFetcher::default()
        };
        let (probe, _handle) = ProbeBackend::new(BackendKind::Console);
        let config = Config::default(); // 60s refresh interval
        let cancel = CancellationToken::new();
        let scheduler = RefreshScheduler::new(
            &config,
            fetcher,
            ActiveBackend::Probe(probe),
            BackendSelector::new(DisplayConfig::default()),
            cancel.clone(),
        );

        let task = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let joined = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("run should stop well before the 60s refresh interval");
        joined.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancellation_before_the_loop_starts_is_immediate() {
        let fetcher = StubFetcher::default();
        let (probe, handle) = ProbeBackend::new(BackendKind::Console);
        let config = Config::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let scheduler = RefreshScheduler::new(
            &config,
            fetcher,
            ActiveBackend::Probe(probe),
            BackendSelector::new(DisplayConfig::default()),
            cancel,
        );

        scheduler.run().await.unwrap();
        assert!(handle.draws.lock().unwrap().is_empty());
        // Shutdown still runs so the display is released
        assert_eq!(*handle.shutdowns.lock().unwrap(), 1);
    }
}
