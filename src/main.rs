//! # Arrival Board Application Entry Point
//!
//! Wires the pieces together and runs the refresh loop until interrupted:
//! load configuration, pick a display backend through the fallback chain,
//! then hand control to the scheduler. Ctrl-C requests a cooperative stop
//! so the active backend gets a clean shutdown before exit.

use anyhow::Context;
use arrival_board::config::Config;
use arrival_board::fetch::HttpFetcher;
use arrival_board::scheduler::RefreshScheduler;
use arrival_board::selector::BackendSelector;
use log::{info, warn};
use std::env;
use tokio_util::sync::CancellationToken;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Optional config path as the first argument; otherwise the default
    // file in the working directory (which may not exist).
    let config = match env::args().nth(1) {
        Some(path) => Config::load_from_path(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => Config::load().context("loading configuration")?,
    };

    info!(
        "arrival board for {} (stop {}), refreshing every {}s",
        config.stop_name, config.stop_id, config.refresh_interval_seconds
    );

    let fetcher = HttpFetcher::new(&config.provider).context("building HTTP client")?;

    let mut selector = BackendSelector::new(config.display.clone());
    let backend = selector
        .next()
        .context("no display backend could be initialized")?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let cancel = CancellationToken::new();

        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                signal_cancel.cancel();
            } else {
                warn!("unable to listen for interrupts; stop with SIGKILL if needed");
            }
        });

        RefreshScheduler::new(&config, fetcher, backend, selector, cancel)
            .run()
            .await
    })
}
