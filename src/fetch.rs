//! # Arrival Feed Fetching
//!
//! The engine only ever asks one question of the outside world: "what are
//! the upcoming arrivals for this stop?" [`FetchPort`] is that question as
//! a trait; [`HttpFetcher`] answers it over HTTP for feeds that speak the
//! normalized record shape. Provider-specific wire formats (SIRI, GTFS-RT,
//! JSON:API envelopes) belong in whatever sits behind the configured URL,
//! not here.

use crate::config::ProviderConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single fetch attempt. All transient: the scheduler logs
/// them, keeps the previous arrivals on screen, and retries next cycle.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport or decode failure from the HTTP client
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// The scheduler-level bound on the whole fetch elapsed
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Shutdown was requested while the fetch was in flight
    #[error("fetch cancelled")]
    Cancelled,
}

/// One raw arrival record as the feed reports it.
///
/// `arrival_time` stays a string here on purpose: providers disagree on
/// timestamp shape (RFC 3339, naive, epoch seconds) and normalization is
/// the [`crate::normalize`] module's job, including deciding which records
/// to drop.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RawArrival {
    /// Short route identifier
    pub route: String,
    /// Predicted arrival timestamp in the provider's format
    pub arrival_time: String,
}

/// The "get current arrivals" operation the engine consumes.
///
/// Implementations must be self-contained per call; the scheduler wraps
/// every call in its own timeout, so a slow implementation delays nothing
/// but itself.
pub trait FetchPort {
    fn fetch(
        &self,
        stop_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<RawArrival>, FetchError>> + Send;
}

/// HTTP implementation of [`FetchPort`].
///
/// GETs the configured URL template with `STOP_ID` substituted and decodes
/// a JSON array of [`RawArrival`]. The client carries its own timeout so a
/// stuck connection cannot outlive the scheduler's patience by much.
pub struct HttpFetcher {
    client: reqwest::Client,
    arrivals_url: String,
}

impl HttpFetcher {
    pub fn new(provider: &ProviderConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(provider.timeout_seconds))
            .build()?;
        Ok(HttpFetcher {
            client,
            arrivals_url: provider.arrivals_url.clone(),
        })
    }
}

impl FetchPort for HttpFetcher {
    async fn fetch(&self, stop_id: &str) -> Result<Vec<RawArrival>, FetchError> {
        let url = self.arrivals_url.replace("STOP_ID", stop_id);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let records = response.json::<Vec<RawArrival>>().await?;
        Ok(records)
    }
}
