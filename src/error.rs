// src/error.rs
// =============================================================================
// Error types for the crawler library.
//
// Only seed problems (and a bad configuration) ever stop a crawl. Everything
// that goes wrong on an individual page is recorded as data on the graph
// instead, so a site with thousands of dead links still finishes.
//
// We use `thiserror` here because callers may want to match on the variants;
// the binary wraps these in `anyhow` like the rest of main.rs does.
// =============================================================================

use thiserror::Error;

/// Why a crawl could not start.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid seed URL '{url}': {source}")]
    InvalidSeed {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("seed URL has no host: {0}")]
    SeedWithoutHost(String),

    #[error("timeout while fetching seed URL {0}")]
    SeedTimedOut(String),

    #[error("error fetching seed URL {url}: {source}")]
    SeedUnreachable {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("unexpected status code {status} for seed URL {url}")]
    SeedStatus { url: String, status: u16 },

    #[error("invalid crawl configuration: {0}")]
    InvalidConfig(String),
}

/// A network failure while fetching a single page.
///
/// Timeouts usually surface as `FetchOutcome::TimedOut` instead; the
/// `Timeout` variant is for a body that stalls after the headers arrived.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not build HTTP client: {0}")]
    Client(String),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("error reading response body: {0}")]
    Body(String),
}

impl FetchError {
    // reqwest reports every failure as one error type; sort it into ours
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else if error.is_body() || error.is_decode() {
            FetchError::Body(error.to_string())
        } else {
            FetchError::Network(error.to_string())
        }
    }
}
