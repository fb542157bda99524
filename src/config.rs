// src/config.rs
// =============================================================================
// Crawl configuration.
//
// The CLI fills this in from its flags; library users build it directly or
// start from `CrawlConfig::default()` and change what they need.
// =============================================================================

use std::time::Duration;

use crate::error::CrawlError;

/// Number of workers fetching pages in parallel.
pub const DEFAULT_WORKERS: usize = 20;

/// How long a single request may take, headers and body included.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Distinct addresses admitted into a crawl unless configured otherwise.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Size of the worker pool.
    pub workers: usize,
    /// Request timeout applied to every fetch.
    pub fetch_timeout: Duration,
    /// How many distinct addresses may enter the crawl.
    pub admission: Admission,
    /// Which hosts count as "internal".
    pub scope: ScopePolicy,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            admission: Admission::Capped(DEFAULT_MAX_PAGES),
            scope: ScopePolicy::default(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl CrawlConfig {
    /// Rejects settings the crawler cannot run with.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.workers == 0 {
            return Err(CrawlError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(CrawlError::InvalidConfig(
                "fetch timeout must be greater than zero".to_string(),
            ));
        }
        if let Admission::Capped(0) = self.admission {
            return Err(CrawlError::InvalidConfig(
                "page cap must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Backpressure policy for the work queue.
///
/// The queue itself never blocks a producer, so the only limit on memory is
/// how many distinct addresses we agree to visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Follow every internal link, however many there are.
    Unbounded,
    /// Stop admitting new addresses once this many have been claimed.
    Capped(usize),
}

impl Admission {
    pub fn limit(self) -> Option<usize> {
        match self {
            Admission::Unbounded => None,
            Admission::Capped(max) => Some(max),
        }
    }
}

/// Decides whether a resolved link stays on the crawled site.
///
/// The default is an exact (case-insensitive) host match that ignores the
/// scheme and the port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopePolicy {
    /// Treat `docs.example.com` as internal when crawling `example.com`.
    pub include_subdomains: bool,
    /// Require the same effective port as the seed.
    pub match_port: bool,
}
