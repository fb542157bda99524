// src/checker/http.rs
// =============================================================================
// This module fetches pages over HTTP.
//
// Key functionality:
// - One GET per call, with a fixed timeout (no retries)
// - Sorts the result into a tagged outcome the crawler can act on:
//     Fetched      2xx, body handed over as a stream of chunks
//     Unreachable  any other status code
//     TimedOut     no answer in time
//     Failed       anything else (DNS, connection refused, TLS, ...)
// - The body is NOT downloaded here. The HTML extractor pulls it chunk by
//   chunk so a page never has to sit in memory as a whole.
//
// The `Fetcher` trait is the seam tests use to swap the network out.
// =============================================================================

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use url::Url;

use crate::config::CrawlConfig;
use crate::error::FetchError;

/// The body of a response, as it arrives.
pub type BodyStream = BoxStream<'static, Result<Bytes, FetchError>>;

pub enum FetchOutcome {
    Fetched {
        status: u16,
        /// Where the request ended up after redirects.
        final_url: Url,
        content_type: Option<String>,
        body: BodyStream,
    },
    Unreachable {
        status: u16,
    },
    TimedOut,
    Failed(FetchError),
}

// BodyStream has no Debug, so we spell this one out
impl fmt::Debug for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOutcome::Fetched {
                status,
                final_url,
                content_type,
                ..
            } => f
                .debug_struct("Fetched")
                .field("status", status)
                .field("final_url", &final_url.as_str())
                .field("content_type", content_type)
                .finish_non_exhaustive(),
            FetchOutcome::Unreachable { status } => {
                f.debug_struct("Unreachable").field("status", status).finish()
            }
            FetchOutcome::TimedOut => f.write_str("TimedOut"),
            FetchOutcome::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

/// Retrieves one URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> FetchOutcome;
}

/// The real fetcher, backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        // One client for the whole crawl gives us connection pooling
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &CrawlConfig) -> Result<Self, FetchError> {
        Self::new(config.fetch_timeout, &config.user_agent)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> FetchOutcome {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return FetchOutcome::TimedOut,
            Err(e) => return FetchOutcome::Failed(FetchError::from_reqwest(e)),
        };

        let status = response.status();
        if !status.is_success() {
            return FetchOutcome::Unreachable {
                status: status.as_u16(),
            };
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let final_url = response.url().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(FetchError::from_reqwest))
            .boxed();

        FetchOutcome::Fetched {
            status: status.as_u16(),
            final_url,
            content_type,
            body,
        }
    }
}

/// Whether a response is worth parsing for links.
///
/// A missing Content-Type gets the benefit of the doubt.
pub fn is_html(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let mime = content_type.split(';').next().unwrap_or(content_type).trim();
    mime.eq_ignore_ascii_case("text/html") || mime.eq_ignore_ascii_case("application/xhtml+xml")
}

/// The `charset=` parameter of a Content-Type header, if any.
pub fn charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\''].as_ref()))
    })
}
