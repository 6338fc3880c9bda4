// src/ingest/mod.rs
//! Feed fetching: a bare request first, then a browser-disguised retry.
//!
//! Many feeds reject library user agents. The bare attempt keeps latency low
//! for well-behaved feeds; anything that does not yield at least one entry
//! falls through to the disguised request. The fallback is unconditional on
//! the stage-one entry count, not on the kind of stage-one failure.

pub mod parse;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};

use crate::ingest::parse::parse_feed;
use crate::ingest::types::FeedDocument;
use crate::net::http_client;

/// Per-request timeout for both stages.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("could not build HTTP client (check the proxy address)")]
    Client(#[source] reqwest::Error),
    #[error("feed request failed")]
    Http(#[from] reqwest::Error),
    #[error("feed responded with HTTP {0}")]
    Status(StatusCode),
    #[error("feed could not be parsed")]
    Parse(#[from] quick_xml::DeError),
}

/// Retrieves and parses one feed.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str, proxy: Option<&str>) -> Result<FeedDocument, FetchError>;
}

/// Production fetcher over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    timeout: Duration,
}

impl Default for HttpFeedFetcher {
    fn default() -> Self {
        Self {
            timeout: FETCH_TIMEOUT,
        }
    }
}

impl HttpFeedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bare_attempt(client: &Client, url: &str) -> Result<FeedDocument, FetchError> {
        let resp = client.get(url).send().await?.error_for_status()?;
        let body = resp.bytes().await?;
        parse_feed(&body)
    }

    async fn disguised_attempt(client: &Client, url: &str) -> Result<FeedDocument, FetchError> {
        let resp = client.get(url).headers(browser_headers()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = resp.bytes().await?;
        parse_feed(&body)
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str, proxy: Option<&str>) -> Result<FeedDocument, FetchError> {
        let client = http_client(proxy, self.timeout).map_err(FetchError::Client)?;

        match Self::bare_attempt(&client, url).await {
            Ok(doc) if !doc.is_empty() => return Ok(doc),
            Ok(_) => {
                tracing::debug!(target: "ingest", url, "bare fetch yielded no entries");
            }
            Err(e) => {
                tracing::debug!(target: "ingest", url, error = %e, "bare fetch failed");
            }
        }
        counter!("feed_fetch_fallback_total").increment(1);

        Self::disguised_attempt(&client, url).await.inspect_err(|e| {
            tracing::warn!(target: "ingest", url, error = %e, "feed fetch failed");
            counter!("feed_fetch_errors_total").increment(1);
        })
    }
}

/// Header set of a desktop browser navigating to the feed.
pub fn browser_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    h.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    h.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    h
}
