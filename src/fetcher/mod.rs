//! Polite page fetcher
//!
//! This module handles all page requests, including:
//! - robots.txt checks (cached per origin)
//! - global and per-host rate limiting
//! - the shared in-flight request cap
//! - connect/read timeouts and a transfer byte cap
//! - retry with backoff for transient failures

mod client;

pub use client::{build_http_client, MAX_REDIRECTS};

use crate::config::{Config, FetchConfig};
use crate::ratelimit::RateLimiter;
use crate::retry::classify::{classify_status, classify_transport};
use crate::retry::{BackoffController, Classification, RetryError};
use crate::robots::{robots_url, RobotsCache, RobotsRules, ROBOTS_FALLBACK_MAX_AGE_MINUTES};
use crate::url::host_key;
use crate::{ProbeError, ProbeResult};
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use url::Url;

/// A fetched page, possibly truncated at the byte cap
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Requested URL
    pub url: String,

    /// URL after redirects
    pub final_url: String,

    pub status: u16,

    /// Response headers, lowercase names
    pub headers: BTreeMap<String, String>,

    pub body: Vec<u8>,

    /// Whether the transfer was cut at the byte cap
    pub truncated: bool,

    pub elapsed: Duration,
}

impl FetchedPage {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Page fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Disallowed by robots.txt: {url}")]
    Disallowed { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Network error for {url}: {message}")]
    Network {
        url: String,
        message: String,
        retryable: bool,
    },

    #[error("{0}")]
    RateLimited(ProbeError),

    #[error("Gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    fn network(url: &Url, err: &reqwest::Error) -> Self {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
            retryable: classify_transport(err) == Classification::Retryable,
        }
    }

    fn timeout(url: &Url, what: &str, after: Duration) -> Self {
        FetchError::Network {
            url: url.to_string(),
            message: format!("{} timed out after {:?}", what, after),
            retryable: true,
        }
    }

    /// A definitive client error (404, 410, 403...) rather than a transient failure
    fn is_missing_resource(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => (400..500).contains(status),
            _ => false,
        }
    }

    /// Retry classification; page bodies are never inspected for quota markers
    pub fn classification(&self) -> Classification {
        match self {
            FetchError::Status { status, .. } => StatusCode::from_u16(*status)
                .map(|s| classify_status(s, None))
                .unwrap_or(Classification::Fatal),
            FetchError::Network { retryable, .. } => {
                if *retryable {
                    Classification::Retryable
                } else {
                    Classification::Fatal
                }
            }
            FetchError::Exhausted { .. } => Classification::Retryable,
            FetchError::Disallowed { .. }
            | FetchError::RateLimited(_)
            | FetchError::InvalidUrl(_) => Classification::Fatal,
        }
    }

    fn from_retry(url: &Url, err: RetryError<FetchError>) -> Self {
        match err {
            RetryError::Fatal(e) => e,
            RetryError::Exhausted { attempts, last } => FetchError::Exhausted {
                url: url.to_string(),
                attempts,
                last: Box::new(last),
            },
        }
    }
}

/// Fetches pages under the shared politeness limits
pub struct PageFetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    requests: Arc<Semaphore>,
    backoff: BackoffController,
    robots: RobotsCache,
    agent: String,
    respect_robots: bool,
    max_bytes: usize,
    send_timeout: Duration,
    read_timeout: Duration,
}

impl PageFetcher {
    /// Creates a fetcher sharing `limiter` and `requests` with other components
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client built with [`build_http_client`]
    /// * `limiter` - Global and per-host token buckets
    /// * `requests` - Shared in-flight request permits
    /// * `config` - Fetch limits and retry policy
    /// * `agent` - Product token used for robots.txt matching
    pub fn new(
        client: Client,
        limiter: Arc<RateLimiter>,
        requests: Arc<Semaphore>,
        config: &FetchConfig,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            client,
            limiter,
            requests,
            backoff: BackoffController::from_config(&config.retry),
            robots: RobotsCache::new(),
            agent: agent.into(),
            respect_robots: config.respect_robots,
            max_bytes: config.max_bytes,
            send_timeout: config.connect_timeout() + config.read_timeout(),
            read_timeout: config.read_timeout(),
        }
    }

    pub fn from_config(
        config: &Config,
        client: Client,
        limiter: Arc<RateLimiter>,
        requests: Arc<Semaphore>,
    ) -> ProbeResult<Self> {
        Ok(Self::new(
            client,
            limiter,
            requests,
            &config.fetch,
            config.user_agent.crawler_name.clone(),
        ))
    }

    /// Replaces the retry controller
    pub fn with_backoff(mut self, backoff: BackoffController) -> Self {
        self.backoff = backoff;
        self
    }

    /// Fetches a page
    ///
    /// # Fetch Flow
    ///
    /// 1. Check robots.txt for the origin (fetched once, cached 24h)
    /// 2. Per attempt: take a global + host token, then a request permit
    /// 3. Send with timeouts and stream the body up to the byte cap
    /// 4. Retry per the backoff policy
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Disallowed by robots.txt | `Disallowed`, never retried |
    /// | HTTP 5xx, 429, 408, 413 | Retry with backoff |
    /// | Other HTTP 4xx | `Status`, immediately |
    /// | Timeout, connect failure | Retry with backoff |
    /// | Rate limiter ceiling hit | `RateLimited`, immediately |
    ///
    /// # Returns
    ///
    /// The page, or the terminal error (`Exhausted` when retries ran out)
    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let host = host_key(url).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;
        let host = host.as_str();

        if self.respect_robots {
            let rules = self.robots_for(url, host).await;
            if !rules.is_allowed(url.as_str(), &self.agent) {
                tracing::info!(url = %url, "Skipping URL disallowed by robots.txt");
                return Err(FetchError::Disallowed {
                    url: url.to_string(),
                });
            }
        }

        self.backoff
            .execute(|_| self.fetch_once(url, host), FetchError::classification)
            .await
            .map_err(|e| FetchError::from_retry(url, e))
    }

    /// Number of origins whose robots.txt is cached
    pub fn robots_cached(&self) -> usize {
        self.robots.len()
    }

    async fn robots_for(&self, url: &Url, host: &str) -> Arc<RobotsRules> {
        if let Some(rules) = self.robots.get(url) {
            return rules;
        }

        let Some(location) = robots_url(url) else {
            return self.robots.insert(url, RobotsRules::allow_all());
        };

        let fetched = self
            .backoff
            .execute(|_| self.fetch_once(&location, host), FetchError::classification)
            .await
            .map_err(|e| FetchError::from_retry(&location, e));

        match fetched {
            Ok(page) => self.robots.insert(url, RobotsRules::from_body(page.text())),
            Err(e) if e.is_missing_resource() => {
                tracing::debug!(url = %location, "No robots.txt, allowing all: {}", e);
                self.robots.insert(url, RobotsRules::allow_all())
            }
            Err(e) => {
                tracing::warn!(url = %location, "robots.txt unavailable, allowing all for now: {}", e);
                self.robots.insert_for(
                    url,
                    RobotsRules::allow_all(),
                    chrono::Duration::minutes(ROBOTS_FALLBACK_MAX_AGE_MINUTES),
                )
            }
        }
    }

    /// A single attempt, including its rate-limit token and request permit
    async fn fetch_once(&self, url: &Url, host: &str) -> Result<FetchedPage, FetchError> {
        self.limiter
            .acquire(host)
            .await
            .map_err(FetchError::RateLimited)?;

        let _permit = self
            .requests
            .acquire()
            .await
            .map_err(|_| FetchError::Network {
                url: url.to_string(),
                message: "request pool closed".to_string(),
                retryable: false,
            })?;

        tracing::debug!(url = %url, "Fetching");
        let started = Instant::now();

        let mut response =
            tokio::time::timeout(self.send_timeout, self.client.get(url.clone()).send())
                .await
                .map_err(|_| FetchError::timeout(url, "response headers", self.send_timeout))?
                .map_err(|e| FetchError::network(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "Non-success status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let mut body = Vec::new();
        let mut truncated = false;
        loop {
            let chunk = tokio::time::timeout(self.read_timeout, response.chunk())
                .await
                .map_err(|_| FetchError::timeout(url, "body read", self.read_timeout))?
                .map_err(|e| FetchError::network(url, &e))?;

            let Some(chunk) = chunk else {
                break;
            };

            let room = self.max_bytes.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        if truncated {
            tracing::debug!(url = %url, limit = self.max_bytes, "Body truncated at byte cap");
        }

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            headers,
            body,
            truncated,
            elapsed: started.elapsed(),
        })
    }
}
