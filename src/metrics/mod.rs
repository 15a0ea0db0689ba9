//! PageSpeed Insights client
//!
//! Results are cached by request fingerprint. On a miss the call runs under
//! the shared backoff controller; every attempt picks a credential from the
//! pool, so a quota refusal rotates to the next key without waiting.

mod psi;
mod summary;

pub use psi::{decode, MetricsResult};
pub use summary::{Grade, PerformanceSummary};

use crate::cache::{Fingerprint, ResponseCache};
use crate::config::MetricsConfig;
use crate::credentials::{CredentialId, CredentialPool};
use crate::ratelimit::RateLimiter;
use crate::retry::classify::{classify_status, classify_transport};
use crate::retry::{BackoffController, Classification, RetryError};
use crate::{ConfigError, ProbeError, ProbeResult};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use url::Url;

/// Longest slice of an error body kept in a `Status` error
const ERROR_BODY_EXCERPT: usize = 300;

/// Metrics retrieval failures
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("PSI returned HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        quota: bool,
    },

    #[error("PSI request failed: {message}")]
    Network { message: String, retryable: bool },

    #[error("Undecodable PSI response: {0}")]
    Decode(String),

    #[error("{0}")]
    Credentials(ProbeError),

    #[error("{0}")]
    RateLimited(ProbeError),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<MetricsError>,
    },
}

impl MetricsError {
    pub fn classification(&self) -> Classification {
        match self {
            MetricsError::Status { quota: true, .. } => Classification::QuotaExceeded,
            MetricsError::Status { status, .. } => reqwest::StatusCode::from_u16(*status)
                .map(|s| classify_status(s, None))
                .unwrap_or(Classification::Fatal),
            MetricsError::Network { retryable, .. } => {
                if *retryable {
                    Classification::Retryable
                } else {
                    Classification::Fatal
                }
            }
            MetricsError::Exhausted { .. } => Classification::Retryable,
            MetricsError::Decode(_)
            | MetricsError::Credentials(_)
            | MetricsError::RateLimited(_) => Classification::Fatal,
        }
    }

    /// Whether the failure came from credential quota exhaustion
    pub fn is_quota(&self) -> bool {
        match self {
            MetricsError::Status { quota, .. } => *quota,
            MetricsError::Credentials(_) => true,
            MetricsError::Exhausted { last, .. } => last.is_quota(),
            _ => false,
        }
    }

    fn network(err: reqwest::Error) -> Self {
        let retryable = classify_transport(&err) == Classification::Retryable;
        // The request URL carries the API key
        MetricsError::Network {
            message: err.without_url().to_string(),
            retryable,
        }
    }

    fn from_retry(err: RetryError<MetricsError>) -> Self {
        match err {
            RetryError::Fatal(e) => e,
            RetryError::Exhausted { attempts, last } => MetricsError::Exhausted {
                attempts,
                last: Box::new(last),
            },
        }
    }
}

/// Fetches (and caches) PSI metrics for a page
pub struct MetricsClient {
    client: Client,
    endpoint: Url,
    strategy: String,
    categories: Vec<String>,
    request_timeout: Duration,
    credentials: Arc<CredentialPool>,
    limiter: Arc<RateLimiter>,
    requests: Arc<Semaphore>,
    cache: Arc<ResponseCache<MetricsResult>>,
    backoff: BackoffController,
}

impl MetricsClient {
    /// Creates a client sharing limits, credentials and cache with the rest of the batch
    pub fn new(
        config: &MetricsConfig,
        client: Client,
        credentials: Arc<CredentialPool>,
        limiter: Arc<RateLimiter>,
        requests: Arc<Semaphore>,
        cache: Arc<ResponseCache<MetricsResult>>,
    ) -> ProbeResult<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid metrics endpoint: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint,
            strategy: config.strategy.clone(),
            categories: config.categories.clone(),
            request_timeout: config.request_timeout(),
            credentials,
            limiter,
            requests,
            cache,
            backoff: BackoffController::from_config(&config.retry),
        })
    }

    /// Replaces the retry controller
    pub fn with_backoff(mut self, backoff: BackoffController) -> Self {
        self.backoff = backoff;
        self
    }

    /// Cache key for a target; independent of the credential used
    pub fn fingerprint(&self, target: &str) -> Fingerprint {
        let mut params: Vec<(&str, &str)> = vec![("url", target), ("strategy", &self.strategy)];
        params.extend(self.categories.iter().map(|c| ("category", c.as_str())));
        Fingerprint::of(self.endpoint.as_str(), &params)
    }

    /// Returns metrics for `target`, from cache when fresh
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Quota/billing refusal | Park credential, retry at once with the next |
    /// | HTTP 5xx, 429, timeout | Count failure on credential, back off |
    /// | Other HTTP 4xx | Fail immediately |
    /// | Body not decodable | Fail immediately |
    /// | All credentials parked too long | Fail with `Credentials` |
    pub async fn get_metrics(&self, target: &str) -> Result<MetricsResult, MetricsError> {
        let fingerprint = self.fingerprint(target);
        if let Some(hit) = self.cache.get(&fingerprint) {
            tracing::debug!(url = target, "PSI cache hit");
            return Ok(hit);
        }

        let result = self
            .backoff
            .execute(
                |call| async move {
                    let id = self
                        .credentials
                        .select()
                        .await
                        .map_err(MetricsError::Credentials)?;
                    let outcome = self.call_once(target, id, call).await;
                    self.report(id, &outcome);
                    outcome
                },
                MetricsError::classification,
            )
            .await
            .map_err(MetricsError::from_retry)?;

        self.cache.put(fingerprint, result.clone());
        tracing::info!(url = target, performance = ?result.performance, "PSI metrics obtained");
        Ok(result)
    }

    fn report(&self, id: CredentialId, outcome: &Result<MetricsResult, MetricsError>) {
        match outcome {
            Ok(_) => self.credentials.report_success(id),
            Err(e) => match e.classification() {
                Classification::QuotaExceeded => self.credentials.report_failure(id, true),
                Classification::Retryable => self.credentials.report_failure(id, false),
                Classification::Fatal => {}
            },
        }
    }

    async fn call_once(
        &self,
        target: &str,
        id: CredentialId,
        call: u32,
    ) -> Result<MetricsResult, MetricsError> {
        let credential = self.credentials.get(id).ok_or_else(|| {
            MetricsError::Credentials(ProbeError::CredentialsExhausted {
                waited: Duration::ZERO,
            })
        })?;

        self.limiter
            .acquire_global()
            .await
            .map_err(MetricsError::RateLimited)?;

        let _permit = self
            .requests
            .acquire()
            .await
            .map_err(|_| MetricsError::Network {
                message: "request pool closed".to_string(),
                retryable: false,
            })?;

        tracing::debug!(url = target, credential = credential.name(), call, "Calling PSI");

        let mut query: Vec<(&str, &str)> = vec![
            ("url", target),
            ("key", credential.key()),
            ("strategy", &self.strategy),
        ];
        query.extend(self.categories.iter().map(|c| ("category", c.as_str())));

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&query)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(MetricsError::network)?;

        let status = response.status();
        let body = response.text().await.map_err(MetricsError::network)?;

        if !status.is_success() {
            let quota = classify_status(status, Some(&body)) == Classification::QuotaExceeded;
            return Err(MetricsError::Status {
                status: status.as_u16(),
                message: body.chars().take(ERROR_BODY_EXCERPT).collect(),
                quota,
            });
        }

        decode(&body).map_err(MetricsError::Decode)
    }
}
