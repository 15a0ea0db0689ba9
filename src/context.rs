//! Shared resources for one batch run
//!
//! Everything that must be shared across domain pipelines lives here and is
//! handed to each pipeline as an `Arc<ProbeContext>`.

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::credentials::CredentialPool;
use crate::fetcher::{build_http_client, PageFetcher};
use crate::metrics::{MetricsClient, MetricsResult};
use crate::ratelimit::RateLimiter;
use crate::ProbeResult;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Rate limiter, credentials, cache and clients shared by all pipelines
pub struct ProbeContext {
    pub config: Arc<Config>,
    pub limiter: Arc<RateLimiter>,
    pub credentials: Arc<CredentialPool>,
    pub cache: Arc<ResponseCache<MetricsResult>>,

    /// In-flight network call permits, shared by page and metrics requests
    pub requests: Arc<Semaphore>,

    pub fetcher: PageFetcher,
    pub metrics: MetricsClient,
}

impl ProbeContext {
    /// Builds every shared component and restores the response cache
    ///
    /// # Returns
    ///
    /// * `Ok(ProbeContext)` - Ready to run a batch
    /// * `Err(ProbeError)` - Structural misconfiguration (no usable credential,
    ///   bad endpoint) or HTTP client initialization failure
    pub fn new(config: Config) -> ProbeResult<Self> {
        let config = Arc::new(config);

        let limiter = Arc::new(RateLimiter::from_config(&config.fetch));
        let credentials = Arc::new(CredentialPool::from_config(&config)?);
        let requests = Arc::new(Semaphore::new(
            config.fetch.max_concurrent_requests as usize,
        ));

        let cache = Arc::new(ResponseCache::from_config(&config.cache));
        cache.load_from_store();

        let client = build_http_client(&config.user_agent, &config.fetch)?;

        let fetcher =
            PageFetcher::from_config(&config, client.clone(), limiter.clone(), requests.clone())?;
        let metrics = MetricsClient::new(
            &config.metrics,
            client,
            credentials.clone(),
            limiter.clone(),
            requests.clone(),
            cache.clone(),
        )?;

        tracing::debug!(
            credentials = credentials.len(),
            cached = cache.len(),
            "Probe context ready"
        );

        Ok(Self {
            config,
            limiter,
            credentials,
            cache,
            requests,
            fetcher,
            metrics,
        })
    }

    /// Persists the response cache; failures are logged, never raised
    ///
    /// # Returns
    ///
    /// The number of entries written (0 when the store failed or none is configured)
    pub fn save_cache(&self) -> usize {
        match self.cache.save_to_store() {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!("Failed to save response cache: {}", e);
                0
            }
        }
    }
}
