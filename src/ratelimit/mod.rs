//! Global and per-host request rate limiting
//!
//! Every outbound request draws one token from the `global` bucket and one
//! from its `host:<h>` bucket. Both buckets are inspected under a single lock
//! and a token is only spent when both scopes can pay at once, so a request
//! stuck on a busy host never holds global capacity that another host could use.

mod bucket;

pub use bucket::TokenBucket;

use crate::config::FetchConfig;
use crate::{ProbeError, ProbeResult};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Shared token-bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    per_host_rps: f64,
    max_wait: Option<Duration>,
}

#[derive(Debug)]
struct LimiterState {
    global: TokenBucket,
    hosts: HashMap<String, TokenBucket>,
}

/// Why an acquisition could not be granted right now
struct Shortfall {
    wait: Duration,
    scope: String,
}

impl RateLimiter {
    /// Creates a limiter with the given refill rates
    ///
    /// # Arguments
    ///
    /// * `global_rps` - Refill rate of the shared global bucket
    /// * `per_host_rps` - Refill rate of each host bucket
    /// * `max_wait` - Optional ceiling on a single `acquire` wait
    pub fn new(global_rps: f64, per_host_rps: f64, max_wait: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                global: TokenBucket::with_rate(global_rps, Instant::now()),
                hosts: HashMap::new(),
            }),
            per_host_rps,
            max_wait,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            config.global_rps,
            config.per_host_rps,
            config.acquire_timeout(),
        )
    }

    /// Waits until both the global and the host bucket have a token, then
    /// consumes one from each
    pub async fn acquire(&self, host: &str) -> ProbeResult<()> {
        self.acquire_scopes(Some(host)).await
    }

    /// Waits for a token from the global bucket only
    pub async fn acquire_global(&self) -> ProbeResult<()> {
        self.acquire_scopes(None).await
    }

    /// Number of host buckets created so far
    pub fn host_count(&self) -> usize {
        self.lock().hosts.len()
    }

    async fn acquire_scopes(&self, host: Option<&str>) -> ProbeResult<()> {
        let started = Instant::now();

        loop {
            let shortfall = match self.try_acquire(host, Instant::now()) {
                Ok(()) => return Ok(()),
                Err(shortfall) => shortfall,
            };

            if let Some(max_wait) = self.max_wait {
                if started.elapsed() + shortfall.wait > max_wait {
                    tracing::warn!(
                        scope = %shortfall.scope,
                        "Rate limiter wait would exceed {:?}",
                        max_wait
                    );
                    return Err(ProbeError::RateLimitTimeout {
                        scope: shortfall.scope,
                        waited: started.elapsed(),
                    });
                }
            }

            tracing::trace!(
                scope = %shortfall.scope,
                wait_ms = shortfall.wait.as_millis() as u64,
                "Waiting for rate limit token"
            );
            tokio::time::sleep(shortfall.wait).await;
        }
    }

    /// Takes both tokens atomically, or reports how long until the sooner of
    /// the lacking buckets refills
    fn try_acquire(&self, host: Option<&str>, now: Instant) -> Result<(), Shortfall> {
        let mut guard = self.lock();
        let state = &mut *guard;

        state.global.refill(now);
        let host_bucket = match host {
            Some(h) => {
                let per_host_rps = self.per_host_rps;
                let bucket = state
                    .hosts
                    .entry(h.to_string())
                    .or_insert_with(|| TokenBucket::with_rate(per_host_rps, now));
                bucket.refill(now);
                Some(bucket)
            }
            None => None,
        };

        let global_ready = state.global.has_token();
        let host_ready = host_bucket.as_ref().map_or(true, |b| b.has_token());

        if global_ready && host_ready {
            state.global.take();
            if let Some(bucket) = host_bucket {
                bucket.take();
            }
            return Ok(());
        }

        let mut shortfall: Option<Shortfall> = None;
        if !global_ready {
            shortfall = Some(Shortfall {
                wait: state.global.time_until_token(),
                scope: "global".to_string(),
            });
        }
        if let (Some(bucket), Some(h)) = (host_bucket, host) {
            if !host_ready {
                let wait = bucket.time_until_token();
                if shortfall.as_ref().map_or(true, |s| wait < s.wait) {
                    shortfall = Some(Shortfall {
                        wait,
                        scope: format!("host:{}", h),
                    });
                }
            }
        }

        // One of the two branches above always fired
        Err(shortfall.unwrap_or(Shortfall {
            wait: Duration::from_millis(1),
            scope: "global".to_string(),
        }))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
