//! Retry with exponential backoff and jitter
//!
//! A single [`BackoffController`] drives both page fetches and metrics calls.
//! The caller supplies the operation and a classifier; the controller decides
//! whether to retry after a delay, retry at once (quota rotation) or give up.

pub mod classify;

use crate::config::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on consecutive quota signals tolerated within one `execute`
pub const DEFAULT_MAX_ROTATIONS: u32 = 32;

/// How a failed attempt should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Transient; retry after a backoff delay
    Retryable,

    /// Permanent; surface immediately
    Fatal,

    /// The credential used is out of quota; retry at once with another one
    QuotaExceeded,
}

/// Backoff timing parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter
    ///
    /// `min(max_delay, base_delay * 2^(attempt - 1))`
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry number `attempt` with uniform jitter added
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for(attempt);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Snapshot handed to the observer before each backoff sleep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Number of retryable failures so far in this call
    pub attempt: u32,

    /// Delay about to be slept
    pub next_delay: Duration,
}

/// Terminal outcome of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("{0}")]
    Fatal(E),
}

impl<E> RetryError<E> {
    /// The error from the final attempt
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Fatal(e) => e,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Callback observing every scheduled retry
pub type RetryObserver = Arc<dyn Fn(&RetryState) + Send + Sync>;

/// Executes fallible async operations under a [`RetryPolicy`]
#[derive(Clone)]
pub struct BackoffController {
    policy: RetryPolicy,
    max_rotations: u32,
    observer: Option<RetryObserver>,
}

impl std::fmt::Debug for BackoffController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffController")
            .field("policy", &self.policy)
            .field("max_rotations", &self.max_rotations)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl BackoffController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            max_rotations: DEFAULT_MAX_ROTATIONS,
            observer: None,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(RetryPolicy::from_config(config))
    }

    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_max_rotations(mut self, max_rotations: u32) -> Self {
        self.max_rotations = max_rotations;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails fatally, or the budget is spent
    ///
    /// # Arguments
    ///
    /// * `operation` - Called with the 1-based call number; must build a fresh
    ///   future each time
    /// * `classify` - Maps an error to its [`Classification`]
    ///
    /// # Returns
    ///
    /// The first success, `RetryError::Fatal` on a fatal error, or
    /// `RetryError::Exhausted` once `max_retries` retryable failures (or
    /// `max_rotations` consecutive quota signals) have been absorbed
    pub async fn execute<T, E, F, Fut, C>(
        &self,
        mut operation: F,
        classify: C,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> Classification,
        E: std::fmt::Display,
    {
        let mut calls = 0u32;
        let mut failures = 0u32;
        let mut rotations = 0u32;

        loop {
            calls += 1;
            let err = match operation(calls).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match classify(&err) {
                Classification::Fatal => {
                    tracing::debug!(call = calls, "Fatal error, not retrying: {}", err);
                    return Err(RetryError::Fatal(err));
                }
                Classification::QuotaExceeded => {
                    rotations += 1;
                    if rotations > self.max_rotations {
                        tracing::warn!(
                            rotations = rotations - 1,
                            "Quota rotation limit reached: {}",
                            err
                        );
                        return Err(RetryError::Exhausted {
                            attempts: calls,
                            last: err,
                        });
                    }
                    tracing::debug!(call = calls, "Quota exceeded, rotating: {}", err);
                }
                Classification::Retryable => {
                    rotations = 0;
                    failures += 1;
                    if failures > self.policy.max_retries {
                        return Err(RetryError::Exhausted {
                            attempts: calls,
                            last: err,
                        });
                    }

                    let state = RetryState {
                        attempt: failures,
                        next_delay: self.policy.delay_for(failures),
                    };
                    if let Some(observer) = &self.observer {
                        observer(&state);
                    }

                    tracing::warn!(
                        attempt = state.attempt,
                        delay_ms = state.next_delay.as_millis() as u64,
                        "Retrying after error: {}",
                        err
                    );
                    tokio::time::sleep(state.next_delay).await;
                }
            }
        }
    }
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
