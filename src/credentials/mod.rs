//! API credential rotation with quota cooldowns
//!
//! Credentials are handed out round-robin. A credential that reports a quota
//! signal is parked until its cooldown expires; when every credential is parked
//! callers wait (bounded) for the earliest one to come back.

use crate::config::{Config, CooldownMode, MetricsConfig};
use crate::{ConfigError, ConfigResult, ProbeError, ProbeResult};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Index of a credential inside its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CredentialId(pub usize);

/// A named API key
#[derive(Clone)]
pub struct Credential {
    name: String,
    key: String,
}

impl Credential {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Health bookkeeping for one credential
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialState {
    pub cooldown_until: Option<Instant>,
    pub consecutive_failures: u32,
    pub quota_strikes: u32,
}

impl CredentialState {
    fn is_available(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(true, |until| until <= now)
    }
}

/// How long a credential is parked after a quota signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownPolicy {
    Fixed(Duration),

    /// Doubles per consecutive quota strike, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl CooldownPolicy {
    pub fn from_config(config: &MetricsConfig) -> Self {
        let base = Duration::from_millis(config.cooldown_ms);
        match config.cooldown {
            CooldownMode::Fixed => CooldownPolicy::Fixed(base),
            CooldownMode::Exponential => CooldownPolicy::Exponential {
                base,
                max: Duration::from_millis(config.max_cooldown_ms),
            },
        }
    }

    /// Cooldown after the given number of consecutive strikes (1-based)
    pub fn cooldown_for(&self, strikes: u32) -> Duration {
        match self {
            CooldownPolicy::Fixed(d) => *d,
            CooldownPolicy::Exponential { base, max } => {
                let factor = 2u32
                    .checked_pow(strikes.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(*max).min(*max)
            }
        }
    }
}

#[derive(Debug)]
struct PoolState {
    slots: Vec<CredentialState>,
    cursor: usize,
}

/// Shared pool of API credentials
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    state: Mutex<PoolState>,
    policy: CooldownPolicy,
    max_wait: Duration,
}

impl CredentialPool {
    /// Creates a pool
    ///
    /// # Arguments
    ///
    /// * `credentials` - At least one credential
    /// * `policy` - Cooldown applied on quota signals
    /// * `max_wait` - Longest `select` will wait when everything is cooling down
    ///
    /// # Returns
    ///
    /// A configuration error when `credentials` is empty
    pub fn new(
        credentials: Vec<Credential>,
        policy: CooldownPolicy,
        max_wait: Duration,
    ) -> ConfigResult<Self> {
        if credentials.is_empty() {
            return Err(ConfigError::Validation(
                "credential pool needs at least one credential".to_string(),
            ));
        }

        let slots = vec![CredentialState::default(); credentials.len()];
        Ok(Self {
            credentials,
            state: Mutex::new(PoolState { slots, cursor: 0 }),
            policy,
            max_wait,
        })
    }

    /// Builds the pool from the `[[credential]]` entries and `[metrics]` cooldown settings
    pub fn from_config(config: &Config) -> ConfigResult<Self> {
        let credentials = config
            .credentials
            .iter()
            .map(|entry| {
                entry
                    .resolve_key()
                    .map(|key| Credential::new(entry.name.clone(), key))
                    .ok_or_else(|| {
                        ConfigError::MissingEnv(
                            entry.key_env.clone().unwrap_or_else(|| entry.name.clone()),
                        )
                    })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Self::new(
            credentials,
            CooldownPolicy::from_config(&config.metrics),
            config.metrics.max_cooldown_wait(),
        )
    }

    /// Picks the next credential without an active cooldown
    ///
    /// Waits for the earliest cooldown to expire when all credentials are
    /// parked, failing with `CredentialsExhausted` if that would take longer
    /// than the configured maximum.
    pub async fn select(&self) -> ProbeResult<CredentialId> {
        let started = Instant::now();

        loop {
            let wait = match self.try_select(Instant::now()) {
                Ok(id) => return Ok(id),
                Err(wait) => wait,
            };

            if started.elapsed() + wait > self.max_wait {
                tracing::error!(
                    credentials = self.credentials.len(),
                    "All credentials cooling down beyond {:?}",
                    self.max_wait
                );
                return Err(ProbeError::CredentialsExhausted {
                    waited: started.elapsed(),
                });
            }

            tracing::warn!(
                wait_ms = wait.as_millis() as u64,
                "All credentials cooling down, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Clears failure counters after a successful call
    pub fn report_success(&self, id: CredentialId) {
        let mut state = self.lock();
        if let Some(slot) = state.slots.get_mut(id.0) {
            slot.consecutive_failures = 0;
            slot.quota_strikes = 0;
        }
    }

    /// Records a failed call; a quota failure parks the credential
    pub fn report_failure(&self, id: CredentialId, quota_exceeded: bool) {
        let mut state = self.lock();
        let Some(slot) = state.slots.get_mut(id.0) else {
            return;
        };

        if !quota_exceeded {
            slot.consecutive_failures += 1;
            return;
        }

        slot.quota_strikes += 1;
        let cooldown = self.policy.cooldown_for(slot.quota_strikes);
        slot.cooldown_until = Some(Instant::now() + cooldown);

        tracing::warn!(
            credential = %self.credentials[id.0].name,
            strikes = slot.quota_strikes,
            cooldown_ms = cooldown.as_millis() as u64,
            "Credential quota exceeded, cooling down"
        );
    }

    pub fn get(&self, id: CredentialId) -> Option<&Credential> {
        self.credentials.get(id.0)
    }

    /// Snapshot of a credential's health
    pub fn state(&self, id: CredentialId) -> Option<CredentialState> {
        self.lock().slots.get(id.0).cloned()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Round-robin scan from the cursor; on failure returns the time until
    /// the earliest cooldown ends
    fn try_select(&self, now: Instant) -> Result<CredentialId, Duration> {
        let mut state = self.lock();
        let count = state.slots.len();

        for offset in 0..count {
            let idx = (state.cursor + offset) % count;
            if state.slots[idx].is_available(now) {
                state.slots[idx].cooldown_until = None;
                state.cursor = (idx + 1) % count;
                return Ok(CredentialId(idx));
            }
        }

        let earliest = state
            .slots
            .iter()
            .filter_map(|slot| slot.cooldown_until)
            .min()
            .unwrap_or(now);
        Err(earliest.saturating_duration_since(now))
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
