use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Lead-Probe
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,

    /// PageSpeed Insights API keys, rotated on quota exhaustion
    #[serde(default, rename = "credential")]
    pub credentials: Vec<CredentialEntry>,
}

/// Page fetching limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    /// TCP/TLS connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Maximum wait for response headers and for each body chunk (milliseconds)
    pub read_timeout_ms: u64,

    /// Transfer cap per page; larger bodies are truncated
    pub max_bytes: usize,

    /// Refill rate of each per-host token bucket
    pub per_host_rps: f64,

    /// Refill rate of the global token bucket
    pub global_rps: f64,

    /// Maximum page requests issued for one domain
    pub max_per_domain: u32,

    /// Shared cap on in-flight network calls across all domains
    pub max_concurrent_requests: u32,

    /// Ceiling on a single rate limiter wait (milliseconds)
    pub acquire_timeout_ms: Option<u64>,

    /// Whether robots.txt is consulted before fetching
    pub respect_robots: bool,

    /// Secondary paths probed after the primary page
    pub probe_paths: Vec<String>,

    pub retry: RetryConfig,
}

/// Retry/backoff parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

/// PageSpeed Insights client settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MetricsConfig {
    /// Whether domains are enriched with PSI metrics at all
    pub enabled: bool,

    pub endpoint: String,

    /// `mobile` or `desktop`
    pub strategy: String,

    pub categories: Vec<String>,

    /// Total timeout of one PSI call (milliseconds)
    pub request_timeout_ms: u64,

    pub cooldown: CooldownMode,

    /// Cooldown applied after a quota signal (milliseconds)
    pub cooldown_ms: u64,

    /// Upper bound for exponential cooldowns (milliseconds)
    pub max_cooldown_ms: u64,

    /// Longest time a caller waits when every credential is cooling down
    pub max_cooldown_wait_ms: u64,

    pub retry: RetryConfig,
}

/// How credential cooldowns grow on repeated quota signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CooldownMode {
    Fixed,
    Exponential,
}

/// Response cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    /// SQLite file holding cached PSI responses; memory-only when absent
    pub path: Option<String>,

    pub ttl_hours: u64,
}

/// Batch orchestration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BatchConfig {
    /// Worker pool size
    pub max_concurrent_domains: u32,

    /// No new domain is started once this many seconds have elapsed
    pub deadline_secs: Option<u64>,

    /// Run domains one at a time even when a pool is available
    pub force_sequential: bool,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also used as the robots.txt agent token
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// A named API key slot
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CredentialEntry {
    pub name: String,

    /// Literal key value
    pub key: Option<String>,

    /// Environment variable holding the key
    pub key_env: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            read_timeout_ms: 10_000,
            max_bytes: 1_500_000,
            per_host_rps: 1.0,
            global_rps: 5.0,
            max_per_domain: 6,
            max_concurrent_requests: 5,
            acquire_timeout_ms: Some(60_000),
            respect_robots: true,
            probe_paths: [
                "/about",
                "/contact",
                "/services",
                "/blog",
                "/wp-content/",
                "/readme.html",
                "/feed",
                "/wp-json/",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
            jitter_ms: 1_000,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://www.googleapis.com/pagespeedonline/v5/runPagespeed".to_string(),
            strategy: "mobile".to_string(),
            categories: ["performance", "seo", "accessibility", "best-practices"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            request_timeout_ms: 60_000,
            cooldown: CooldownMode::Fixed,
            cooldown_ms: 60_000,
            max_cooldown_ms: 900_000,
            max_cooldown_wait_ms: 300_000,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            ttl_hours: 24,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_domains: 5,
            deadline_secs: None,
            force_sequential: false,
        }
    }
}

impl FetchConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

impl MetricsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn max_cooldown_wait(&self) -> Duration {
        Duration::from_millis(self.max_cooldown_wait_ms)
    }
}

impl BatchConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl CredentialEntry {
    /// Resolves the key, reading the environment when `key-env` is used
    pub fn resolve_key(&self) -> Option<String> {
        match (&self.key, &self.key_env) {
            (Some(key), _) => Some(key.clone()),
            (None, Some(var)) => std::env::var(var).ok().filter(|v| !v.is_empty()),
            (None, None) => None,
        }
    }
}
