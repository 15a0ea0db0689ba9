use crate::config::types::{
    BatchConfig, CacheConfig, Config, CredentialEntry, FetchConfig, MetricsConfig, RetryConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_metrics_config(&config.metrics)?;
    validate_cache_config(&config.cache)?;
    validate_batch_config(&config.batch)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_credentials(&config.credentials)?;
    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.per_host_rps <= 0.0 || !config.per_host_rps.is_finite() {
        return Err(ConfigError::Validation(format!(
            "per-host-rps must be a positive number, got {}",
            config.per_host_rps
        )));
    }

    if config.global_rps <= 0.0 || !config.global_rps.is_finite() {
        return Err(ConfigError::Validation(format!(
            "global-rps must be a positive number, got {}",
            config.global_rps
        )));
    }

    if config.max_per_domain < 1 {
        return Err(ConfigError::Validation(format!(
            "max-per-domain must be >= 1, got {}",
            config.max_per_domain
        )));
    }

    if config.max_concurrent_requests < 1 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-requests must be >= 1, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.max_bytes == 0 {
        return Err(ConfigError::Validation(
            "max-bytes must be greater than zero".to_string(),
        ));
    }

    if config.connect_timeout_ms == 0 || config.read_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "fetch timeouts must be greater than zero".to_string(),
        ));
    }

    validate_retry_config("fetch.retry", &config.retry)
}

fn validate_metrics_config(config: &MetricsConfig) -> Result<(), ConfigError> {
    let endpoint = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid metrics endpoint: {}", e)))?;
    if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Metrics endpoint must be http(s), got '{}'",
            config.endpoint
        )));
    }

    if config.strategy != "mobile" && config.strategy != "desktop" {
        return Err(ConfigError::Validation(format!(
            "strategy must be 'mobile' or 'desktop', got '{}'",
            config.strategy
        )));
    }

    if config.categories.is_empty() {
        return Err(ConfigError::Validation(
            "at least one metrics category is required".to_string(),
        ));
    }

    if config.cooldown_ms > config.max_cooldown_ms {
        return Err(ConfigError::Validation(format!(
            "cooldown-ms ({}) cannot exceed max-cooldown-ms ({})",
            config.cooldown_ms, config.max_cooldown_ms
        )));
    }

    validate_retry_config("metrics.retry", &config.retry)
}

fn validate_retry_config(section: &str, config: &RetryConfig) -> Result<(), ConfigError> {
    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "{}: base-delay-ms ({}) cannot exceed max-delay-ms ({})",
            section, config.base_delay_ms, config.max_delay_ms
        )));
    }
    Ok(())
}

/// Ten years
const MAX_CACHE_TTL_HOURS: u64 = 87_600;

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.ttl_hours == 0 || config.ttl_hours > MAX_CACHE_TTL_HOURS {
        return Err(ConfigError::Validation(format!(
            "cache ttl-hours must be between 1 and {}, got {}",
            MAX_CACHE_TTL_HOURS, config.ttl_hours
        )));
    }

    if matches!(config.path.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "cache path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_batch_config(config: &BatchConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_domains < 1 || config.max_concurrent_domains > 256 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-domains must be between 1 and 256, got {}",
            config.max_concurrent_domains
        )));
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)
}

/// Every slot needs a unique name and exactly one key source that resolves
fn validate_credentials(entries: &[CredentialEntry]) -> Result<(), ConfigError> {
    if entries.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[credential]] entry is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for entry in entries {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "credential name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(entry.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate credential name '{}'",
                entry.name
            )));
        }

        match (&entry.key, &entry.key_env) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(ConfigError::Validation(format!(
                    "credential '{}' must set exactly one of key or key-env",
                    entry.name
                )));
            }
            (Some(key), None) if key.is_empty() => {
                return Err(ConfigError::Validation(format!(
                    "credential '{}' has an empty key",
                    entry.name
                )));
            }
            (None, Some(var)) if entry.resolve_key().is_none() => {
                return Err(ConfigError::MissingEnv(var.clone()));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
