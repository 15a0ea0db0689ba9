//! Lead-Probe: a resilient domain prober
//!
//! This crate fetches candidate domains and enriches them with PageSpeed Insights
//! metrics under shared rate, concurrency and quota limits. Individual domain
//! failures are isolated and recorded; the batch always completes.

pub mod batch;
pub mod cache;
pub mod config;
pub mod context;
pub mod credentials;
pub mod fetcher;
pub mod metrics;
pub mod pipeline;
pub mod ratelimit;
pub mod retry;
pub mod robots;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for Lead-Probe operations
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Rate limiter wait for {scope} exceeded {waited:?}")]
    RateLimitTimeout { scope: String, waited: Duration },

    #[error("All credentials cooling down; gave up after {waited:?}")]
    CredentialsExhausted { waited: Duration },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: pipeline::DomainState,
        to: pipeline::DomainState,
    },

    #[error("Cache store error: {0}")]
    CacheStore(#[from] cache::CacheStoreError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Environment variable {0} is not set")]
    MissingEnv(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Empty target")]
    Empty,
}

/// Result type alias for Lead-Probe operations
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use batch::{BatchOrchestrator, BatchResult, Outcome};
pub use config::Config;
pub use context::ProbeContext;
pub use pipeline::{DomainPipeline, DomainRecord, DomainState, DomainTask};
