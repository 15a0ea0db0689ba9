//! Configuration module for Lead-Probe
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every setting except the user agent block and the credential list has a
//! documented default, so a minimal file only names who is crawling and which
//! API keys to use.
//!
//! # Example
//!
//! ```no_run
//! use lead_probe::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("probe.toml")).unwrap();
//! println!("Per-host rate: {} rps", config.fetch.per_host_rps);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    BatchConfig, CacheConfig, Config, CooldownMode, CredentialEntry, FetchConfig, MetricsConfig,
    RetryConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
