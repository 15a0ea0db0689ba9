//! Lead-Probe main entry point
//!
//! This is the command-line interface for the Lead-Probe domain prober.

use anyhow::Context;
use clap::Parser;
use lead_probe::batch::{collect_statistics, print_statistics};
use lead_probe::config::{load_config_with_hash, Config};
use lead_probe::url::parse_target;
use lead_probe::{BatchOrchestrator, ProbeContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Lead-Probe: a resilient domain prober
///
/// Lead-Probe fetches each listed domain's primary page and a handful of
/// secondary paths, then enriches the domain with PageSpeed Insights metrics,
/// all under shared rate limits, a request cap and API key rotation.
#[derive(Parser, Debug)]
#[command(name = "lead-probe")]
#[command(version = "1.0.0")]
#[command(about = "A resilient domain prober", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// File with one domain or URL per line (`#` starts a comment)
    #[arg(value_name = "DOMAINS")]
    domains: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Override the configured number of domains processed at once
    #[arg(short = 'j', long, value_name = "N")]
    concurrency: Option<usize>,

    /// Validate config and show what would be probed without probing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let domains = read_domains(&cli.domains)?;
    tracing::info!("Read {} domain entries from {}", domains.len(), cli.domains.display());

    if cli.dry_run {
        handle_dry_run(&config, &domains);
        return Ok(());
    }

    let concurrency = cli
        .concurrency
        .unwrap_or(config.batch.max_concurrent_domains as usize);
    handle_batch(config, &domains, concurrency).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("lead_probe=info,warn"),
            1 => EnvFilter::new("lead_probe=debug,info"),
            2 => EnvFilter::new("lead_probe=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Reads the domain list, skipping blank lines and comments
fn read_domains(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read domain list {}", path.display()))?;

    Ok(content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Handles the --dry-run mode: validates config and shows what would be probed
fn handle_dry_run(config: &Config, domains: &[String]) {
    println!("=== Lead-Probe Dry Run ===\n");

    println!("Fetch Configuration:");
    println!("  Per-host rate: {} rps", config.fetch.per_host_rps);
    println!("  Global rate: {} rps", config.fetch.global_rps);
    println!(
        "  Max concurrent requests: {}",
        config.fetch.max_concurrent_requests
    );
    println!("  Max requests per domain: {}", config.fetch.max_per_domain);
    println!("  Byte cap: {}", config.fetch.max_bytes);
    println!("  Respect robots.txt: {}", config.fetch.respect_robots);
    println!("  Probe paths: {}", config.fetch.probe_paths.join(", "));

    println!("\nMetrics:");
    println!("  Enabled: {}", config.metrics.enabled);
    println!("  Strategy: {}", config.metrics.strategy);
    println!("  Categories: {}", config.metrics.categories.join(", "));
    println!("  Credentials: {}", config.credentials.len());
    for entry in &config.credentials {
        println!("    * {}", entry.name);
    }

    println!("\nCache:");
    match &config.cache.path {
        Some(path) => println!("  Store: {}", path),
        None => println!("  Store: memory only"),
    }
    println!("  TTL: {}h", config.cache.ttl_hours);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nDomains ({}):", domains.len());
    let mut valid = 0;
    for entry in domains {
        match parse_target(entry) {
            Ok(target) => {
                valid += 1;
                println!("  - {} -> {}", target.key, target.root);
            }
            Err(e) => println!("  - {} (invalid: {})", entry, e),
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would probe {} of {} domain entries", valid, domains.len());
}

/// Handles the main batch run
async fn handle_batch(config: Config, domains: &[String], concurrency: usize) -> anyhow::Result<()> {
    let ctx = Arc::new(ProbeContext::new(config).context("failed to initialize probe context")?);
    let orchestrator = BatchOrchestrator::new(ctx);

    let result = orchestrator
        .run(domains, concurrency)
        .await
        .context("batch run failed")?;

    print_statistics(&collect_statistics(&result));
    Ok(())
}
