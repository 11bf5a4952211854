//! Tourney-Harvest main entry point
//!
//! This is the command-line interface for the tournament details harvester.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tourney_harvest::config::{compute_config_hash, read_config, validate, Config};
use tourney_harvest::crawler::{harvest, RunSettings};
use tourney_harvest::input::{apply_limit, read_work_items, resolve_input_path};
use tourney_harvest::output::format_duration;
use tracing_subscriber::EnvFilter;

/// Tourney-Harvest: a resilient tournament details harvester
///
/// Reads a list of tournament ids and fetches each tournament's details
/// page through an adaptive rate limiter, retrying transient failures in
/// later passes and checkpointing results while it runs.
#[derive(Parser, Debug)]
#[command(name = "tourney-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resilient tournament details harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Work-list file with one tournament id per line
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Year of the monthly id list
    #[arg(long)]
    year: Option<i32>,

    /// Month of the monthly id list (1-12)
    #[arg(long)]
    month: Option<u32>,

    /// Base directory for monthly id lists and default outputs
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Output JSON file (stdout when omitted and no year/month is given)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(long)]
    concurrency: Option<usize>,

    /// Initial request rate in requests per second
    #[arg(long, value_name = "REQ_PER_SEC")]
    rate_limit: Option<f64>,

    /// Maximum number of retry passes
    #[arg(long)]
    max_retries: Option<u32>,

    /// Save a checkpoint every N successes (0 disables)
    #[arg(long, value_name = "N")]
    checkpoint: Option<u64>,

    /// Process only the first N ids
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// HTTP attempts per fetch before an item counts as failed
    #[arg(long, value_name = "N")]
    max_attempts: Option<u32>,

    /// Log every item with timing information
    #[arg(long)]
    show_time: bool,

    /// Log the attempt distribution and per-attempt errors at the end
    #[arg(long)]
    verbose_errors: bool,

    /// Log average rate-limit wait, HTTP and parse times at the end
    #[arg(long)]
    profile: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate settings and show what would be harvested without fetching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let config = read_config(path)
                .with_context(|| format!("failed to load configuration {}", path.display()))?;
            let hash = compute_config_hash(path)?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    apply_overrides(&mut config, &cli);
    validate(&config).context("invalid configuration")?;

    if cli.dry_run {
        return handle_dry_run(&config);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing up and writing results");
            on_interrupt.cancel();
        }
    });

    let report = harvest(&config, &cancel).await.context("harvest failed")?;

    if report.cancelled {
        tracing::warn!(
            "Harvest interrupted after {}; {} items were never attempted",
            format_duration(report.elapsed),
            report.unattempted.len()
        );
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr so that results written to stdout stay valid JSON.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tourney_harvest=info,warn"),
            1 => EnvFilter::new("tourney_harvest=debug,info"),
            2 => EnvFilter::new("tourney_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Command-line flags take precedence over the configuration file
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(input) = &cli.input {
        config.input.path = Some(input.clone());
    }
    if let Some(year) = cli.year {
        config.input.year = Some(year);
    }
    if let Some(month) = cli.month {
        config.input.month = Some(month);
    }
    if let Some(data_dir) = &cli.data_dir {
        config.input.data_dir = data_dir.clone();
    }
    if let Some(limit) = cli.limit {
        config.input.limit = limit;
    }
    if let Some(output) = &cli.output {
        config.output.path = Some(output.clone());
    }
    if let Some(concurrency) = cli.concurrency {
        config.crawler.concurrency = concurrency;
    }
    if let Some(rate) = cli.rate_limit {
        config.crawler.initial_rate = rate;
    }
    if let Some(max_retries) = cli.max_retries {
        config.crawler.max_retry_passes = max_retries;
    }
    if let Some(interval) = cli.checkpoint {
        config.crawler.checkpoint_interval = interval;
    }
    if let Some(attempts) = cli.max_attempts {
        config.fetcher.max_attempts = attempts;
    }
    if cli.show_time {
        config.crawler.show_timing = true;
    }
    if cli.verbose_errors {
        config.crawler.verbose_errors = true;
    }
    if cli.profile {
        config.crawler.profile = true;
    }
}

/// Handles the --dry-run mode: validates settings and shows what would run
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let settings = RunSettings::from_config(config);
    let input_path = resolve_input_path(config)?;

    println!("=== Tourney-Harvest Dry Run ===\n");

    println!("Input:");
    println!("  Work list: {}", input_path.display());
    match read_work_items(&input_path) {
        Ok(items) => {
            let total = items.len();
            let selected = apply_limit(items, config.input.limit).len();
            println!("  Work items: {} ({} selected)", total, selected);
        }
        Err(e) => println!("  Work items: unavailable ({})", e),
    }

    println!("\nOutput:");
    match &settings.output {
        Some(path) => {
            println!("  File: {}", path.display());
            if settings.checkpoint_interval > 0 {
                println!(
                    "  Checkpoint: {}{} every {} successes",
                    path.display(),
                    settings.checkpoint_suffix,
                    settings.checkpoint_interval
                );
            } else {
                println!("  Checkpoint: disabled");
            }
        }
        None => println!("  stdout (checkpointing disabled)"),
    }

    println!("\nEngine:");
    println!("  Concurrency: {}", settings.concurrency);
    println!("  Initial rate: {:.2} req/s", settings.initial_rate);
    println!("  Max retry passes: {}", settings.max_retry_passes);
    println!("  Base retry delay: {}", format_duration(settings.base_delay));

    println!("\nFetcher:");
    println!(
        "  Endpoint: {}?{}=<id>",
        config.fetcher.endpoint, config.fetcher.id_param
    );
    println!("  Timeout: {}s", config.fetcher.timeout_secs);
    println!(
        "  Attempts per fetch: {} (backoff from {}ms)",
        config.fetcher.max_attempts, config.fetcher.retry_backoff_ms
    );

    println!("\n✓ Configuration is valid");

    Ok(())
}
