//! Crawler module for rate-limited, multi-pass record fetching
//!
//! This module contains the core harvesting logic, including:
//! - The adaptive token-bucket rate limiter
//! - The bounded worker pool executing one pass
//! - The multi-pass retry scheduler
//! - HTTP fetching and details page parsing
//! - Overall run coordination

mod coordinator;
mod fetcher;
mod parser;
mod pool;
mod rate_limiter;
mod scheduler;

#[cfg(test)]
mod test_support;

pub use coordinator::{HarvestResult, Harvester, RunSettings};
pub use fetcher::{build_http_client, classify_request_error, looks_like_reset, Fetcher, HttpFetcher};
pub use parser::{parse_details, TournamentDetails};
pub use pool::{PassRun, WorkerPool};
pub use rate_limiter::{AdaptiveRateLimiter, Cancelled, RateLimiterState, MIN_RATE};
pub use scheduler::{PassDecision, PassScheduler};

use crate::config::Config;
use crate::input::{apply_limit, read_work_items, resolve_input_path};
use crate::output::RunReport;
use crate::HarvestError;
use tokio_util::sync::CancellationToken;

/// Runs a complete harvest from configuration
///
/// This is the main entry point. It will:
/// 1. Resolve and read the work list
/// 2. Apply the item limit
/// 3. Build the HTTP fetcher
/// 4. Run all passes and write the final output
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `cancel` - Stops the run early; the output is still written
///
/// # Returns
///
/// * `Ok(RunReport)` - The run finished (possibly with per-item failures)
/// * `Err(HarvestError)` - The work list was unusable or the output could
///   not be written
pub async fn harvest(config: &Config, cancel: &CancellationToken) -> Result<RunReport, HarvestError> {
    let input_path = resolve_input_path(config)?;
    let items = read_work_items(&input_path)?;
    let read = items.len();
    let items = apply_limit(items, config.input.limit);

    tracing::info!(
        "Loaded {} work items from {}",
        read,
        input_path.display()
    );
    if items.len() < read {
        tracing::info!("Limiting to the first {} items", items.len());
    }

    let fetcher = HttpFetcher::new(&config.fetcher)?;
    let harvester = Harvester::new(RunSettings::from_config(config), fetcher);
    let result = harvester.run(items, cancel).await?;

    Ok(result.report)
}
