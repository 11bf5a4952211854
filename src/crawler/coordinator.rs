//! Harvester - main run orchestration logic
//!
//! This module contains the pass loop that coordinates all aspects of a
//! harvest run, including:
//! - Driving the pass scheduler and the worker pool
//! - Feeding outcomes to the aggregator (progress and checkpoints)
//! - Cooldowns between retry passes
//! - Handling cancellation
//! - Writing the final output exactly once

use crate::config::Config;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::pool::WorkerPool;
use crate::crawler::rate_limiter::AdaptiveRateLimiter;
use crate::crawler::scheduler::{PassDecision, PassScheduler};
use crate::input::resolve_output_path;
use crate::output::{
    error_breakdown, format_duration, log_summary, Aggregator, CheckpointManager,
    FetchDiagnostics, ProgressSnapshot, RunReport,
};
use crate::state::{Outcome, WorkItem};
use crate::{HarvestError, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Engine settings for one run, resolved from [`Config`]
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub concurrency: usize,
    pub initial_rate: f64,
    pub max_retry_passes: u32,
    pub base_delay: Duration,
    /// Checkpoint every N successes (0 disables)
    pub checkpoint_interval: u64,
    pub checkpoint_suffix: String,
    /// Final output file, `None` for stdout
    pub output: Option<PathBuf>,
    /// Log a progress line every N outcomes (0 is treated as 1)
    pub progress_every: u64,
    pub show_timing: bool,
    /// Log the attempt analysis after the summary
    pub verbose_errors: bool,
    /// Log the timing profile after the summary
    pub profile: bool,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.crawler.concurrency,
            initial_rate: config.crawler.initial_rate,
            max_retry_passes: config.crawler.max_retry_passes,
            base_delay: config.crawler.base_delay(),
            checkpoint_interval: config.crawler.checkpoint_interval,
            checkpoint_suffix: config.output.checkpoint_suffix.clone(),
            output: resolve_output_path(config),
            progress_every: config.crawler.progress_every,
            show_timing: config.crawler.show_timing,
            verbose_errors: config.crawler.verbose_errors,
            profile: config.crawler.profile,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct HarvestResult<R> {
    pub report: RunReport,
    /// Every outcome of every pass, in emission order
    pub outcomes: Vec<Outcome<R>>,
}

/// Main harvest coordinator
pub struct Harvester<F: Fetcher> {
    settings: RunSettings,
    fetcher: Arc<F>,
    limiter: Arc<AdaptiveRateLimiter>,
}

impl<F: Fetcher> Harvester<F> {
    /// Creates a harvester
    ///
    /// # Arguments
    ///
    /// * `settings` - Engine settings for the run
    /// * `fetcher` - The collaborator performing each network round trip
    pub fn new(settings: RunSettings, fetcher: F) -> Self {
        let limiter = Arc::new(AdaptiveRateLimiter::new(settings.initial_rate));
        Self {
            settings,
            fetcher: Arc::new(fetcher),
            limiter,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// The shared rate limiter, for diagnostics
    pub fn limiter(&self) -> &AdaptiveRateLimiter {
        &self.limiter
    }

    /// Runs all passes over `items` and writes the final output
    ///
    /// This is the core harvest logic that:
    /// 1. Runs pass 0 over every item
    /// 2. Re-runs transient failures after an exponential cooldown
    /// 3. Stops when nothing is retryable, the retry budget is spent or
    ///    `cancel` fires
    /// 4. Writes the final output once, even after cancellation
    ///
    /// # Returns
    ///
    /// * `Ok(HarvestResult)` - The run finished; per-item failures are in the
    ///   outcomes, not in the error
    /// * `Err(HarvestError)` - No work was given or the final write failed
    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        cancel: &CancellationToken,
    ) -> Result<HarvestResult<F::Record>> {
        if items.is_empty() {
            return Err(HarvestError::NoWork);
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let total_input = items.len();

        tracing::info!(
            "Harvesting {} items with {} workers at {:.2} req/s (max {} retry passes)",
            total_input,
            self.settings.concurrency,
            self.settings.initial_rate,
            self.settings.max_retry_passes
        );

        let checkpoint = CheckpointManager::new(
            self.settings.output.clone(),
            &self.settings.checkpoint_suffix,
            self.settings.checkpoint_interval,
        );
        if let Some(path) = checkpoint.checkpoint_path() {
            tracing::info!(
                "Checkpointing to {} every {} successes",
                path.display(),
                self.settings.checkpoint_interval
            );
        }

        let aggregator = Aggregator::new(total_input, checkpoint);
        let pool = WorkerPool::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.limiter),
            self.settings.concurrency,
        );
        let mut scheduler =
            PassScheduler::new(self.settings.max_retry_passes, self.settings.base_delay);

        let progress_every = self.settings.progress_every.max(1);
        let mut state = scheduler.start(items);
        let mut retried: HashSet<WorkItem> = HashSet::new();
        let mut diagnostics = FetchDiagnostics::new();
        let mut unfinished: Vec<WorkItem> = Vec::new();
        let mut cancelled = false;

        loop {
            if state.is_retry() {
                tracing::info!(
                    "Retry pass {}/{}: {} items",
                    state.pass_number,
                    self.settings.max_retry_passes,
                    state.len()
                );
            }

            let mut retryable: Vec<WorkItem> = Vec::new();
            let mut emitted: Vec<WorkItem> = Vec::new();

            let run = pool
                .run_pass(
                    state.pass_number,
                    state.pending_ids.clone(),
                    cancel,
                    |outcome, trace| {
                        diagnostics.record(&outcome.id, &trace);
                        if outcome.is_retryable() {
                            retryable.push(outcome.id.clone());
                        }
                        emitted.push(outcome.id.clone());

                        let line = self
                            .settings
                            .show_timing
                            .then(|| self.describe(&outcome));
                        let progress = aggregator.record(outcome);

                        if let Some(line) = line {
                            tracing::info!(
                                "{} ({:.2} req/s, ETA {})",
                                line,
                                self.limiter.rate(),
                                eta_text(&progress)
                            );
                        }
                        if progress.processed % progress_every == 0
                            || progress.processed == progress.total_input
                        {
                            log_progress(&progress);
                        }
                    },
                )
                .await;

            let missing = missing_outcomes(&state.pending_ids, &emitted);
            if !missing.is_empty() && !run.cancelled {
                tracing::warn!(
                    "{} items in pass {} produced no outcome",
                    missing.len(),
                    state.pass_number
                );
            }
            unfinished.extend(missing);

            if run.cancelled {
                tracing::warn!("Cancelled during pass {}", state.pass_number);
                scheduler.cancel();
                cancelled = true;
                break;
            }

            match scheduler.finish_pass(retryable) {
                PassDecision::Done { exhausted } => {
                    if !exhausted.is_empty() {
                        tracing::warn!(
                            "{} items still failing after {} retry passes",
                            exhausted.len(),
                            self.settings.max_retry_passes
                        );
                    }
                    break;
                }
                PassDecision::Retry(next) => {
                    retried.extend(next.pending_ids.iter().cloned());
                    tracing::info!(
                        "{} items to retry, waiting {}",
                        next.len(),
                        format_duration(next.cooldown)
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            tracing::warn!("Cancelled during cooldown before pass {}", next.pass_number);
                            scheduler.cancel();
                            cancelled = true;
                            break;
                        }
                        _ = tokio::time::sleep(next.cooldown) => {}
                    }

                    scheduler.begin(&next);
                    state = next;
                }
            }
        }

        let (outcomes, checkpoint) = aggregator.finish().await;
        let checkpoints_written = checkpoint.checkpoints_written();
        let output = checkpoint.output_path().map(Path::to_path_buf);

        checkpoint.finalize_output(&outcomes)?;

        // An item cut short in a retry pass still has its earlier failure
        let unattempted = without_outcome(&unfinished, &outcomes);
        let mut permanent_failures = last_attempt_failures(&outcomes);
        permanent_failures.extend(unattempted.iter().cloned());

        let success_count = outcomes.iter().filter(|o| o.success).count() as u64;
        let report = RunReport {
            started_at,
            elapsed: start.elapsed(),
            total_input,
            passes_executed: scheduler.passes_executed(),
            success_count,
            error_count: outcomes.len() as u64 - success_count,
            retried_items: retried.len(),
            permanent_failures,
            unattempted,
            error_breakdown: error_breakdown(&outcomes),
            cancelled,
            output,
            checkpoints_written,
            diagnostics,
        };
        log_summary(&report);
        if self.settings.verbose_errors {
            report.diagnostics.log_attempt_analysis();
        }
        if self.settings.profile {
            report.diagnostics.log_profile();
        }

        Ok(HarvestResult { report, outcomes })
    }

    fn describe(&self, outcome: &Outcome<F::Record>) -> String {
        match (&outcome.record, &outcome.error) {
            (Some(record), _) => {
                let label = self.fetcher.label(record).unwrap_or_default();
                format!("✓ {}: {}", outcome.id, label)
            }
            (None, Some(error)) => format!("✗ {}: {}", outcome.id, error),
            (None, None) => format!("✗ {}", outcome.id),
        }
    }
}

fn log_progress(progress: &ProgressSnapshot) {
    tracing::info!(
        "Progress: {}/{} ({:.1}%) | success: {} | errors: {} | {:.2} items/sec (recent {:.2}) | ETA {}",
        progress.processed,
        progress.total_input,
        progress.percent(),
        progress.success_count,
        progress.error_count,
        progress.average_rate,
        progress.recent_rate,
        eta_text(progress)
    );
}

fn eta_text(progress: &ProgressSnapshot) -> String {
    progress
        .eta
        .map(format_duration)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Items of `pending` with no matching entry in `emitted`
///
/// Compared as multisets so a duplicated id needs one outcome per copy.
fn missing_outcomes(pending: &[WorkItem], emitted: &[WorkItem]) -> Vec<WorkItem> {
    let mut counts: HashMap<&WorkItem, usize> = HashMap::new();
    for id in emitted {
        *counts.entry(id).or_default() += 1;
    }

    pending
        .iter()
        .filter(|id| match counts.get_mut(id) {
            Some(count) if *count > 0 => {
                *count -= 1;
                false
            }
            _ => true,
        })
        .cloned()
        .collect()
}

/// Distinct ids of `candidates` with no outcome at all, in first-seen order
fn without_outcome<R>(candidates: &[WorkItem], outcomes: &[Outcome<R>]) -> Vec<WorkItem> {
    let attempted: HashSet<&WorkItem> = outcomes.iter().map(|o| &o.id).collect();
    let mut reported: HashSet<&WorkItem> = HashSet::new();
    candidates
        .iter()
        .filter(|id| !attempted.contains(*id) && reported.insert(*id))
        .cloned()
        .collect()
}

/// Ids whose most recent outcome is a failure, in first-seen order
fn last_attempt_failures<R>(outcomes: &[Outcome<R>]) -> Vec<WorkItem> {
    let mut order: Vec<&WorkItem> = Vec::new();
    let mut last: HashMap<&WorkItem, bool> = HashMap::new();
    for outcome in outcomes {
        if last.insert(&outcome.id, outcome.success).is_none() {
            order.push(&outcome.id);
        }
    }

    order
        .into_iter()
        .filter(|id| last.get(id) == Some(&false))
        .cloned()
        .collect()
}
