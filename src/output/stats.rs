//! Run statistics and the final summary
//!
//! This module provides the [`RunReport`] returned by the harvester and the
//! helpers used to present it.

use crate::output::FetchDiagnostics;
use crate::state::{Outcome, WorkItem};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Summary of one harvest run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,

    pub elapsed: Duration,

    /// Number of work items read from the input
    pub total_input: usize,

    /// Passes that actually ran (pass 0 counts as one)
    pub passes_executed: u32,

    /// Successful outcomes across all passes
    pub success_count: u64,

    /// Failed outcomes across all passes
    pub error_count: u64,

    /// Work items re-queued at least once
    pub retried_items: usize,

    /// Items whose last attempt failed and will not be retried
    pub permanent_failures: Vec<WorkItem>,

    /// Distinct items left without any outcome because the run was cancelled
    pub unattempted: Vec<WorkItem>,

    /// Error messages of failed outcomes, most frequent first
    pub error_breakdown: Vec<(String, usize)>,

    pub cancelled: bool,

    /// Final output file, `None` when written to stdout
    pub output: Option<PathBuf>,

    pub checkpoints_written: u64,

    /// HTTP attempt and timing figures of every fetch
    pub diagnostics: FetchDiagnostics,
}

impl RunReport {
    /// Percentage of outcomes that were successes
    pub fn success_percent(&self) -> f64 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            0.0
        } else {
            self.success_count as f64 / total as f64 * 100.0
        }
    }

    /// Average outcomes per second over the whole run
    pub fn average_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.success_count + self.error_count) as f64 / secs
        } else {
            0.0
        }
    }
}

/// Formats a duration for humans
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tourney_harvest::output::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(12_340)), "12.3s");
/// assert_eq!(format_duration(Duration::from_secs(245)), "4m 5s");
/// assert_eq!(format_duration(Duration::from_secs(3_720)), "1h 2m");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        return format!("{:.1}s", secs);
    }

    let whole = duration.as_secs();
    if whole < 3600 {
        format!("{}m {}s", whole / 60, whole % 60)
    } else {
        format!("{}h {}m", whole / 3600, (whole % 3600) / 60)
    }
}

/// Counts failed outcomes by error message, most frequent first
///
/// Ties are ordered by message so the result is deterministic.
pub fn error_breakdown<R>(outcomes: &[Outcome<R>]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for error in outcomes.iter().filter_map(|o| o.error.as_ref()) {
        *counts.entry(error.message.as_str()).or_default() += 1;
    }

    let mut breakdown: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(message, count)| (message.to_string(), count))
        .collect();
    breakdown.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    breakdown
}

/// Logs the final summary of a run
pub fn log_summary(report: &RunReport) {
    tracing::info!("=== Harvest Summary ===");
    if report.cancelled {
        tracing::warn!("Run was cancelled before completion");
    }
    tracing::info!("Total work items: {}", report.total_input);
    tracing::info!(
        "Successful: {} ({:.1}%)",
        report.success_count,
        report.success_percent()
    );
    tracing::info!("Errors: {}", report.error_count);
    tracing::info!("Retried items: {}", report.retried_items);
    let extra_attempts = report.diagnostics.extra_attempts();
    if extra_attempts > 0 {
        tracing::info!("In-request retries: {}", extra_attempts);
    }
    tracing::info!("Passes executed: {}", report.passes_executed);
    tracing::info!(
        "Time: {} ({:.2} items/sec)",
        format_duration(report.elapsed),
        report.average_rate()
    );

    if !report.permanent_failures.is_empty() {
        tracing::info!("Permanent failures: {}", report.permanent_failures.len());
    }
    if !report.unattempted.is_empty() {
        tracing::info!("Never attempted: {}", report.unattempted.len());
    }

    if !report.error_breakdown.is_empty() {
        tracing::info!("Error breakdown:");
        for (message, count) in &report.error_breakdown {
            tracing::info!("  {}: {}", message, count);
        }
    }

    if report.checkpoints_written > 0 {
        tracing::info!("Checkpoints written: {}", report.checkpoints_written);
    }
    match &report.output {
        Some(path) => tracing::info!("Output written to {}", path.display()),
        None => tracing::info!("Output written to stdout"),
    }
}
