//! Attempt analysis and timing profile
//!
//! Built from the [`FetchTrace`] of every outcome. Logged at the end of a
//! run when the error analysis or the timing profile is requested.

use crate::state::{FetchTrace, WorkItem};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Ids shown in the retried list before it is truncated
const MAX_LISTED_IDS: usize = 30;

/// Totals over the fetch traces of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchDiagnostics {
    /// Number of outcomes by the HTTP attempts their fetch made
    pub attempt_distribution: BTreeMap<u32, usize>,

    /// Ids whose fetch needed more than one attempt, in completion order
    pub retried_ids: Vec<WorkItem>,

    attempt_errors: HashMap<String, usize>,
    samples: u32,
    total_wait: Duration,
    total_http: Duration,
    total_parse: Duration,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: &WorkItem, trace: &FetchTrace) {
        *self.attempt_distribution.entry(trace.attempts).or_default() += 1;
        if trace.was_retried() {
            self.retried_ids.push(id.clone());
        }
        for message in &trace.attempt_errors {
            *self.attempt_errors.entry(message.clone()).or_default() += 1;
        }

        self.samples += 1;
        self.total_wait += trace.wait;
        self.total_http += trace.http;
        self.total_parse += trace.parse;
    }

    /// Fetches traced so far
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// HTTP attempts beyond the first, summed over every fetch
    pub fn extra_attempts(&self) -> u64 {
        self.attempt_distribution
            .iter()
            .map(|(&attempts, &count)| u64::from(attempts.saturating_sub(1)) * count as u64)
            .sum()
    }

    /// Errors of individual attempts, most frequent first
    pub fn attempt_error_breakdown(&self) -> Vec<(String, usize)> {
        let mut breakdown: Vec<(String, usize)> = self
            .attempt_errors
            .iter()
            .map(|(message, &count)| (message.clone(), count))
            .collect();
        breakdown.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        breakdown
    }

    pub fn average_wait(&self) -> Duration {
        self.average(self.total_wait)
    }

    pub fn average_http(&self) -> Duration {
        self.average(self.total_http)
    }

    pub fn average_parse(&self) -> Duration {
        self.average(self.total_parse)
    }

    fn average(&self, total: Duration) -> Duration {
        total.checked_div(self.samples).unwrap_or(Duration::ZERO)
    }

    /// Logs the attempt distribution, retried ids and per-attempt errors
    pub fn log_attempt_analysis(&self) {
        if self.samples == 0 {
            return;
        }

        tracing::info!("=== Error Analysis ===");
        let distribution: Vec<String> = self
            .attempt_distribution
            .iter()
            .map(|(attempts, count)| format!("{}: {}", attempts, count))
            .collect();
        tracing::info!("Attempt distribution: {{{}}}", distribution.join(", "));

        if !self.retried_ids.is_empty() {
            let listed: Vec<&str> = self
                .retried_ids
                .iter()
                .take(MAX_LISTED_IDS)
                .map(WorkItem::as_str)
                .collect();
            let hidden = self.retried_ids.len().saturating_sub(MAX_LISTED_IDS);
            if hidden == 0 {
                tracing::info!("Items needing retries (in order): {}", listed.join(", "));
            } else {
                tracing::info!(
                    "Items needing retries (first {}): {} ... and {} more",
                    MAX_LISTED_IDS,
                    listed.join(", "),
                    hidden
                );
            }
        }

        let breakdown = self.attempt_error_breakdown();
        if !breakdown.is_empty() {
            tracing::info!("Attempt errors:");
            for (message, count) in &breakdown {
                tracing::info!("  {}: {}", message, count);
            }
        }
    }

    /// Logs the average time per item spent in each stage
    pub fn log_profile(&self) {
        if self.samples == 0 {
            return;
        }

        tracing::info!("=== Profile (avg per item, n={}) ===", self.samples);
        tracing::info!("Rate-limit wait: {:.3}s", self.average_wait().as_secs_f64());
        tracing::info!("HTTP fetch:      {:.3}s", self.average_http().as_secs_f64());
        tracing::info!("HTML parse:      {:.3}s", self.average_parse().as_secs_f64());
        tracing::info!(
            "Retries: {}/{} had more than one HTTP attempt",
            self.retried_ids.len(),
            self.samples
        );
    }
}
