//! Per-item fetch diagnostics
//!
//! A [`FetchTrace`] travels with every outcome from the worker to the
//! coordinator. It never reaches the persisted output; it only feeds the
//! attempt analysis and timing profile logged at the end of a run.

use std::time::Duration;

/// How one fetch call went
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchTrace {
    /// HTTP attempts made within the call (at least 1 once fetched)
    pub attempts: u32,

    /// Error message of every failed attempt, in order
    pub attempt_errors: Vec<String>,

    /// Time spent waiting on the rate limiter before the call
    pub wait: Duration,

    /// Time spent on HTTP round trips, including in-call backoff
    pub http: Duration,

    /// Time spent extracting the record from the response body
    pub parse: Duration,
}

impl FetchTrace {
    /// Trace of a call that made a single attempt
    pub fn single(http: Duration, error: Option<&str>) -> Self {
        Self {
            attempts: 1,
            attempt_errors: error.map(str::to_string).into_iter().collect(),
            http,
            ..Self::default()
        }
    }

    /// Returns true if the call needed more than one attempt
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}
