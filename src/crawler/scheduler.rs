//! Multi-pass retry scheduler
//!
//! This module handles:
//! - Pass 0 over the complete work list
//! - Retry passes over the previous pass's transient failures only
//! - Exponential cooldown between passes (`base_delay * 2^k`)
//! - Termination after at most `max_retry_passes + 1` passes
//!
//! The scheduler never touches workers or the network. The harvester runs
//! each [`PassState`] through the worker pool and reports the retry set
//! back, so the retry policy can be exercised on its own.

use crate::state::{PassPhase, PassState, WorkItem};
use std::time::Duration;

/// What happens after a pass has finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassDecision {
    /// Wait `next.cooldown`, then run `next`
    Retry(PassState),

    /// No further passes. `exhausted` holds the items that were still
    /// failing transiently when the retry budget ran out.
    Done { exhausted: Vec<WorkItem> },
}

/// State machine driving the sequence of passes
#[derive(Debug, Clone)]
pub struct PassScheduler {
    max_retry_passes: u32,
    base_delay: Duration,
    phase: PassPhase,
    passes_executed: u32,
}

impl PassScheduler {
    /// Creates a scheduler in the `Idle` phase
    ///
    /// # Arguments
    ///
    /// * `max_retry_passes` - Retry passes allowed after pass 0
    /// * `base_delay` - Cooldown before pass 1; doubles for every later pass
    pub fn new(max_retry_passes: u32, base_delay: Duration) -> Self {
        Self {
            max_retry_passes,
            base_delay,
            phase: PassPhase::Idle,
            passes_executed: 0,
        }
    }

    pub fn phase(&self) -> PassPhase {
        self.phase
    }

    /// Number of passes started so far
    pub fn passes_executed(&self) -> u32 {
        self.passes_executed
    }

    pub fn max_retry_passes(&self) -> u32 {
        self.max_retry_passes
    }

    /// Cooldown that follows pass `pass`: `base_delay * 2^pass`
    pub fn cooldown_for(&self, pass: u32) -> Duration {
        let factor = 1u32.checked_shl(pass).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Starts pass 0 over the complete work list
    pub fn start(&mut self, items: Vec<WorkItem>) -> PassState {
        self.phase = PassPhase::Running { pass: 0 };
        self.passes_executed = 1;

        PassState {
            pass_number: 0,
            pending_ids: items,
            cooldown: Duration::ZERO,
        }
    }

    /// Ends the running pass
    ///
    /// # Arguments
    ///
    /// * `retryable` - Items whose outcome in this pass was transient, in
    ///   emission order
    ///
    /// # Returns
    ///
    /// * `PassDecision::Retry` - The scheduler is now in `Cooldown`
    /// * `PassDecision::Done` - The retry set was empty or the budget is spent
    pub fn finish_pass(&mut self, retryable: Vec<WorkItem>) -> PassDecision {
        let PassPhase::Running { pass } = self.phase else {
            tracing::warn!("finish_pass called in phase {}", self.phase);
            self.phase = PassPhase::Done;
            return PassDecision::Done {
                exhausted: retryable,
            };
        };

        if retryable.is_empty() {
            self.phase = PassPhase::Done;
            return PassDecision::Done { exhausted: vec![] };
        }

        if pass >= self.max_retry_passes {
            self.phase = PassPhase::Done;
            return PassDecision::Done {
                exhausted: retryable,
            };
        }

        let delay = self.cooldown_for(pass);
        self.phase = PassPhase::Cooldown { pass, delay };

        PassDecision::Retry(PassState {
            pass_number: pass + 1,
            pending_ids: retryable,
            cooldown: delay,
        })
    }

    /// Leaves the cooldown and marks `next` as running
    pub fn begin(&mut self, next: &PassState) {
        if let PassPhase::Cooldown { .. } = self.phase {
            self.phase = PassPhase::Running {
                pass: next.pass_number,
            };
            self.passes_executed += 1;
        }
    }

    /// Stops scheduling; no further passes will start
    pub fn cancel(&mut self) {
        self.phase = PassPhase::Done;
    }
}
