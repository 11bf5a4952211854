//! Pass scheduling states
//!
//! The pass scheduler moves through
//! `Idle -> Running(0) -> Cooldown(0) -> Running(1) -> ... -> Done`.

use crate::state::WorkItem;
use std::fmt;
use std::time::Duration;

/// Current phase of the multi-pass scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    /// No pass started yet
    Idle,

    /// A pass is being executed by the worker pool
    Running { pass: u32 },

    /// Waiting before the pass following `pass`
    Cooldown { pass: u32, delay: Duration },

    /// No further passes will occur
    Done,
}

impl PassPhase {
    /// Returns true once the scheduler can make no further progress
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// The pass number this phase refers to, if any
    pub fn pass(&self) -> Option<u32> {
        match self {
            Self::Running { pass } | Self::Cooldown { pass, .. } => Some(*pass),
            Self::Idle | Self::Done => None,
        }
    }
}

impl fmt::Display for PassPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running { pass } => write!(f, "running({})", pass),
            Self::Cooldown { pass, delay } => write!(f, "cooldown({}, {:?})", pass, delay),
            Self::Done => write!(f, "done"),
        }
    }
}

/// The work assigned to one pass
///
/// Created fresh for each pass from the previous pass's retryable failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassState {
    pub pass_number: u32,
    pub pending_ids: Vec<WorkItem>,
    /// Cooldown that preceded this pass (zero for pass 0)
    pub cooldown: Duration,
}

impl PassState {
    pub fn len(&self) -> usize {
        self.pending_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_ids.is_empty()
    }

    pub fn is_retry(&self) -> bool {
        self.pass_number > 0
    }
}
