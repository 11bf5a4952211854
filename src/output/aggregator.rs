//! Result aggregation and progress tracking
//!
//! The aggregator owns the append-only outcome sequence for the whole run.
//! Every recorded outcome updates the counters and may trigger a checkpoint
//! write. The write works on a snapshot copy taken under the state lock and
//! runs on tokio's blocking pool, so serializing a large outcome set never
//! stalls the task draining results. Outside a runtime it runs inline.

use crate::output::checkpoint::CheckpointManager;
use crate::state::Outcome;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

/// Number of recent completions used for the instantaneous rate
const RECENT_WINDOW: usize = 20;

/// Point-in-time progress figures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub success_count: u64,
    pub error_count: u64,
    /// Outcomes recorded so far (`success_count + error_count`)
    pub processed: u64,
    pub total_input: u64,
    pub elapsed: Duration,
    /// Outcomes per second since the run started
    pub average_rate: f64,
    /// Outcomes per second over the last few completions
    pub recent_rate: f64,
    /// `None` until at least one outcome has been recorded
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    /// Percentage of the input processed, capped at 100
    pub fn percent(&self) -> f64 {
        if self.total_input == 0 {
            return 100.0;
        }
        (self.processed as f64 / self.total_input as f64 * 100.0).min(100.0)
    }
}

#[derive(Debug)]
struct AggregateState<R> {
    outcomes: Vec<Outcome<R>>,
    success_count: u64,
    error_count: u64,
    recent: VecDeque<Instant>,
}

/// Thread-safe accumulator for every outcome of every pass
#[derive(Debug)]
pub struct Aggregator<R> {
    state: Mutex<AggregateState<R>>,
    started: Instant,
    total_input: u64,
    checkpoint: Arc<CheckpointManager>,
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: Serialize + Clone + Send + Sync + 'static> Aggregator<R> {
    /// Creates an aggregator for a run over `total_input` work items
    pub fn new(total_input: usize, checkpoint: CheckpointManager) -> Self {
        Self {
            state: Mutex::new(AggregateState {
                outcomes: Vec::with_capacity(total_input),
                success_count: 0,
                error_count: 0,
                recent: VecDeque::with_capacity(RECENT_WINDOW),
            }),
            started: Instant::now(),
            total_input: total_input as u64,
            checkpoint: Arc::new(checkpoint),
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    /// Appends an outcome and returns the updated progress
    ///
    /// When the new success count lands on a checkpoint boundary the
    /// outcome sequence is copied under the lock and handed to the blocking
    /// pool once the lock is released.
    pub fn record(&self, outcome: Outcome<R>) -> ProgressSnapshot {
        let now = Instant::now();

        let (progress, due) = {
            let mut state = self.lock();

            if outcome.success {
                state.success_count += 1;
            } else {
                state.error_count += 1;
            }
            state.outcomes.push(outcome);

            if state.recent.len() == RECENT_WINDOW {
                state.recent.pop_front();
            }
            state.recent.push_back(now);

            let progress = self.snapshot_locked(&state, now);
            let crossed = state.outcomes.last().is_some_and(|o| o.success)
                && self.checkpoint.is_due(progress.success_count);
            let due = crossed.then(|| (progress.success_count, state.outcomes.clone()));
            (progress, due)
        };

        if let Some((success_count, outcomes)) = due {
            self.write_checkpoint(success_count, outcomes);
        }

        progress
    }

    /// Current progress without recording anything
    pub fn progress(&self) -> ProgressSnapshot {
        let state = self.lock();
        self.snapshot_locked(&state, Instant::now())
    }

    pub fn checkpoints_written(&self) -> u64 {
        self.checkpoint.checkpoints_written()
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Waits for checkpoint writes still running on the blocking pool
    pub async fn flush(&self) {
        let writes = std::mem::take(&mut *self.lock_pending());
        for write in writes {
            if let Err(e) = write.await {
                tracing::warn!("Checkpoint write task failed: {}", e);
            }
        }
    }

    /// Consumes the aggregator once pending checkpoint writes are done,
    /// returning the outcomes and the checkpoint manager that will write
    /// the final output
    pub async fn finish(self) -> (Vec<Outcome<R>>, CheckpointManager) {
        self.flush().await;
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        let checkpoint =
            Arc::try_unwrap(self.checkpoint).unwrap_or_else(|shared| shared.detached());
        (state.outcomes, checkpoint)
    }

    fn write_checkpoint(&self, success_count: u64, outcomes: Vec<Outcome<R>>) {
        match Handle::try_current() {
            Ok(runtime) => {
                let checkpoint = Arc::clone(&self.checkpoint);
                let write = runtime.spawn_blocking(move || {
                    checkpoint.maybe_checkpoint(success_count, &outcomes);
                });
                self.lock_pending().push(write);
            }
            Err(_) => {
                self.checkpoint.maybe_checkpoint(success_count, &outcomes);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregateState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending_writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_locked(&self, state: &AggregateState<R>, now: Instant) -> ProgressSnapshot {
        let processed = state.success_count + state.error_count;
        let elapsed = now.saturating_duration_since(self.started);
        let elapsed_secs = elapsed.as_secs_f64();

        let average_rate = if elapsed_secs > 0.0 {
            processed as f64 / elapsed_secs
        } else {
            0.0
        };

        let recent_rate = match (state.recent.front(), state.recent.back()) {
            (Some(first), Some(last)) if state.recent.len() > 1 => {
                let window = last.saturating_duration_since(*first).as_secs_f64();
                if window > 0.0 {
                    (state.recent.len() - 1) as f64 / window
                } else {
                    average_rate
                }
            }
            _ => average_rate,
        };

        ProgressSnapshot {
            success_count: state.success_count,
            error_count: state.error_count,
            processed,
            total_input: self.total_input,
            elapsed,
            average_rate,
            recent_rate,
            eta: estimate_remaining(elapsed, processed, self.total_input),
        }
    }
}

/// `(elapsed / processed) × (total − processed)`, saturating at zero
///
/// Retry passes can push `processed` past `total`; the estimate is then zero.
pub fn estimate_remaining(elapsed: Duration, processed: u64, total: u64) -> Option<Duration> {
    if processed == 0 {
        return None;
    }
    let remaining = total.saturating_sub(processed);
    let per_item = elapsed.as_secs_f64() / processed as f64;
    Some(Duration::from_secs_f64(per_item * remaining as f64))
}
