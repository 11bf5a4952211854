//! Adaptive token-bucket rate limiter
//!
//! All workers pass through one shared limiter before every fetch. The
//! bucket refills continuously at `refill_rate` tokens per second and holds
//! at most `2 * refill_rate` tokens. The rate itself adapts to the outcome
//! stream:
//!
//! - a success that follows another success multiplies the rate by 1.05,
//!   capped at twice the initial rate
//! - every transient error beyond the second in a row halves the rate,
//!   floored at 0.2 requests/sec

use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Lowest refill rate the limiter backs off to (one request per 5 seconds)
pub const MIN_RATE: f64 = 0.2;

const RAMP_FACTOR: f64 = 1.05;
const BACKOFF_FACTOR: f64 = 0.5;
/// Consecutive errors tolerated before backing off
const ERROR_STREAK_THRESHOLD: u32 = 2;

/// Returned by [`AdaptiveRateLimiter::acquire`] when the wait was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limiter wait cancelled")]
pub struct Cancelled;

/// Point-in-time copy of the limiter's internal state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterState {
    pub tokens: f64,
    pub max_tokens: f64,
    pub refill_rate: f64,
    pub last_refill: Instant,
    pub consecutive_errors: u32,
}

impl RateLimiterState {
    fn new(rate: f64, now: Instant) -> Self {
        Self {
            tokens: rate,
            max_tokens: 2.0 * rate,
            refill_rate: rate,
            last_refill: now,
            consecutive_errors: 0,
        }
    }

    /// Adds the tokens accumulated since the last refill
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Changes the refill rate, keeping `tokens <= max_tokens`
    fn set_rate(&mut self, rate: f64) {
        self.refill_rate = rate;
        self.max_tokens = 2.0 * rate;
        self.tokens = self.tokens.min(self.max_tokens);
    }
}

/// Shared adaptive token bucket
///
/// State mutations go through one mutex so that `acquire`, `record_success`
/// and `record_error` are atomic with respect to each other. The mutex is
/// never held across a sleep; waiting acquirers instead queue on a fair
/// async gate, which also stops two waiters from sleeping on the same
/// token deficit.
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    state: Mutex<RateLimiterState>,
    gate: tokio::sync::Mutex<()>,
    floor: f64,
    ceiling: f64,
}

impl AdaptiveRateLimiter {
    /// Creates a limiter starting at `initial_rate` requests per second
    ///
    /// The bucket starts with `initial_rate` tokens, allowing a short burst.
    /// For initial rates below [`MIN_RATE`] the floor is lowered to the
    /// initial rate so that the bounds stay ordered.
    pub fn new(initial_rate: f64) -> Self {
        Self {
            state: Mutex::new(RateLimiterState::new(initial_rate, Instant::now())),
            gate: tokio::sync::Mutex::new(()),
            floor: MIN_RATE.min(initial_rate),
            ceiling: 2.0 * initial_rate,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RateLimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until a token is available and consumes it
    ///
    /// # Returns
    ///
    /// * `Ok(())` - A token was consumed; the caller may issue its request
    /// * `Err(Cancelled)` - The token fired while waiting; nothing was consumed
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let _turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            turn = self.gate.lock() => turn,
        };

        let wait = {
            let mut state = self.lock_state();
            state.refill(Instant::now());

            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return Ok(());
            }

            Duration::from_secs_f64((1.0 - state.tokens) / state.refill_rate)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }

        // The token accumulated during the sleep is the one we consume
        let mut state = self.lock_state();
        state.tokens = 0.0;
        state.last_refill = Instant::now();

        Ok(())
    }

    /// Records a successful fetch
    ///
    /// Resets the error streak. The rate only ramps up when the streak was
    /// already zero, so a lone success right after a failure does not speed
    /// the limiter up.
    pub fn record_success(&self) {
        let mut state = self.lock_state();
        let previous_errors = state.consecutive_errors;
        state.consecutive_errors = 0;

        if previous_errors == 0 && state.refill_rate < self.ceiling {
            let rate = (state.refill_rate * RAMP_FACTOR).min(self.ceiling);
            state.refill(Instant::now());
            state.set_rate(rate);
        }
    }

    /// Records a transient (network or timeout) failure
    ///
    /// Terminal failures must not be reported here; they say nothing about
    /// the source's tolerance for our request rate.
    pub fn record_error(&self) {
        let mut state = self.lock_state();
        state.consecutive_errors += 1;

        if state.consecutive_errors > ERROR_STREAK_THRESHOLD {
            let rate = (state.refill_rate * BACKOFF_FACTOR).max(self.floor);
            state.refill(Instant::now());
            state.set_rate(rate);
            tracing::warn!("Rate limited! Slowing down to {:.2} req/s", rate);
        }
    }

    /// Current refill rate in requests per second
    pub fn rate(&self) -> f64 {
        self.lock_state().refill_rate
    }

    /// Copy of the bucket state, for diagnostics and invariant checks
    pub fn snapshot(&self) -> RateLimiterState {
        *self.lock_state()
    }

    /// Lowest rate repeated errors can push the limiter down to
    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Highest rate successes can ramp the limiter up to (twice the initial)
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }
}
