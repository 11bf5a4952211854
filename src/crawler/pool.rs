//! Bounded worker pool for one pass
//!
//! A feeder task pushes the pass's work items into a bounded job queue.
//! `concurrency` workers pull from it, wait on the shared rate limiter,
//! call the fetcher and publish one [`Outcome`] per item, together with its
//! [`FetchTrace`], on a bounded result channel. The result channel closes once every worker has
//! finished, which ends the pass.

use crate::crawler::fetcher::Fetcher;
use crate::crawler::rate_limiter::AdaptiveRateLimiter;
use crate::state::{FetchTrace, Outcome, WorkItem};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Queue slots per worker for both the job and the result channel
const QUEUE_SLOTS_PER_WORKER: usize = 3;

/// Counters for one executed pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassRun {
    /// Items handed to the pool
    pub submitted: usize,

    /// Outcomes emitted by the workers
    pub completed: usize,

    /// The pass was cut short by cancellation
    pub cancelled: bool,
}

/// Fixed-size pool of fetch workers sharing one rate limiter
pub struct WorkerPool<F: Fetcher> {
    fetcher: Arc<F>,
    limiter: Arc<AdaptiveRateLimiter>,
    concurrency: usize,
}

impl<F: Fetcher> WorkerPool<F> {
    /// Creates a worker pool
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Performs the network round trip for one item
    /// * `limiter` - Shared gate passed before every fetch
    /// * `concurrency` - Number of concurrent workers (at least 1)
    pub fn new(fetcher: Arc<F>, limiter: Arc<AdaptiveRateLimiter>, concurrency: usize) -> Self {
        Self {
            fetcher,
            limiter,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs every item through `acquire -> fetch -> classify` once
    ///
    /// `on_outcome` is called on the calling task for every outcome and its
    /// trace in emission order. The method returns only after all workers have
    /// stopped. Without cancellation exactly one outcome is emitted per
    /// submitted item; after cancellation, items not yet finished produce
    /// no outcome.
    pub async fn run_pass<C>(
        &self,
        pass: u32,
        items: Vec<WorkItem>,
        cancel: &CancellationToken,
        mut on_outcome: C,
    ) -> PassRun
    where
        C: FnMut(Outcome<F::Record>, FetchTrace),
    {
        let submitted = items.len();
        if submitted == 0 {
            return PassRun {
                cancelled: cancel.is_cancelled(),
                ..PassRun::default()
            };
        }

        let workers = self.concurrency.min(submitted);
        let capacity = workers * QUEUE_SLOTS_PER_WORKER;
        let (job_tx, job_rx) = mpsc::channel::<WorkItem>(capacity);
        let (result_tx, mut result_rx) =
            mpsc::channel::<(Outcome<F::Record>, FetchTrace)>(capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut tasks = JoinSet::new();

        let feeder_cancel = cancel.clone();
        tasks.spawn(async move {
            for item in items {
                tokio::select! {
                    biased;
                    _ = feeder_cancel.cancelled() => break,
                    sent = job_tx.send(item) => {
                        // All workers gone; nobody left to take the rest
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        for worker_id in 0..workers {
            tasks.spawn(run_worker(
                worker_id,
                pass,
                Arc::clone(&self.fetcher),
                Arc::clone(&self.limiter),
                Arc::clone(&job_rx),
                result_tx.clone(),
                cancel.clone(),
            ));
        }
        drop(job_rx);
        drop(result_tx);

        let mut completed = 0;
        while let Some((outcome, trace)) = result_rx.recv().await {
            completed += 1;
            on_outcome(outcome, trace);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker task failed in pass {}: {}", pass, e);
            }
        }

        tracing::debug!(
            "Pass {} finished: {} of {} items completed",
            pass,
            completed,
            submitted
        );

        PassRun {
            submitted,
            completed,
            cancelled: cancel.is_cancelled(),
        }
    }
}

async fn run_worker<F: Fetcher>(
    worker_id: usize,
    pass: u32,
    fetcher: Arc<F>,
    limiter: Arc<AdaptiveRateLimiter>,
    jobs: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    results: mpsc::Sender<(Outcome<F::Record>, FetchTrace)>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut queue = jobs.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = queue.recv() => item,
            }
        };
        let Some(id) = next else {
            break;
        };

        let waiting = Instant::now();
        if limiter.acquire(&cancel).await.is_err() {
            break;
        }
        let wait = waiting.elapsed();

        let (result, mut trace) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Worker {} abandoned {} on cancellation", worker_id, id);
                break;
            }
            fetched = fetcher.fetch_traced(&id) => fetched,
        };
        trace.wait = wait;

        match &result {
            Ok(_) => limiter.record_success(),
            Err(e) if e.is_transient() => limiter.record_error(),
            Err(_) => {}
        }

        let outcome = Outcome::from_result(id, pass, result);
        if results.send((outcome, trace)).await.is_err() {
            break;
        }
    }
}
