//! Bounded job dispatcher.
//!
//! A fixed pool of worker tasks drains one shared queue. Admission is gated by
//! a semaphore holding `capacity` permits: a permit is taken in [`Dispatcher::submit`]
//! and released only when a worker has finished that job, so a producer waits
//! as soon as `capacity` jobs are admitted but unfinished. Accepted lines are
//! never dropped.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::FutureExt;
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::{RelmapError, Result};

/// How long `close` waits for queued and running jobs by default.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Processes one admitted input line.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, line: &str) -> Result<()>;
}

/// A queued line together with the admission slot it occupies.
struct Admitted {
    line: String,
    _slot: OwnedSemaphorePermit,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> DispatchReport {
        DispatchReport {
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Job outcome totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Fixed-size worker pool with blocking admission.
pub struct Dispatcher {
    sender: mpsc::Sender<Admitted>,
    slots: Arc<Semaphore>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
    drain_timeout: Duration,
}

impl Dispatcher {
    /// Spawn `pool_size` workers sharing one queue of capacity `pool_size`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(pool_size: usize, handler: Arc<dyn JobHandler>) -> Result<Self> {
        if pool_size == 0 {
            return Err(RelmapError::Config(
                "Worker pool size must be greater than 0".to_string(),
            ));
        }

        let capacity = pool_size;
        let (sender, receiver) = mpsc::channel(capacity);
        let queue = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let workers = (0..pool_size)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&handler),
                    Arc::clone(&counters),
                ))
            })
            .collect();

        log::info!("Started {} workers (admission capacity {})", pool_size, capacity);

        Ok(Self {
            sender,
            slots: Arc::new(Semaphore::new(capacity)),
            workers,
            counters,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        })
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.workers.len()
    }

    /// Admit one input line.
    ///
    /// Blank lines are ignored and return `Ok(false)`. Otherwise waits until a
    /// slot frees up, enqueues the trimmed line and returns `Ok(true)`.
    pub async fn submit(&self, line: &str) -> Result<bool> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(false);
        }

        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| RelmapError::InvalidInput("Dispatcher is closed".to_string()))?;

        self.sender
            .send(Admitted {
                line: line.to_string(),
                _slot: slot,
            })
            .await
            .map_err(|_| {
                RelmapError::InvalidInput("Worker pool is no longer running".to_string())
            })?;

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Totals so far.
    pub fn report(&self) -> DispatchReport {
        self.counters.snapshot()
    }

    /// Stop admitting work and wait for the pool to drain.
    ///
    /// If the workers are still busy after the drain timeout they are aborted
    /// and `DrainTimeout` is returned; the caller decides how to exit.
    pub async fn close(self) -> Result<DispatchReport> {
        let Dispatcher {
            sender,
            workers,
            counters,
            drain_timeout,
            ..
        } = self;

        drop(sender);
        log::info!(
            "Input exhausted, waiting up to {:?} for {} workers to drain",
            drain_timeout,
            workers.len()
        );

        let aborts: Vec<_> = workers.iter().map(|w| w.abort_handle()).collect();

        match tokio::time::timeout(drain_timeout, join_all(workers)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        log::error!("Worker task ended abnormally: {}", e);
                    }
                }
                Ok(counters.snapshot())
            }
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                let report = counters.snapshot();
                log::error!(
                    "Waited for {:?}, workers still busy ({} of {} jobs finished)",
                    drain_timeout,
                    report.succeeded + report.failed,
                    report.submitted
                );
                Err(RelmapError::DrainTimeout(drain_timeout))
            }
        }
    }
}

async fn run_worker(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<Admitted>>>,
    handler: Arc<dyn JobHandler>,
    counters: Arc<Counters>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };

        let outcome = AssertUnwindSafe(handler.handle(&job.line))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                log::debug!("[worker {}] done: {}", id, job.line);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::error!("Job failed for line '{}': {}", job.line, e);
            }
            Err(_) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::error!("Job panicked for line '{}'", job.line);
            }
        }
        // dropping `job` frees its admission slot
    }

    log::debug!("[worker {}] queue closed, exiting", id);
}
