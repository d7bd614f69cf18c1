//! Bounded worker pool and cooperative cancellation
//!
//! Jobs are queued on a crossbeam channel and drained by at most
//! `max_workers` scoped threads. `run` returns only after every worker has
//! exited, so it doubles as the barrier between the build and merge stages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel;
use tracing::debug;

use crate::error::{FragdexError, Result};

/// Shared flag checked between units of work
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(FragdexError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Runs a batch of jobs on a fixed number of threads
#[derive(Clone, Copy, Debug)]
pub struct WorkerPool {
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Result<Self> {
        if max_workers == 0 {
            return Err(FragdexError::InvalidConfig(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        Ok(Self { max_workers })
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Apply `f` to every job and return the results in job order.
    ///
    /// `f` receives the job's index in `jobs`. A panicking job propagates
    /// the panic to the caller once all workers have stopped.
    pub fn run<J, T, F>(&self, jobs: Vec<J>, f: F) -> Vec<T>
    where
        J: Send,
        T: Send,
        F: Fn(usize, J) -> T + Sync,
    {
        let job_count = jobs.len();
        if job_count == 0 {
            return Vec::new();
        }
        let workers = self.max_workers.min(job_count);

        let (job_tx, job_rx) = channel::unbounded::<(usize, J)>();
        let (result_tx, result_rx) = channel::unbounded::<(usize, T)>();
        for job in jobs.into_iter().enumerate() {
            // Receiver is alive until the scope below ends
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        debug!("Running {} jobs on {} workers", job_count, workers);
        let f = &f;
        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    while let Ok((i, job)) = job_rx.recv() {
                        let _ = result_tx.send((i, f(i, job)));
                    }
                });
            }
        });
        drop(result_tx);

        let mut slots: Vec<Option<T>> = (0..job_count).map(|_| None).collect();
        for (i, result) in result_rx.try_iter() {
            slots[i] = Some(result);
        }
        slots.into_iter().flatten().collect()
    }
}
