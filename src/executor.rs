//! Producer Executor
//!
//! Runs `get_else_set` producers off the caller's thread.
//!
//! ## Strategies
//! - `ThreadPerTask`: one named OS thread per producer
//! - `WorkerPool`: fixed set of named threads pulling jobs from a crossbeam
//!   channel; workers exit once the executor is dropped and the queue drains
//!
//! Producer panics are caught before they reach a worker, so a pool only
//! loses workers if cloning a value panics while flushing. Submitting to a
//! pool with no workers left fails with `FutureKvError::Executor`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crossbeam::channel::{self, Sender};

use crate::config::{MapConfig, ProducerStrategy};
use crate::error::{FutureKvError, Result};

/// Unit of work submitted by the map
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) enum Executor {
    ThreadPerTask {
        thread_name: String,
        spawned: AtomicUsize,
    },
    WorkerPool {
        jobs: Sender<Job>,
    },
}

impl Executor {
    /// Executor spawning one thread per producer
    pub(crate) fn thread_per_task(thread_name: &str) -> Self {
        Self::ThreadPerTask {
            thread_name: thread_name.to_string(),
            spawned: AtomicUsize::new(0),
        }
    }

    /// Build the executor described by `config`
    pub(crate) fn from_config(config: &MapConfig) -> Result<Self> {
        match config.producer_strategy {
            ProducerStrategy::ThreadPerTask => Ok(Self::thread_per_task(&config.thread_name)),
            ProducerStrategy::WorkerPool { workers } => {
                let (jobs, queue) = channel::unbounded::<Job>();

                for id in 0..workers {
                    let queue = queue.clone();
                    thread::Builder::new()
                        .name(format!("{}-{}", config.thread_name, id))
                        .spawn(move || {
                            for job in queue.iter() {
                                job();
                            }
                            tracing::trace!("Producer worker {} exiting", id);
                        })
                        .map_err(|e| {
                            FutureKvError::Executor(format!("failed to start worker {}: {}", id, e))
                        })?;
                }

                tracing::debug!("Started producer pool with {} workers", workers);
                Ok(Self::WorkerPool { jobs })
            }
        }
    }

    /// Run `job` asynchronously
    ///
    /// On error the job has been dropped without running. That needs a failed
    /// thread spawn, or a pool whose every worker died on a panicking clone.
    pub(crate) fn submit(&self, job: Job) -> Result<()> {
        match self {
            Self::ThreadPerTask {
                thread_name,
                spawned,
            } => {
                let id = spawned.fetch_add(1, Ordering::Relaxed);
                thread::Builder::new()
                    .name(format!("{}-{}", thread_name, id))
                    .spawn(job)
                    .map(|_| ())
                    .map_err(|e| FutureKvError::Executor(format!("failed to spawn producer: {}", e)))
            }
            Self::WorkerPool { jobs } => jobs
                .send(job)
                .map_err(|_| FutureKvError::Executor("producer pool has no workers left".to_string())),
        }
    }
}
