// src/exec/pool.rs

//! Fixed pool of worker threads.
//!
//! The scheduler itself never creates threads. `WorkerPool` is the default
//! owner of the worker threads: it spawns them, lets each register for its
//! queue category, and stops and joins them on shutdown. Tests that want to
//! step the scheduler by hand can skip the pool and call
//! [`Scheduler::register_worker`] / [`Scheduler::get_job`] /
//! [`Scheduler::run_job`] themselves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Scheduler;
use crate::errors::Result;
use crate::exec::worker::{WorkerReport, run_worker};
use crate::types::QueueKind;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Bind worker 0 to the network queue when there is more than one worker.
    pub dedicated_network_worker: bool,
    /// Upper bound on how long an idle worker parks before polling again.
    pub idle_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            dedicated_network_worker: true,
            idle_timeout: Duration::from_micros(200),
        }
    }
}

impl WorkerPoolConfig {
    /// Queue category served by worker `index`.
    pub fn queue_for(&self, index: usize) -> QueueKind {
        if index == 0 && self.workers > 1 && self.dedicated_network_worker {
            QueueKind::Network
        } else {
            QueueKind::General
        }
    }
}

pub struct WorkerPool {
    stop: Arc<AtomicBool>,
    threads: Vec<Thread>,
    handles: Vec<JoinHandle<WorkerReport>>,
}

impl WorkerPool {
    /// Spawn the workers and wait until every one of them has registered, so
    /// queue routing sees the final thread count from the first job on.
    pub fn start(scheduler: Arc<Scheduler>, config: WorkerPoolConfig) -> Result<Self> {
        let workers = config.workers.max(1);
        let stop = Arc::new(AtomicBool::new(false));
        let registered = Arc::new(Barrier::new(workers + 1));

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let queue = config.queue_for(index);
            let scheduler = Arc::clone(&scheduler);
            let stop = Arc::clone(&stop);
            let registered = Arc::clone(&registered);
            let idle = config.idle_timeout;

            let handle = thread::Builder::new()
                .name(format!("depflow-{queue}-{index}"))
                .spawn(move || run_worker(&scheduler, queue, &stop, idle, &registered))?;
            handles.push(handle);
        }

        registered.wait();

        let threads = handles.iter().map(|h| h.thread().clone()).collect();
        info!(workers, "worker pool started");

        Ok(Self {
            stop,
            threads,
            handles,
        })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every worker after its current job and join them.
    pub fn shutdown(self) -> Vec<WorkerReport> {
        self.stop.store(true, Ordering::Release);
        for t in &self.threads {
            t.unpark();
        }

        let mut reports = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.join() {
                Ok(report) => reports.push(report),
                Err(_) => warn!("worker thread panicked outside of a task"),
            }
        }

        info!(workers = reports.len(), "worker pool stopped");
        reports
    }
}
