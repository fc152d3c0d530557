// src/exec/worker.rs

//! The loop every worker thread runs.

use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::engine::Scheduler;
use crate::types::{QueueKind, WorkerId};

/// Rounds of `yield_now` before an idle worker parks.
const SPIN_ROUNDS: u32 = 16;

/// What a worker did before it exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: WorkerId,
    pub queue: QueueKind,
    pub jobs_run: u64,
}

/// Register with `scheduler` on the calling thread, then pull and run jobs
/// until `stop` is set or the run is aborted.
///
/// An empty hand-out is normal: the worker yields a few times, then parks
/// for at most `idle`. The scheduler unparks registered workers whenever a
/// task is created or finishes.
pub fn run_worker(
    scheduler: &Scheduler,
    queue: QueueKind,
    stop: &AtomicBool,
    idle: Duration,
    registered: &Barrier,
) -> WorkerReport {
    let handle = scheduler.register_worker(queue);
    registered.wait();

    let mut jobs_run = 0u64;
    let mut idle_rounds = 0u32;

    loop {
        if stop.load(Ordering::Acquire) || scheduler.is_aborted() {
            break;
        }

        match scheduler.get_job(&handle) {
            Some(job) => {
                idle_rounds = 0;
                jobs_run += 1;
                if let Err(e) = scheduler.run_job(&handle, job) {
                    error!(
                        worker = %handle.id,
                        error = %e,
                        "worker stopping after fatal task error"
                    );
                    break;
                }
            }
            None => {
                idle_rounds = idle_rounds.saturating_add(1);
                if idle_rounds < SPIN_ROUNDS {
                    thread::yield_now();
                } else {
                    thread::park_timeout(idle);
                }
            }
        }
    }

    debug!(worker = %handle.id, jobs_run, "worker loop finished");
    info!(worker = %handle.id, queue = %queue, jobs_run, "worker exited");

    WorkerReport {
        id: handle.id,
        queue,
        jobs_run,
    }
}
