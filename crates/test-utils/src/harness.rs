use std::sync::Arc;
use std::time::Duration;

use depflow::engine::{Scheduler, SchedulerOptions};
use depflow::errors::Result;
use depflow::exec::{WorkerPool, WorkerPoolConfig, WorkerReport};

/// A scheduler with a running worker pool.
pub struct Harness {
    pub scheduler: Arc<Scheduler>,
    pool: WorkerPool,
}

impl Harness {
    /// `workers` threads; worker 0 serves the network queue when there is
    /// more than one.
    pub fn start(workers: usize) -> Self {
        Self::with_options(workers, SchedulerOptions::default())
    }

    pub fn with_options(workers: usize, options: SchedulerOptions) -> Self {
        let scheduler = Arc::new(Scheduler::new(options));
        let config = WorkerPoolConfig {
            workers,
            dedicated_network_worker: true,
            idle_timeout: Duration::from_micros(100),
        };
        let pool = WorkerPool::start(Arc::clone(&scheduler), config)
            .expect("failed to start worker pool");
        Self { scheduler, pool }
    }

    /// Wait for every task to finish, then stop the workers.
    pub fn finish(self) -> (Result<()>, Vec<WorkerReport>) {
        let result = self.scheduler.wait_idle();
        let reports = self.pool.shutdown();
        (result, reports)
    }
}
