// src/exec/mod.rs

//! Worker threads.
//!
//! - [`worker`] is the loop one worker thread runs: fetch a job, run it, idle
//!   when there is nothing to do.
//! - [`pool`] owns a fixed set of worker threads and binds worker 0 to the
//!   network queue when there is more than one of them.

pub mod pool;
pub mod worker;

pub use pool::{WorkerPool, WorkerPoolConfig};
pub use worker::{WorkerReport, run_worker};
