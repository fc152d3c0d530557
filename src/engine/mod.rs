// src/engine/mod.rs

//! Scheduling engine.
//!
//! This module ties together:
//! - the task space and precedence graph (from [`crate::dag`])
//! - the per-category ready queues ([`queue`])
//! - the context a running task body sees ([`context`])
//!
//! The [`Scheduler`] is the single object everything else talks to: task
//! submission, worker registration, job hand-out and completion reporting.

pub mod context;
pub mod queue;
pub mod scheduler;

pub use context::{Completion, TaskContext, TaskScope};
pub use queue::JobQueues;
pub use scheduler::{Scheduler, SchedulerOptions, SchedulerStats, WorkerHandle};
