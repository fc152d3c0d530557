// src/engine/context.rs

//! What a running task body sees of the scheduler.

use crate::dag::{TaskBody, TaskProperties};
use crate::engine::scheduler::Scheduler;
use crate::errors::{BackendFailure, Result};
use crate::types::{QueueKind, TaskId, WorkerId};

/// A pollable confirmation that some asynchronous operation finished.
///
/// Implemented by device stream events and transport requests. Polled by
/// workers whenever they ask for a job; must never block.
pub trait Completion: Send {
    /// `Ok(true)` once the operation has finished.
    fn poll(&mut self) -> std::result::Result<bool, BackendFailure>;
}

/// Anything tasks can be created from: the scheduler itself (top-level
/// tasks) or a running task (children, checked against the parent's
/// accesses).
pub trait TaskScope {
    fn spawn(&self, props: TaskProperties, body: TaskBody) -> Result<TaskId>;

    fn scheduler(&self) -> &Scheduler;
}

impl TaskScope for Scheduler {
    fn spawn(&self, props: TaskProperties, body: TaskBody) -> Result<TaskId> {
        self.insert(props, body, None)
    }

    fn scheduler(&self) -> &Scheduler {
        self
    }
}

/// Handed to every task body for the duration of its run.
pub struct TaskContext<'a> {
    pub(crate) scheduler: &'a Scheduler,
    pub(crate) id: TaskId,
    pub(crate) props: &'a TaskProperties,
    pub(crate) worker: WorkerId,
    pub(crate) queue: QueueKind,
}

impl TaskContext<'_> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.props.label
    }

    pub fn properties(&self) -> &TaskProperties {
        self.props
    }

    /// Worker running this body.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Queue the job was taken from.
    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    /// Create a child task.
    ///
    /// The child's accesses must be a subset of this task's; otherwise a
    /// [`ScopingViolation`](crate::errors::SchedError::ScopingViolation) is
    /// returned immediately. This task is not done before the child is.
    pub fn create<F>(&self, props: TaskProperties, body: F) -> Result<TaskId>
    where
        F: FnOnce(&TaskContext<'_>) -> Result<()> + Send + 'static,
    {
        self.scheduler.insert(props, Box::new(body), Some(self.id))
    }

    /// Defer this task's completion until `completion` confirms.
    ///
    /// The body may return right after calling this; its worker is then free
    /// for other jobs while the task stays running.
    pub fn complete_when<C>(&self, completion: C) -> Result<()>
    where
        C: Completion + 'static,
    {
        self.scheduler.defer(self.id, Box::new(completion))
    }
}

impl TaskScope for TaskContext<'_> {
    fn spawn(&self, props: TaskProperties, body: TaskBody) -> Result<TaskId> {
        self.scheduler.insert(props, body, Some(self.id))
    }

    fn scheduler(&self) -> &Scheduler {
        self.scheduler
    }
}
