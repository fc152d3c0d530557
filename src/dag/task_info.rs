// src/dag/task_info.rs

//! Task properties, per-task bookkeeping and ready jobs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::engine::TaskContext;
use crate::errors::{Result, SchedError};
use crate::resource::{Access, AccessSet, Resource};
use crate::types::{TaskId, TaskState};

/// Name of the built-in hint that routes a task to the network queue.
pub const NETWORK_TASK: &str = "network_task";

/// Work body of a task. Runs exactly once, on some worker thread.
pub type TaskBody = Box<dyn FnOnce(&TaskContext<'_>) -> Result<()> + Send + 'static>;

/// Value of a named scheduling hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintValue {
    Flag(bool),
    Int(i64),
    Text(String),
}

/// Everything a task declares up front: what it touches, what it is called,
/// and how it would like to be scheduled.
#[derive(Debug, Clone, Default)]
pub struct TaskProperties {
    pub label: String,
    pub access: AccessSet,
    pub hints: BTreeMap<String, HintValue>,
}

impl TaskProperties {
    pub fn builder() -> TaskPropertiesBuilder {
        TaskPropertiesBuilder::default()
    }

    pub fn hint(&self, name: &str) -> Option<&HintValue> {
        self.hints.get(name)
    }

    /// Whether the task wants the dedicated network worker.
    pub fn is_network_task(&self) -> bool {
        matches!(self.hints.get(NETWORK_TASK), Some(HintValue::Flag(true)))
    }
}

/// Fluent construction of [`TaskProperties`].
#[derive(Debug, Default)]
pub struct TaskPropertiesBuilder {
    props: TaskProperties,
}

impl TaskPropertiesBuilder {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.props.label = label.into();
        self
    }

    pub fn read(mut self, resource: &Resource) -> Self {
        self.props.access.push(Access::read(resource));
        self
    }

    pub fn write(mut self, resource: &Resource) -> Self {
        self.props.access.push(Access::write(resource));
        self
    }

    pub fn read_write(mut self, resource: &Resource) -> Self {
        self.props.access.push(Access::read_write(resource));
        self
    }

    pub fn access(mut self, access: Access) -> Self {
        self.props.access.push(access);
        self
    }

    pub fn hint(mut self, name: impl Into<String>, value: HintValue) -> Self {
        self.props.hints.insert(name.into(), value);
        self
    }

    pub fn network_task(self) -> Self {
        self.hint(NETWORK_TASK, HintValue::Flag(true))
    }

    pub fn build(self) -> TaskProperties {
        self.props
    }
}

/// Scheduler-side record of one task that has not been pruned yet.
pub(crate) struct TaskEntry {
    pub props: Arc<TaskProperties>,
    pub state: TaskState,
    /// Taken out when the task is routed to a queue.
    pub body: Option<TaskBody>,
    /// Enclosing task, for child tasks created from inside a body.
    pub parent: Option<TaskId>,
    /// Children that are not yet done. The task cannot be done before them.
    pub open_children: usize,
    /// The body has returned (or panicked) on its worker.
    pub body_returned: bool,
    /// Deferred completions still outstanding.
    pub awaiting: usize,
}

impl TaskEntry {
    pub fn new(props: Arc<TaskProperties>, body: TaskBody, parent: Option<TaskId>) -> Self {
        Self {
            props,
            state: TaskState::Uninitialized,
            body: Some(body),
            parent,
            open_children: 0,
            body_returned: false,
            awaiting: 0,
        }
    }

    /// Move the task forward in its lifecycle.
    pub fn advance(&mut self, id: TaskId, to: TaskState) -> Result<()> {
        if to <= self.state {
            return Err(SchedError::Invariant(format!(
                "task {id} ({}) cannot move from {:?} to {:?}",
                self.props.label, self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }

    /// All conditions for `Done` hold.
    pub fn can_finish(&self) -> bool {
        self.state == TaskState::Running
            && self.body_returned
            && self.open_children == 0
            && self.awaiting == 0
    }
}

impl fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskEntry")
            .field("label", &self.props.label)
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("open_children", &self.open_children)
            .field("body_returned", &self.body_returned)
            .field("awaiting", &self.awaiting)
            .finish_non_exhaustive()
    }
}

/// A ready task bound for a worker.
pub struct Job {
    pub id: TaskId,
    pub props: Arc<TaskProperties>,
    pub(crate) body: TaskBody,
}

impl Job {
    pub fn label(&self) -> &str {
        &self.props.label
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("label", &self.props.label)
            .field("network", &self.props.is_network_task())
            .finish_non_exhaustive()
    }
}
