// src/types.rs

//! Small value types shared across the scheduler layers.

use std::fmt;

/// Identifier handed back to a task's submitter.
///
/// Ids are strictly increasing and never reused, so comparing two ids tells
/// which task was declared first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a task. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskState {
    /// Allocated, accesses not yet registered in the graph.
    Uninitialized,
    /// Registered; waiting on predecessors.
    Pending,
    /// All predecessors are done; sitting in (or about to enter) a queue.
    Ready,
    /// Claimed by a worker, or handed off to hardware and not yet confirmed.
    Running,
    /// Terminal.
    Done,
}

impl TaskState {
    /// DOT fill color used by the graph export.
    pub fn color(self) -> &'static str {
        match self {
            TaskState::Uninitialized => "purple",
            TaskState::Pending => "brown",
            TaskState::Ready => "green",
            TaskState::Running => "yellow",
            TaskState::Done => "gray",
        }
    }
}

/// Worker/queue category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueKind {
    #[default]
    General,
    /// Reserved for network-progress work (sends, receives, completion waits).
    Network,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKind::General => f.write_str("general"),
            QueueKind::Network => f.write_str("network"),
        }
    }
}

/// Identifier of a registered worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}
