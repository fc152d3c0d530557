// src/dag/state_manager.rs

//! Task table, precedence graph and per-task state transitions.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::dag::graph::PrecedenceGraph;
use crate::dag::graph_update::GraphUpdate;
use crate::dag::task_info::{Job, TaskBody, TaskEntry, TaskProperties};
use crate::engine::Completion;
use crate::errors::{Result, SchedError};
use crate::resource::{assert_superset, conflict_between};
use crate::types::{TaskId, TaskState};

/// Owns every task that has not yet been pruned, plus the edges between them.
///
/// All methods expect to be called with the owning scheduler's space lock
/// held; nothing in here synchronizes on its own.
#[derive(Default)]
pub struct StateManager {
    next_id: u64,
    tasks: BTreeMap<TaskId, TaskEntry>,
    graph: PrecedenceGraph,
    deferred: Vec<(TaskId, Box<dyn Completion>)>,
    done_total: u64,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and compute its incoming edges.
    ///
    /// Top-level tasks are compared against every active task. A child is
    /// compared only against active descendants of its parent: its ancestors
    /// are running and already hold its resources, and anything declared
    /// later outside the parent's scope is ordered after the parent, whose
    /// completion waits for the child.
    pub fn insert(
        &mut self,
        props: TaskProperties,
        body: TaskBody,
        parent: Option<TaskId>,
    ) -> Result<TaskId> {
        if let Some(pid) = parent {
            self.check_scope(pid, &props)?;
        }

        let id = TaskId(self.next_id);
        self.next_id += 1;

        let props = Arc::new(props);
        let mut entry = TaskEntry::new(Arc::clone(&props), body, parent);
        self.graph.add_task(id);

        let candidates: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, other)| other.state != TaskState::Done)
            .map(|(other_id, _)| *other_id)
            .filter(|other_id| match parent {
                None => true,
                Some(pid) => self.is_descendant_of(*other_id, pid),
            })
            .collect();

        for other_id in candidates {
            let Some(other) = self.tasks.get(&other_id) else {
                continue;
            };
            if let Some(conflict) = conflict_between(&other.props.access, &props.access) {
                trace!(
                    from = %other_id,
                    to = %id,
                    %conflict,
                    "adding precedence edge"
                );
                self.graph.add_edge(other_id, id, conflict);
            }
        }

        if let Some(pid) = parent {
            if let Some(p) = self.tasks.get_mut(&pid) {
                p.open_children += 1;
            }
        }

        entry.advance(id, TaskState::Pending)?;
        debug!(
            task = %id,
            label = %props.label,
            parent = ?parent,
            network = props.is_network_task(),
            "task registered"
        );
        self.tasks.insert(id, entry);

        Ok(id)
    }

    /// Mark pending tasks whose predecessors are all done as ready.
    ///
    /// Done tasks stay in the graph until [`prune_done`](Self::prune_done) so
    /// that a dump taken in between still shows them. Calling this twice
    /// without an intervening change returns an empty update the second time
    /// and never adds edges.
    pub fn update_graph(&mut self) -> GraphUpdate {
        let mut update = GraphUpdate::default();

        let pending: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, e)| e.state == TaskState::Pending)
            .map(|(id, _)| *id)
            .collect();

        for id in pending {
            let all_done = self.graph.predecessors(id).all(|pred| {
                self.tasks
                    .get(&pred)
                    .is_none_or(|p| p.state == TaskState::Done)
            });
            if !all_done {
                continue;
            }
            if let Some(entry) = self.tasks.get_mut(&id) {
                // Pending → Ready is always forward.
                entry.state = TaskState::Ready;
                update.newly_ready.push(id);
            }
        }

        update
    }

    /// Drop done tasks from the graph and the task table.
    pub fn prune_done(&mut self, update: &mut GraphUpdate) {
        let done: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, e)| e.state == TaskState::Done)
            .map(|(id, _)| *id)
            .collect();

        for id in done {
            self.graph.remove(id);
            self.tasks.remove(&id);
            update.pruned.push(id);
        }
    }

    /// Take the body of a ready task so it can be queued.
    pub fn take_job(&mut self, id: TaskId) -> Option<Job> {
        let entry = self.tasks.get_mut(&id)?;
        if entry.state != TaskState::Ready {
            warn!(task = %id, state = ?entry.state, "asked to queue a task that is not ready");
            return None;
        }
        let body = entry.body.take()?;
        Some(Job {
            id,
            props: Arc::clone(&entry.props),
            body,
        })
    }

    pub fn mark_running(&mut self, id: TaskId) -> Result<()> {
        let entry = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| SchedError::Invariant(format!("running unknown task {id}")))?;
        entry.advance(id, TaskState::Running)
    }

    /// The body of `id` returned. Returns the tasks that became done as a
    /// consequence (the task itself and possibly ancestors).
    pub fn body_returned(&mut self, id: TaskId) -> Result<Vec<TaskId>> {
        let entry = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| SchedError::Invariant(format!("completion of unknown task {id}")))?;
        entry.body_returned = true;
        self.finish_chain(id)
    }

    /// Keep `id` running until `completion` reports success.
    pub fn defer(&mut self, id: TaskId, completion: Box<dyn Completion>) -> Result<()> {
        let entry = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| SchedError::Invariant(format!("deferring unknown task {id}")))?;
        if entry.state != TaskState::Running || entry.body_returned {
            return Err(SchedError::Invariant(format!(
                "task {id} ({}) can only defer its completion from inside its body",
                entry.props.label
            )));
        }
        entry.awaiting += 1;
        self.deferred.push((id, completion));
        Ok(())
    }

    /// Poll outstanding deferred completions. Returns tasks that became done.
    pub fn poll_deferred(&mut self) -> Result<Vec<TaskId>> {
        if self.deferred.is_empty() {
            return Ok(Vec::new());
        }

        let mut confirmed = Vec::new();
        let mut still_waiting = Vec::with_capacity(self.deferred.len());

        for (id, mut completion) in self.deferred.drain(..) {
            if completion.poll()? {
                confirmed.push(id);
            } else {
                still_waiting.push((id, completion));
            }
        }
        self.deferred = still_waiting;

        let mut finished = Vec::new();
        for id in confirmed {
            if let Some(entry) = self.tasks.get_mut(&id) {
                entry.awaiting = entry.awaiting.saturating_sub(1);
                trace!(task = %id, "deferred completion confirmed");
            }
            finished.extend(self.finish_chain(id)?);
        }
        Ok(finished)
    }

    /// Walk up from `id`, marking every task whose conditions for done now
    /// hold.
    fn finish_chain(&mut self, id: TaskId) -> Result<Vec<TaskId>> {
        let mut finished = Vec::new();
        let mut cursor = Some(id);

        while let Some(current) = cursor.take() {
            let Some(entry) = self.tasks.get_mut(&current) else {
                break;
            };
            if !entry.can_finish() {
                break;
            }
            entry.advance(current, TaskState::Done)?;
            self.done_total += 1;
            finished.push(current);
            debug!(task = %current, label = %entry.props.label, "task done");

            if let Some(pid) = entry.parent {
                if let Some(parent) = self.tasks.get_mut(&pid) {
                    parent.open_children = parent.open_children.saturating_sub(1);
                    cursor = Some(pid);
                }
            }
        }

        Ok(finished)
    }

    /// Fail with a scoping violation unless `parent` holds every access
    /// `props` asks for.
    fn check_scope(&self, parent: TaskId, props: &TaskProperties) -> Result<()> {
        let p = self.tasks.get(&parent).ok_or_else(|| {
            SchedError::Invariant(format!("child declared under unknown task {parent}"))
        })?;
        if p.state != TaskState::Running {
            return Err(SchedError::Invariant(format!(
                "child tasks can only be created while {parent} ({}) is running",
                p.props.label
            )));
        }
        assert_superset(
            &p.props.label,
            &p.props.access,
            &props.label,
            &props.access,
            self.trace_of(parent),
        )
    }

    /// Labels of `id` and its enclosing tasks, innermost first.
    pub fn trace_of(&self, id: TaskId) -> Vec<String> {
        let mut trace = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.tasks.get(&current) {
                Some(entry) => {
                    trace.push(format!("[{current}] {}", entry.props.label));
                    cursor = entry.parent;
                }
                None => break,
            }
        }
        trace
    }

    fn is_descendant_of(&self, id: TaskId, ancestor: TaskId) -> bool {
        let mut cursor = self.tasks.get(&id).and_then(|e| e.parent);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.tasks.get(&current).and_then(|e| e.parent);
        }
        false
    }

    /// State of a task. Pruned tasks report `Done`; ids never handed out
    /// report `None`.
    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        match self.tasks.get(&id) {
            Some(entry) => Some(entry.state),
            None if id.0 < self.next_id => Some(TaskState::Done),
            None => None,
        }
    }

    pub fn label_of(&self, id: TaskId) -> Option<&str> {
        self.tasks.get(&id).map(|e| e.props.label.as_str())
    }

    /// Tasks that are not done yet.
    pub fn active_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|e| e.state != TaskState::Done)
            .count()
    }

    /// Id, label and state of every task still in the table, in id order.
    pub fn active_tasks(&self) -> Vec<(TaskId, String, TaskState)> {
        self.tasks
            .iter()
            .filter(|(_, e)| e.state != TaskState::Done)
            .map(|(id, e)| (*id, e.props.label.clone(), e.state))
            .collect()
    }

    pub fn all_done(&self) -> bool {
        self.active_count() == 0
    }

    pub fn created_total(&self) -> u64 {
        self.next_id
    }

    pub fn done_total(&self) -> u64 {
        self.done_total
    }

    pub fn graph(&self) -> &PrecedenceGraph {
        &self.graph
    }

    pub(crate) fn entries(&self) -> &BTreeMap<TaskId, TaskEntry> {
        &self.tasks
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("next_id", &self.next_id)
            .field("tasks", &self.tasks)
            .field("graph", &self.graph)
            .field("deferred", &self.deferred.len())
            .field("done_total", &self.done_total)
            .finish()
    }
}
