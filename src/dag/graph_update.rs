// src/dag/graph_update.rs

//! Result type of a single precedence-graph update.

use crate::types::TaskId;

/// What one call to
/// [`StateManager::update_graph`](crate::dag::StateManager::update_graph)
/// changed.
///
/// Useful for tests that step the scheduler by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphUpdate {
    /// Tasks that became ready, in declaration order.
    pub newly_ready: Vec<TaskId>,
    /// Done tasks dropped from conflict checking.
    pub pruned: Vec<TaskId>,
}

impl GraphUpdate {
    pub fn is_empty(&self) -> bool {
        self.newly_ready.is_empty() && self.pruned.is_empty()
    }
}
