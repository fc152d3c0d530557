// src/dag/graph.rs

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;

use crate::resource::Conflict;
use crate::types::TaskId;

/// Must-happen-before edges among tasks that are not yet pruned.
///
/// Edges only ever point from an earlier-created task to a later-created
/// one, so the graph is acyclic by construction. Each edge is weighted with
/// the kind of conflict that induced it (used by the DOT export).
#[derive(Debug, Clone, Default)]
pub struct PrecedenceGraph {
    graph: DiGraphMap<TaskId, Conflict>,
}

impl PrecedenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, id: TaskId) {
        self.graph.add_node(id);
    }

    /// Record that `earlier` must be done before `later` may start.
    pub fn add_edge(&mut self, earlier: TaskId, later: TaskId, conflict: Conflict) {
        debug_assert!(earlier < later, "edges must follow declaration order");
        self.graph.add_edge(earlier, later, conflict);
    }

    /// Drop a task together with all of its edges.
    pub fn remove(&mut self, id: TaskId) -> bool {
        self.graph.remove_node(id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.graph.contains_node(id)
    }

    /// Direct predecessors of `id`.
    pub fn predecessors(&self, id: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.graph.neighbors_directed(id, Direction::Incoming)
    }

    /// Direct successors of `id`.
    pub fn successors(&self, id: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.graph.neighbors_directed(id, Direction::Outgoing)
    }

    pub fn edge(&self, earlier: TaskId, later: TaskId) -> Option<Conflict> {
        self.graph.edge_weight(earlier, later).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Underlying petgraph structure, for rendering.
    pub(crate) fn inner(&self) -> &DiGraphMap<TaskId, Conflict> {
        &self.graph
    }
}
