// src/dag/mod.rs

//! Precedence graph and task bookkeeping.
//!
//! - [`graph`] holds the must-happen-before edges between active tasks.
//! - [`state_manager`] owns the task table, inserts tasks with their edges
//!   and drives the per-task state machine.
//! - [`task_info`] provides task properties, hints and ready jobs.
//! - [`graph_update`] defines the result type of a graph update.
//! - [`dot`] renders the graph for diagnostics.

pub mod dot;
pub mod graph;
pub mod graph_update;
pub mod state_manager;
pub mod task_info;

pub use graph::PrecedenceGraph;
pub use graph_update::GraphUpdate;
pub use state_manager::StateManager;
pub use task_info::{
    HintValue, Job, NETWORK_TASK, TaskBody, TaskProperties, TaskPropertiesBuilder,
};
