// src/dag/dot.rs

//! Graphviz rendering of the precedence graph.
//!
//! Purely observational: nodes are labelled `[id] label` and filled with the
//! color of their state, edges carry the conflict kind that induced them.

use std::fs;
use std::path::{Path, PathBuf};

use petgraph::dot::{Config, Dot};
use tracing::debug;

use crate::dag::state_manager::StateManager;
use crate::errors::Result;
use crate::types::TaskState;

/// Render the current graph as a DOT document.
pub fn render(space: &StateManager) -> String {
    let entries = space.entries();
    let graph = space.graph().inner();

    format!(
        "{}",
        Dot::with_attr_getters(
            graph,
            &[Config::NodeNoLabel],
            &|_, _| String::new(),
            &|_, (id, _)| {
                let (label, state) = entries
                    .get(&id)
                    .map(|e| (e.props.label.as_str(), e.state))
                    .unwrap_or(("?", TaskState::Done));
                format!(
                    "label = \"[{id}] {}\" style = filled fillcolor = {}",
                    escape(label),
                    state.color()
                )
            },
        )
    )
}

/// Write `step_<step>.dot` into `dir`, creating the directory if needed.
pub fn write_step(space: &StateManager, dir: &Path, step: u64) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("step_{step}.dot"));
    fs::write(&path, render(space))?;
    debug!(path = %path.display(), "wrote precedence graph");
    Ok(path)
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
