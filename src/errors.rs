// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Only fatal conditions live here. An empty queue or a stale precedence
//! graph is ordinary scheduling state and is never reported as an error.

use thiserror::Error;

use crate::types::TaskId;

/// Failure reported by a device or transport collaborator.
///
/// The core never interprets these; they are handed to the task body that
/// issued the operation, which decides whether to propagate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendFailure {
    #[error("device error: {0}")]
    Device(String),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum SchedError {
    /// A child task declared an access its enclosing task does not hold.
    #[error(
        "Not allowed: {parent} is no superset of {child}\n{parent} has access:\n{parent_access}\n\n{child} has access:\n{child_access}\ntrace:\n{}",
        .trace.join("\n")
    )]
    ScopingViolation {
        parent: String,
        child: String,
        parent_access: String,
        child_access: String,
        /// Labels of the enclosing task chain, innermost first.
        trace: Vec<String>,
    },

    #[error(transparent)]
    Backend(#[from] BackendFailure),

    /// Internal bookkeeping went wrong (state regression, overlapping
    /// exclusive access). Continuing would risk silently corrupt results.
    #[error("Scheduler invariant violated: {0}")]
    Invariant(String),

    #[error("Task {task} ({label}) panicked: {message}")]
    TaskPanicked {
        task: TaskId,
        label: String,
        message: String,
    },

    #[error("Run aborted: {0}")]
    Aborted(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SchedError>;
