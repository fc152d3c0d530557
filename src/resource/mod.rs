// src/resource/mod.rs

//! Logical resources and the conflict test between access sets.
//!
//! - [`registry`] hands out resource identities.
//! - [`access`] defines resources, access modes and access sets.
//! - [`conflict`] decides whether two access sets must be serialized and
//!   validates hierarchical scoping of child tasks.

pub mod access;
pub mod conflict;
pub mod registry;

pub use access::{Access, AccessMode, AccessSet, Resource, ResourceId, Span};
pub use conflict::{assert_superset, conflict_between, is_serial, is_superset, Conflict};
pub use registry::ResourceRegistry;
