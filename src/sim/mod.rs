// src/sim/mod.rs

//! Demo workload driving the scheduler end to end.

pub mod stencil;

pub use stencil::{StencilParams, StencilReport, digest, initial_field, reference, run};
