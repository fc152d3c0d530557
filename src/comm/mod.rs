// src/comm/mod.rs

//! Communication that overlaps with compute.
//!
//! - [`transport`]: the messaging contract and an in-process loopback world.
//! - [`exchange`]: buffers and request slot for one direction of a halo.
//! - [`send`]: send/receive composed from copy, network and wait tasks.

pub mod exchange;
pub mod send;
pub mod transport;

pub use exchange::Exchange;
pub use send::{receive, send};
pub use transport::{
    LoopbackTransport, Rank, Request, SharedTransport, Tag, Transport, TransportError,
};
