// src/device/mod.rs

//! Asynchronous device operations as schedulable tasks.
//!
//! - [`stream`]: the stream contract and a thread-backed implementation.
//! - [`buffer`]: host/device buffers and their resources.
//! - [`copy`]: copy tasks, one per direction and layout.
//! - [`kernel`]: kernel launch tasks.

pub mod buffer;
pub mod copy;
pub mod kernel;
pub mod stream;

pub use buffer::{Buffer, Element, Layout, MemorySpace, from_bytes, to_bytes};
pub use copy::{CopyDirection, CopyPath, copy};
pub use kernel::launch;
pub use stream::{DeviceStream, SharedStream, SimStream, StreamEvent, StreamOp};
