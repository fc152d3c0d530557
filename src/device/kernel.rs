// src/device/kernel.rs

use std::sync::Arc;

use tracing::debug;

use crate::dag::TaskProperties;
use crate::device::stream::SharedStream;
use crate::engine::{TaskContext, TaskScope};
use crate::errors::{BackendFailure, Result};
use crate::types::TaskId;

/// Declare a kernel launch as a task.
///
/// The body enqueues `kernel` on `stream` and returns; the task becomes done
/// once the stream has run it. `props` must list every resource the kernel
/// touches.
pub fn launch<S, K>(
    scope: &S,
    stream: &SharedStream,
    props: TaskProperties,
    kernel: K,
) -> Result<TaskId>
where
    S: TaskScope + ?Sized,
    K: FnOnce() -> std::result::Result<(), BackendFailure> + Send + 'static,
{
    let stream = Arc::clone(stream);
    scope.spawn(
        props,
        Box::new(move |ctx: &TaskContext<'_>| {
            debug!(
                task = %ctx.id(),
                label = %ctx.label(),
                stream = %stream.name(),
                "launch kernel"
            );
            stream.enqueue(Box::new(kernel))?;
            ctx.complete_when(stream.record_event()?)
        }),
    )
}
