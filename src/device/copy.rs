// src/device/copy.rs

//! Copy tasks between host and device buffers.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::dag::TaskProperties;
use crate::device::buffer::{Buffer, Element, Layout, MemorySpace};
use crate::device::stream::SharedStream;
use crate::engine::{TaskContext, TaskScope};
use crate::errors::{BackendFailure, Result, SchedError};
use crate::types::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyDirection {
    DeviceToDevice,
    DeviceToHost,
    HostToDevice,
    HostToHost,
}

impl CopyDirection {
    pub fn between(dst: MemorySpace, src: MemorySpace) -> Self {
        match (src, dst) {
            (MemorySpace::Device, MemorySpace::Device) => CopyDirection::DeviceToDevice,
            (MemorySpace::Device, MemorySpace::Host) => CopyDirection::DeviceToHost,
            (MemorySpace::Host, MemorySpace::Device) => CopyDirection::HostToDevice,
            (MemorySpace::Host, MemorySpace::Host) => CopyDirection::HostToHost,
        }
    }

    /// Task label used for copies in this direction.
    pub fn label(self) -> &'static str {
        match self {
            CopyDirection::DeviceToDevice => "copyDeviceToDevice",
            CopyDirection::DeviceToHost => "copyDeviceToHost",
            CopyDirection::HostToDevice => "copyHostToDevice",
            CopyDirection::HostToHost => "copyHostToHost",
        }
    }
}

impl fmt::Display for CopyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the elements are moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyPath {
    /// Both sides one-dimensional: a single flat run of elements.
    Contiguous,
    /// Row by row, honoring each side's pitch.
    Pitched2d,
    /// Slice by slice and row by row, honoring pitches and offsets.
    Volume3d,
}

impl CopyPath {
    pub fn select(dst: &Layout, src: &Layout) -> Self {
        match dst.dim().max(src.dim()) {
            1 => CopyPath::Contiguous,
            2 => CopyPath::Pitched2d,
            _ => CopyPath::Volume3d,
        }
    }

    /// Move the `size` region from `src` to `dst` storage.
    pub fn execute<T: Element>(
        self,
        dst_layout: &Layout,
        dst: &mut [T],
        src_layout: &Layout,
        src: &[T],
        size: [usize; 3],
    ) -> std::result::Result<(), BackendFailure> {
        match self {
            CopyPath::Contiguous => {
                let n: usize = size.iter().product();
                let (d0, s0) = (dst_layout.index(0, 0, 0), src_layout.index(0, 0, 0));
                let (Some(out), Some(inp)) = (dst.get_mut(d0..d0 + n), src.get(s0..s0 + n)) else {
                    return Err(out_of_bounds(self, size));
                };
                out.copy_from_slice(inp);
            }
            CopyPath::Pitched2d | CopyPath::Volume3d => {
                let [w, h, d] = size;
                let depth = if self == CopyPath::Pitched2d { d.min(1) } else { d };
                for z in 0..depth {
                    for y in 0..h {
                        let (dr, sr) = (dst_layout.index(0, y, z), src_layout.index(0, y, z));
                        let (Some(out), Some(inp)) = (dst.get_mut(dr..dr + w), src.get(sr..sr + w))
                        else {
                            return Err(out_of_bounds(self, size));
                        };
                        out.copy_from_slice(inp);
                    }
                }
            }
        }
        Ok(())
    }
}

fn out_of_bounds(path: CopyPath, size: [usize; 3]) -> BackendFailure {
    BackendFailure::Device(format!("{path:?} copy of {size:?} runs past buffer storage"))
}

/// Declare a copy from `src` to `dst` as one task.
///
/// The task reads `src`'s payload and size and writes `dst`'s payload and
/// size. Its body sets the destination size from the source size and
/// enqueues the copy on `stream`. Copies into host memory wait for the
/// stream before the body returns; every other direction returns at once
/// and the task stays running until the stream reaches the copy.
pub fn copy<S, T>(
    scope: &S,
    stream: &SharedStream,
    dst: &Arc<Buffer<T>>,
    src: &Arc<Buffer<T>>,
) -> Result<TaskId>
where
    S: TaskScope + ?Sized,
    T: Element,
{
    if Arc::ptr_eq(dst, src) {
        return Err(SchedError::Invariant(format!(
            "buffer '{}' cannot be copied onto itself",
            src.name()
        )));
    }

    let direction = CopyDirection::between(dst.space(), src.space());
    let props = TaskProperties::builder()
        .label(direction.label())
        .read(src.data_resource())
        .read(src.size_resource())
        .write(dst.data_resource())
        .write(dst.size_resource())
        .build();

    let stream = Arc::clone(stream);
    let dst = Arc::clone(dst);
    let src = Arc::clone(src);

    scope.spawn(
        props,
        Box::new(move |ctx: &TaskContext<'_>| {
            let size = src.current_size()?;
            dst.set_current_size(size)?;

            let path = CopyPath::select(dst.layout(), src.layout());
            debug!(
                task = %ctx.id(),
                direction = %direction,
                path = ?path,
                src = %src.name(),
                dst = %dst.name(),
                "enqueue copy"
            );

            stream.enqueue(Box::new(move || {
                let input = src
                    .read()
                    .map_err(|e| BackendFailure::Device(e.to_string()))?;
                let mut output = dst
                    .write()
                    .map_err(|e| BackendFailure::Device(e.to_string()))?;
                trace!(src = %src.name(), dst = %dst.name(), "copy running on stream");
                path.execute(dst.layout(), &mut output, src.layout(), &input, size)
            }))?;

            if direction == CopyDirection::DeviceToHost {
                stream.synchronize()?;
            } else {
                ctx.complete_when(stream.record_event()?)?;
            }
            Ok(())
        }),
    )
}
