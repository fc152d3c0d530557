// src/device/buffer.rs

//! Typed buffers living in host or device memory.
//!
//! A buffer is declared to the scheduler through two resources: one for its
//! payload and one for its current size. Tasks that touch either must list
//! the matching access. The payload itself sits behind a lock that is only
//! ever try-locked: a failed attempt means two conflicting tasks are running
//! at once, which the precedence graph is supposed to rule out.

use std::fmt;
use std::ops::Range;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use crate::errors::{Result, SchedError};
use crate::resource::{Resource, ResourceRegistry};

/// Plain element types buffers can hold and transports can carry.
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const SIZE: usize;

    fn write_le(&self, out: &mut Vec<u8>);

    fn read_le(bytes: &[u8]) -> Option<Self>;
}

macro_rules! impl_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn write_le(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Option<Self> {
                    bytes.try_into().ok().map(<$t>::from_le_bytes)
                }
            }
        )*
    };
}

impl_element!(u8, u32, u64, i32, i64, f32, f64);

/// Encode a slice of elements as little-endian bytes.
pub fn to_bytes<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::SIZE);
    for v in values {
        v.write_le(&mut out);
    }
    out
}

/// Decode little-endian bytes; `None` if the length is not a whole number of
/// elements.
pub fn from_bytes<T: Element>(bytes: &[u8]) -> Option<Vec<T>> {
    if T::SIZE == 0 || bytes.len() % T::SIZE != 0 {
        return None;
    }
    bytes.chunks_exact(T::SIZE).map(T::read_le).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemorySpace {
    Host,
    Device,
}

impl fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemorySpace::Host => f.write_str("Host"),
            MemorySpace::Device => f.write_str("Device"),
        }
    }
}

/// Shape of a buffer's storage and the region it exposes.
///
/// Storage is row-major with `pitch` elements per row and `slice_rows` rows
/// per 2-D slice. The exposed region has size `extent` and starts at
/// `offset` inside the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    dim: usize,
    extent: [usize; 3],
    pitch: usize,
    slice_rows: usize,
    offset: [usize; 3],
}

impl Layout {
    /// One-dimensional, densely packed.
    pub fn linear(len: usize) -> Self {
        Self {
            dim: 1,
            extent: [len, 1, 1],
            pitch: len,
            slice_rows: 1,
            offset: [0; 3],
        }
    }

    /// Two-dimensional with rows padded to `pitch` elements.
    pub fn pitched(width: usize, height: usize, pitch: usize) -> Result<Self> {
        if pitch < width {
            return Err(SchedError::Invariant(format!(
                "row pitch {pitch} is smaller than row width {width}"
            )));
        }
        Ok(Self {
            dim: 2,
            extent: [width, height, 1],
            pitch,
            slice_rows: height,
            offset: [0; 3],
        })
    }

    /// Three-dimensional with padded rows and padded slices.
    pub fn volume(extent: [usize; 3], pitch: usize, slice_rows: usize) -> Result<Self> {
        if pitch < extent[0] || slice_rows < extent[1] {
            return Err(SchedError::Invariant(format!(
                "storage {pitch}x{slice_rows} cannot hold a {}x{} slice",
                extent[0], extent[1]
            )));
        }
        Ok(Self {
            dim: 3,
            extent,
            pitch,
            slice_rows,
            offset: [0; 3],
        })
    }

    /// Shift the exposed region inside storage. Storage grows to fit.
    pub fn with_offset(mut self, offset: [usize; 3]) -> Self {
        self.offset = offset;
        self.pitch = self.pitch.max(offset[0] + self.extent[0]);
        if self.dim > 1 {
            self.slice_rows = self.slice_rows.max(offset[1] + self.extent[1]);
        }
        self
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn extent(&self) -> [usize; 3] {
        self.extent
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn slice_rows(&self) -> usize {
        self.slice_rows
    }

    pub fn offset(&self) -> [usize; 3] {
        self.offset
    }

    /// Elements in the exposed region.
    pub fn element_count(&self) -> usize {
        self.extent.iter().product()
    }

    /// Elements of backing storage, padding included.
    pub fn storage_len(&self) -> usize {
        let depth = self.offset[2] + self.extent[2];
        self.pitch * self.slice_rows * depth
    }

    /// Storage index of region coordinate `(x, y, z)`.
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        let (x, y, z) = (x + self.offset[0], y + self.offset[1], z + self.offset[2]);
        (z * self.slice_rows + y) * self.pitch + x
    }
}

/// A typed buffer plus the resources tasks declare to touch it.
pub struct Buffer<T> {
    name: String,
    space: MemorySpace,
    layout: Layout,
    data_resource: Resource,
    size_resource: Resource,
    data: RwLock<Vec<T>>,
    /// Extent of the valid region; starts out as the full layout extent.
    current_size: RwLock<[usize; 3]>,
}

impl<T: Element> Buffer<T> {
    pub fn new(
        registry: &ResourceRegistry,
        name: impl Into<String>,
        space: MemorySpace,
        layout: Layout,
    ) -> Self {
        let name = name.into();
        let data_resource = registry.register(&format!("{name}.data"));
        let size_resource = registry.register(&format!("{name}.size"));
        Self {
            data: RwLock::new(vec![T::default(); layout.storage_len()]),
            current_size: RwLock::new(layout.extent()),
            name,
            space,
            layout,
            data_resource,
            size_resource,
        }
    }

    pub fn host(registry: &ResourceRegistry, name: impl Into<String>, layout: Layout) -> Self {
        Self::new(registry, name, MemorySpace::Host, layout)
    }

    pub fn device(registry: &ResourceRegistry, name: impl Into<String>, layout: Layout) -> Self {
        Self::new(registry, name, MemorySpace::Device, layout)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space(&self) -> MemorySpace {
        self.space
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn data_resource(&self) -> &Resource {
        &self.data_resource
    }

    pub fn size_resource(&self) -> &Resource {
        &self.size_resource
    }

    /// Payload resource narrowed to storage elements `range`.
    pub fn data_slice(&self, range: Range<usize>) -> Resource {
        self.data_resource.slice(range)
    }

    /// Shared access to the raw storage.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, Vec<T>>> {
        match self.data.try_read() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner()),
            Err(TryLockError::WouldBlock) => Err(self.overlap("read")),
        }
    }

    /// Exclusive access to the raw storage.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<T>>> {
        match self.data.try_write() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner()),
            Err(TryLockError::WouldBlock) => Err(self.overlap("write")),
        }
    }

    pub fn current_size(&self) -> Result<[usize; 3]> {
        match self.current_size.try_read() {
            Ok(size) => Ok(*size),
            Err(TryLockError::Poisoned(p)) => Ok(*p.into_inner()),
            Err(TryLockError::WouldBlock) => Err(self.overlap("read size of")),
        }
    }

    pub fn set_current_size(&self, size: [usize; 3]) -> Result<()> {
        let fits = size.iter().zip(self.layout.extent()).all(|(s, e)| *s <= e);
        if !fits {
            return Err(SchedError::Invariant(format!(
                "size {size:?} exceeds the extent {:?} of buffer '{}'",
                self.layout.extent(),
                self.name
            )));
        }
        let mut guard = match self.current_size.try_write() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(self.overlap("resize")),
        };
        *guard = size;
        Ok(())
    }

    /// Elements of the exposed region in row-major order, padding skipped.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let data = self.read()?;
        let [w, h, d] = self.layout.extent();
        let mut out = Vec::with_capacity(w * h * d);
        for z in 0..d {
            for y in 0..h {
                let row = self.layout.index(0, y, z);
                out.extend_from_slice(&data[row..row + w]);
            }
        }
        Ok(out)
    }

    /// Overwrite the exposed region from row-major `values`.
    pub fn fill_from(&self, values: &[T]) -> Result<()> {
        if values.len() != self.layout.element_count() {
            return Err(SchedError::Invariant(format!(
                "buffer '{}' holds {} elements, got {}",
                self.name,
                self.layout.element_count(),
                values.len()
            )));
        }
        let mut data = self.write()?;
        let [w, h, d] = self.layout.extent();
        for (i, chunk) in values.chunks_exact(w.max(1)).enumerate().take(h * d) {
            let row = self.layout.index(0, i % h, i / h);
            data[row..row + w].copy_from_slice(chunk);
        }
        Ok(())
    }

    fn overlap(&self, what: &str) -> SchedError {
        SchedError::Invariant(format!(
            "could not {what} buffer '{}': a conflicting task holds it",
            self.name
        ))
    }
}

impl<T> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("name", &self.name)
            .field("space", &self.space)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
