// src/comm/exchange.rs

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use crate::comm::transport::{Rank, Request, Tag};
use crate::device::{Buffer, Element, Layout};
use crate::errors::{Result, SchedError};
use crate::resource::{Resource, ResourceRegistry};

/// One direction of a halo exchange with a single peer rank.
///
/// Data travels through a device buffer, an optional device double buffer
/// and a host staging buffer. The outstanding transport request lives in a
/// slot declared as its own resource, so the tasks that issue, wait on and
/// consume it are ordered by the graph like any other data.
pub struct Exchange<T> {
    name: String,
    peer: Rank,
    tag: Tag,
    device: Arc<Buffer<T>>,
    double: Option<Arc<Buffer<T>>>,
    host: Arc<Buffer<T>>,
    slot_resource: Resource,
    slot: Mutex<Option<Request>>,
}

impl<T: Element> Exchange<T> {
    pub fn new(
        registry: &ResourceRegistry,
        name: impl Into<String>,
        peer: Rank,
        tag: Tag,
        layout: Layout,
        double_buffer: bool,
    ) -> Self {
        let name = name.into();
        let device = Arc::new(Buffer::device(registry, format!("{name}.device"), layout));
        let double = double_buffer
            .then(|| Arc::new(Buffer::device(registry, format!("{name}.double"), layout)));
        let host = Arc::new(Buffer::host(registry, format!("{name}.host"), layout));
        let slot_resource = registry.register(&format!("{name}.request"));
        Self {
            name,
            peer,
            tag,
            device,
            double,
            host,
            slot_resource,
            slot: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer(&self) -> Rank {
        self.peer
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn device_buffer(&self) -> &Arc<Buffer<T>> {
        &self.device
    }

    pub fn double_buffer(&self) -> Option<&Arc<Buffer<T>>> {
        self.double.as_ref()
    }

    pub fn host_buffer(&self) -> &Arc<Buffer<T>> {
        &self.host
    }

    pub fn has_double_buffer(&self) -> bool {
        self.double.is_some()
    }

    /// Resource guarding the outstanding request.
    pub fn request_resource(&self) -> &Resource {
        &self.slot_resource
    }

    pub(crate) fn store_request(&self, request: Request) -> Result<()> {
        let mut slot = self.slot()?;
        if slot.is_some() {
            return Err(SchedError::Invariant(format!(
                "exchange '{}' already has an outstanding request",
                self.name
            )));
        }
        *slot = Some(request);
        Ok(())
    }

    pub(crate) fn peek_request(&self) -> Result<Request> {
        self.slot()?.clone().ok_or_else(|| self.no_request())
    }

    pub(crate) fn take_request(&self) -> Result<Request> {
        self.slot()?.take().ok_or_else(|| self.no_request())
    }

    fn slot(&self) -> Result<MutexGuard<'_, Option<Request>>> {
        match self.slot.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner()),
            Err(TryLockError::WouldBlock) => Err(SchedError::Invariant(format!(
                "request slot of exchange '{}' is held by a conflicting task",
                self.name
            ))),
        }
    }

    fn no_request(&self) -> SchedError {
        SchedError::Invariant(format!("exchange '{}' has no outstanding request", self.name))
    }
}

impl<T> std::fmt::Debug for Exchange<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("name", &self.name)
            .field("peer", &self.peer)
            .field("tag", &self.tag)
            .field("double_buffer", &self.double.is_some())
            .finish_non_exhaustive()
    }
}
