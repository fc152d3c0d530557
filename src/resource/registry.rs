// src/resource/registry.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::resource::access::{Resource, ResourceId};

/// Allocates resource identities and remembers their names for diagnostics.
///
/// One registry belongs to one [`Scheduler`](crate::engine::Scheduler);
/// resources from different registries must not be mixed.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    next_id: AtomicU64,
    names: Mutex<HashMap<ResourceId, Arc<str>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh resource. Names need not be unique.
    pub fn register(&self, name: &str) -> Resource {
        let id = ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name: Arc<str> = Arc::from(name);

        if let Ok(mut names) = self.names.lock() {
            names.insert(id, Arc::clone(&name));
        }

        trace!(resource = id.0, name = %name, "registered resource");
        Resource::new(id, name)
    }

    pub fn name_of(&self, id: ResourceId) -> Option<String> {
        let names = self.names.lock().ok()?;
        names.get(&id).map(|n| n.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.lock().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
