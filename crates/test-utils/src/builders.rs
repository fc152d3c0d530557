#![allow(dead_code)]

use std::path::Path;

use depflow::config::{ConfigFile, RawConfigFile};
use depflow::dag::{TaskProperties, TaskPropertiesBuilder};
use depflow::resource::Resource;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.scheduler.workers = workers;
        self
    }

    pub fn ranks(mut self, ranks: usize) -> Self {
        self.config.simulation.ranks = ranks;
        self
    }

    pub fn cells_per_rank(mut self, cells: usize) -> Self {
        self.config.simulation.cells_per_rank = cells;
        self
    }

    pub fn steps(mut self, steps: usize) -> Self {
        self.config.simulation.steps = steps;
        self
    }

    pub fn double_buffer(mut self, on: bool) -> Self {
        self.config.simulation.double_buffer = on;
        self
    }

    pub fn write_graph(mut self, dir: &Path) -> Self {
        self.config.scheduler.write_graph = true;
        self.config.scheduler.graph_dir = Some(dir.to_path_buf());
        self
    }

    pub fn latencies_us(mut self, stream: u64, transport: u64) -> Self {
        self.config.device.stream_latency_us = stream;
        self.config.transport.latency_us = transport;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Properties labelled `label`, writing every resource in `writes` and
/// reading every resource in `reads`.
pub fn props(label: &str, reads: &[&Resource], writes: &[&Resource]) -> TaskProperties {
    let mut b: TaskPropertiesBuilder = TaskProperties::builder().label(label);
    for r in reads {
        b = b.read(r);
    }
    for w in writes {
        b = b.write(w);
    }
    b.build()
}
