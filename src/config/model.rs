// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::SchedulerOptions;
use crate::exec::WorkerPoolConfig;
use crate::sim::StencilParams;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [scheduler]
/// workers = 4
/// write_graph = true
/// graph_dir = "graphs"
///
/// [device]
/// stream_latency_us = 50
///
/// [transport]
/// latency_us = 100
///
/// [simulation]
/// ranks = 4
/// cells_per_rank = 64
/// steps = 200
/// alpha = 0.25
/// double_buffer = true
/// ```
///
/// Every section and key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub device: DeviceSection,

    #[serde(default)]
    pub transport: TransportSection,

    #[serde(default)]
    pub simulation: SimulationSection,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    /// Worker threads.
    pub workers: usize,

    /// Bind worker 0 to network tasks when there is more than one worker.
    pub dedicated_network_worker: bool,

    /// Longest an idle worker parks before polling again, in microseconds.
    pub idle_timeout_us: u64,

    /// Write `step_<n>.dot` after every graph update.
    pub write_graph: bool,

    pub graph_dir: Option<PathBuf>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            workers: 2,
            dedicated_network_worker: true,
            idle_timeout_us: 200,
            write_graph: false,
            graph_dir: Some(PathBuf::from("graphs")),
        }
    }
}

/// `[device]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceSection {
    /// Delay applied to every stream operation, in microseconds.
    pub stream_latency_us: u64,
}

/// `[transport]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSection {
    /// Delivery delay of every message, in microseconds.
    pub latency_us: u64,
}

/// `[simulation]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSection {
    pub ranks: usize,
    pub cells_per_rank: usize,
    pub steps: usize,
    pub alpha: f64,
    pub double_buffer: bool,
    pub lookahead: usize,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            ranks: 2,
            cells_per_rank: 64,
            steps: 50,
            alpha: 0.25,
            double_buffer: true,
            lookahead: 2,
        }
    }
}

/// Validated configuration. Built from [`RawConfigFile`] via `TryFrom`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerSection,
    pub device: DeviceSection,
    pub transport: TransportSection,
    pub simulation: SimulationSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            scheduler: raw.scheduler,
            device: raw.device,
            transport: raw.transport,
            simulation: raw.simulation,
        }
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        let defaults = SchedulerOptions::default();
        SchedulerOptions {
            write_graph: self.scheduler.write_graph,
            graph_dir: self.scheduler.graph_dir.clone().unwrap_or(defaults.graph_dir),
        }
    }

    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            workers: self.scheduler.workers,
            dedicated_network_worker: self.scheduler.dedicated_network_worker,
            idle_timeout: Duration::from_micros(self.scheduler.idle_timeout_us),
        }
    }

    pub fn stencil_params(&self) -> StencilParams {
        let sim = &self.simulation;
        StencilParams {
            ranks: sim.ranks,
            cells_per_rank: sim.cells_per_rank,
            steps: sim.steps,
            alpha: sim.alpha,
            double_buffer: sim.double_buffer,
            stream_latency: Duration::from_micros(self.device.stream_latency_us),
            transport_latency: Duration::from_micros(self.transport.latency_us),
            lookahead: sim.lookahead,
        }
    }
}
