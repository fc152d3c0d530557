// src/sim/stencil.rs

//! Explicit 1-D diffusion on a periodic ring of ranks.
//!
//! Every rank owns `cells_per_rank` cells plus one halo cell on each side,
//! held in two device buffers that swap roles every step. A step is:
//! pack both edge cells, send them to the neighbors, receive the neighbors'
//! edges, unpack them into the halos, then diffuse into the other buffer.
//! All ordering comes from declared accesses; nothing in here waits on
//! anything except the submission window and the final gather.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use crate::comm::{Exchange, LoopbackTransport, Rank, SharedTransport, Tag, receive, send};
use crate::dag::TaskProperties;
use crate::device::{Buffer, Layout, SharedStream, SimStream, copy, launch, to_bytes};
use crate::engine::{Scheduler, SchedulerStats};
use crate::errors::{BackendFailure, Result, SchedError};
use crate::types::TaskId;

/// Tag of edge cells travelling to the lower-ranked neighbor.
const LEFTWARD: Tag = 0;
/// Tag of edge cells travelling to the higher-ranked neighbor.
const RIGHTWARD: Tag = 1;

#[derive(Debug, Clone)]
pub struct StencilParams {
    pub ranks: usize,
    pub cells_per_rank: usize,
    pub steps: usize,
    /// Diffusion number; stable for values up to 0.5.
    pub alpha: f64,
    pub double_buffer: bool,
    pub stream_latency: Duration,
    pub transport_latency: Duration,
    /// Steps that may be in flight before submission waits.
    pub lookahead: usize,
}

impl Default for StencilParams {
    fn default() -> Self {
        Self {
            ranks: 2,
            cells_per_rank: 16,
            steps: 10,
            alpha: 0.25,
            double_buffer: true,
            stream_latency: Duration::ZERO,
            transport_latency: Duration::ZERO,
            lookahead: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StencilReport {
    pub steps_completed: usize,
    /// Interior cells of all ranks, in global order.
    pub field: Vec<f64>,
    /// blake3 of the little-endian field bytes.
    pub digest: String,
    pub stats: SchedulerStats,
}

struct RankState {
    stream: SharedStream,
    transport: SharedTransport,
    fields: [Arc<Buffer<f64>>; 2],
    send_left: Arc<Exchange<f64>>,
    send_right: Arc<Exchange<f64>>,
    recv_left: Arc<Exchange<f64>>,
    recv_right: Arc<Exchange<f64>>,
    host: Arc<Buffer<f64>>,
}

impl RankState {
    fn new(
        scheduler: &Scheduler,
        rank: Rank,
        params: &StencilParams,
        transport: SharedTransport,
    ) -> Result<Self> {
        let registry = scheduler.resources();
        let ranks = params.ranks;
        let left = (rank + ranks - 1) % ranks;
        let right = (rank + 1) % ranks;
        let cells = Layout::linear(params.cells_per_rank + 2);
        let edge = Layout::linear(1);
        let db = params.double_buffer;

        let stream = SimStream::shared(format!("r{rank}"), params.stream_latency)?;
        let fields = [
            Arc::new(Buffer::device(registry, format!("r{rank}.field.a"), cells)),
            Arc::new(Buffer::device(registry, format!("r{rank}.field.b"), cells)),
        ];
        let exchange = |name: &str, peer: Rank, tag: Tag| {
            Arc::new(Exchange::new(registry, format!("r{rank}.{name}"), peer, tag, edge, db))
        };

        Ok(Self {
            stream,
            transport,
            fields,
            send_left: exchange("send_left", left, LEFTWARD),
            send_right: exchange("send_right", right, RIGHTWARD),
            recv_left: exchange("recv_left", left, RIGHTWARD),
            recv_right: exchange("recv_right", right, LEFTWARD),
            host: Arc::new(Buffer::host(registry, format!("r{rank}.host"), cells)),
        })
    }

    /// Declare one timestep. Returns the id of the diffusion task.
    fn submit_step(
        &self,
        scheduler: &Scheduler,
        step: usize,
        n: usize,
        alpha: f64,
    ) -> Result<TaskId> {
        let cur = Arc::clone(&self.fields[step % 2]);
        let nxt = Arc::clone(&self.fields[(step + 1) % 2]);

        let (l_out, r_out) = (self.send_left.device_buffer(), self.send_right.device_buffer());
        let pack = TaskProperties::builder()
            .label("pack edges")
            .read(cur.data_resource())
            .write(l_out.data_resource())
            .write(r_out.data_resource())
            .build();
        {
            let (cur, l_out, r_out) = (Arc::clone(&cur), Arc::clone(l_out), Arc::clone(r_out));
            launch(scheduler, &self.stream, pack, move || {
                let f = cur.read().map_err(device_err)?;
                l_out.write().map_err(device_err)?[0] = f[1];
                r_out.write().map_err(device_err)?[0] = f[n];
                Ok(())
            })?;
        }

        send(scheduler, &self.send_left, &self.transport, &self.stream)?;
        send(scheduler, &self.send_right, &self.transport, &self.stream)?;
        receive(scheduler, &self.recv_left, &self.transport, &self.stream)?;
        receive(scheduler, &self.recv_right, &self.transport, &self.stream)?;

        let (l_in, r_in) = (self.recv_left.device_buffer(), self.recv_right.device_buffer());
        let unpack = TaskProperties::builder()
            .label("unpack halos")
            .read(l_in.data_resource())
            .read(r_in.data_resource())
            .write(cur.data_resource())
            .build();
        {
            let (cur, l_in, r_in) = (Arc::clone(&cur), Arc::clone(l_in), Arc::clone(r_in));
            launch(scheduler, &self.stream, unpack, move || {
                let mut f = cur.write().map_err(device_err)?;
                f[0] = l_in.read().map_err(device_err)?[0];
                f[n + 1] = r_in.read().map_err(device_err)?[0];
                Ok(())
            })?;
        }

        let diffuse = TaskProperties::builder()
            .label("diffuse")
            .read(cur.data_resource())
            .write(nxt.data_resource())
            .build();
        launch(scheduler, &self.stream, diffuse, move || {
            let old = cur.read().map_err(device_err)?;
            let mut new = nxt.write().map_err(device_err)?;
            for i in 1..=n {
                new[i] = step_cell(old[i - 1], old[i], old[i + 1], alpha);
            }
            Ok(())
        })
    }
}

fn device_err(e: SchedError) -> BackendFailure {
    BackendFailure::Device(e.to_string())
}

fn step_cell(left: f64, center: f64, right: f64, alpha: f64) -> f64 {
    center + alpha * (left - 2.0 * center + right)
}

/// Deterministic starting field of `len` cells.
pub fn initial_field(len: usize) -> Vec<f64> {
    (0..len)
        .map(|g| {
            let x = g as f64 / len.max(1) as f64;
            let plateau = if (0.25..0.5).contains(&x) { 1.0 } else { 0.0 };
            plateau + ((g * 7) % 13) as f64 / 130.0
        })
        .collect()
}

/// Sequential periodic diffusion; what [`run`] must reproduce bit for bit.
pub fn reference(initial: &[f64], alpha: f64, steps: usize) -> Vec<f64> {
    let len = initial.len();
    let mut cur = initial.to_vec();
    let mut next = vec![0.0; len];
    for _ in 0..steps {
        for g in 0..len {
            let left = cur[(g + len - 1) % len];
            let right = cur[(g + 1) % len];
            next[g] = step_cell(left, cur[g], right, alpha);
        }
        std::mem::swap(&mut cur, &mut next);
    }
    cur
}

pub fn digest(field: &[f64]) -> String {
    blake3::hash(&to_bytes(field)).to_hex().to_string()
}

/// Run the diffusion on `scheduler`, whose workers must already be running.
///
/// Checks `stop` before every timestep; once set, no further steps are
/// declared and the steps already declared drain normally.
pub fn run(
    scheduler: &Scheduler,
    params: &StencilParams,
    stop: &AtomicBool,
) -> Result<StencilReport> {
    let n = params.cells_per_rank;
    let transports = LoopbackTransport::world(params.ranks, params.transport_latency)?;
    let ranks = transports
        .into_iter()
        .enumerate()
        .map(|(rank, t)| RankState::new(scheduler, rank, params, Arc::new(t)))
        .collect::<Result<Vec<_>>>()?;

    let initial = initial_field(params.ranks * n);
    for (rank, state) in ranks.iter().enumerate() {
        let mut cells = Vec::with_capacity(n + 2);
        cells.push(0.0);
        cells.extend_from_slice(&initial[rank * n..(rank + 1) * n]);
        cells.push(0.0);
        state.host.fill_from(&cells)?;
        copy(scheduler, &state.stream, &state.fields[0], &state.host)?;
    }
    info!(
        ranks = params.ranks,
        cells = n,
        steps = params.steps,
        "stencil submitted initial upload"
    );

    let mut in_flight: Vec<Vec<TaskId>> = Vec::with_capacity(params.steps);
    let mut steps_completed = 0;
    for step in 0..params.steps {
        if stop.load(Ordering::Acquire) {
            info!(step, "stop requested; no further steps declared");
            break;
        }
        if step >= params.lookahead {
            for id in &in_flight[step - params.lookahead] {
                scheduler.wait_task(*id)?;
            }
        }

        let ids = ranks
            .iter()
            .map(|state| state.submit_step(scheduler, step, n, params.alpha))
            .collect::<Result<Vec<_>>>()?;
        debug!(step, "step declared");
        in_flight.push(ids);
        steps_completed += 1;
    }

    for state in &ranks {
        copy(scheduler, &state.stream, &state.host, &state.fields[steps_completed % 2])?;
    }
    scheduler.wait_idle()?;

    let mut field = Vec::with_capacity(params.ranks * n);
    for state in &ranks {
        let cells = state.host.to_vec()?;
        field.extend_from_slice(&cells[1..=n]);
    }

    let digest = digest(&field);
    info!(steps = steps_completed, digest = %digest, "stencil finished");

    Ok(StencilReport {
        steps_completed,
        field,
        digest,
        stats: scheduler.stats(),
    })
}
