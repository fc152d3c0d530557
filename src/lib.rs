// src/lib.rs

pub mod cli;
pub mod comm;
pub mod config;
pub mod dag;
pub mod device;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod resource;
pub mod sim;
pub mod types;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, RawConfigFile, load_or_default};
use crate::engine::Scheduler;
use crate::exec::WorkerPool;
use crate::sim::StencilReport;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - scheduler and worker pool
/// - the diffusion demo, run on a blocking thread
/// - Ctrl-C handling (stop declaring new timesteps, drain the rest)
pub async fn run(args: CliArgs) -> Result<()> {
    let mut raw = load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    apply_overrides(&mut raw, &args);
    let cfg = ConfigFile::try_from(raw)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; finishing declared timesteps");
            stop.store(true, Ordering::Release);
        });
    }

    let workers = cfg.scheduler.workers;
    let report = tokio::task::spawn_blocking(move || run_blocking(&cfg, &stop))
        .await
        .context("simulation thread failed")??;

    println!("steps:   {}", report.steps_completed);
    println!("workers: {workers}");
    println!("tasks:   {}", report.stats.created);
    println!("digest:  {}", report.digest);
    Ok(())
}

/// Build a scheduler and worker pool from `cfg`, run the demo, and shut the
/// pool down again whatever the outcome.
pub fn run_blocking(cfg: &ConfigFile, stop: &AtomicBool) -> errors::Result<StencilReport> {
    let scheduler = Arc::new(Scheduler::new(cfg.scheduler_options()));
    let pool = WorkerPool::start(Arc::clone(&scheduler), cfg.pool_config())?;

    let result = sim::run(&scheduler, &cfg.stencil_params(), stop);

    for report in pool.shutdown() {
        debug!(
            worker = %report.id,
            queue = %report.queue,
            jobs = report.jobs_run,
            "worker summary"
        );
    }
    result
}

fn apply_overrides(raw: &mut RawConfigFile, args: &CliArgs) {
    if let Some(workers) = args.workers {
        raw.scheduler.workers = workers;
    }
    if let Some(steps) = args.steps {
        raw.simulation.steps = steps;
    }
    if let Some(ranks) = args.ranks {
        raw.simulation.ranks = ranks;
    }
    if args.write_graph {
        raw.scheduler.write_graph = true;
    }
    if args.no_double_buffer {
        raw.simulation.double_buffer = false;
    }
}

/// Print the effective settings.
fn print_dry_run(cfg: &ConfigFile) {
    let s = &cfg.scheduler;
    let sim = &cfg.simulation;
    println!("depflow dry-run");
    println!("  scheduler.workers = {}", s.workers);
    println!("  scheduler.dedicated_network_worker = {}", s.dedicated_network_worker);
    println!("  scheduler.idle_timeout_us = {}", s.idle_timeout_us);
    println!("  scheduler.write_graph = {}", s.write_graph);
    if let Some(ref dir) = s.graph_dir {
        println!("  scheduler.graph_dir = {}", dir.display());
    }
    println!("  device.stream_latency_us = {}", cfg.device.stream_latency_us);
    println!("  transport.latency_us = {}", cfg.transport.latency_us);
    println!("  simulation.ranks = {}", sim.ranks);
    println!("  simulation.cells_per_rank = {}", sim.cells_per_rank);
    println!("  simulation.steps = {}", sim.steps);
    println!("  simulation.alpha = {}", sim.alpha);
    println!("  simulation.double_buffer = {}", sim.double_buffer);
    println!("  simulation.lookahead = {}", sim.lookahead);

    debug!("dry-run complete (no execution)");
}
