mod common;

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use common::{Harness, TestResult, init_tracing};
use depflow::errors::Result;
use depflow::sim::{self, StencilParams};
use depflow_test_utils::builders::ConfigFileBuilder;
use depflow_test_utils::with_timeout;

fn params(ranks: usize, steps: usize, double_buffer: bool) -> StencilParams {
    StencilParams {
        ranks,
        cells_per_rank: 12,
        steps,
        double_buffer,
        ..StencilParams::default()
    }
}

fn expected(p: &StencilParams) -> Vec<f64> {
    sim::reference(&sim::initial_field(p.ranks * p.cells_per_rank), p.alpha, p.steps)
}

fn run_with(workers: usize, p: &StencilParams) -> Result<sim::StencilReport> {
    let harness = Harness::start(workers);
    let stop = AtomicBool::new(false);
    let report = sim::run(&harness.scheduler, p, &stop);
    let (idle, _) = harness.finish();
    idle?;
    report
}

#[test]
fn matches_sequential_reference_for_every_worker_count() -> TestResult {
    init_tracing();
    with_timeout(|| -> Result<()> {
        let p = params(2, 8, true);
        let want = expected(&p);
        for workers in [1, 2, 4] {
            let report = run_with(workers, &p)?;
            assert_eq!(report.steps_completed, 8);
            assert_eq!(report.field, want, "{workers} workers");
            assert_eq!(report.digest, sim::digest(&want));
        }
        Ok(())
    })?;
    Ok(())
}

#[test]
fn single_buffered_exchange_gives_the_same_field() -> TestResult {
    with_timeout(|| -> Result<()> {
        let with = run_with(3, &params(3, 6, true))?;
        let without = run_with(3, &params(3, 6, false))?;
        assert_eq!(with.field, without.field);
        assert_eq!(with.digest, without.digest);
        Ok(())
    })?;
    Ok(())
}

#[test]
fn a_single_rank_wraps_onto_itself() -> TestResult {
    with_timeout(|| -> Result<()> {
        let p = params(1, 5, true);
        let report = run_with(2, &p)?;
        assert_eq!(report.field, expected(&p));
        Ok(())
    })?;
    Ok(())
}

#[test]
fn latency_does_not_change_the_result() -> TestResult {
    with_timeout(|| -> Result<()> {
        let p = StencilParams {
            stream_latency: Duration::from_micros(300),
            transport_latency: Duration::from_micros(500),
            lookahead: 3,
            ..params(2, 4, true)
        };
        let report = run_with(3, &p)?;
        assert_eq!(report.field, expected(&p));
        assert!(report.stats.created > 0);
        assert_eq!(report.stats.active, 0);
        Ok(())
    })?;
    Ok(())
}

#[test]
fn stop_flag_set_up_front_declares_no_steps() -> TestResult {
    with_timeout(|| -> Result<()> {
        let harness = Harness::start(2);
        let stop = AtomicBool::new(true);
        let report = sim::run(&harness.scheduler, &params(2, 10, true), &stop)?;
        let (idle, _) = harness.finish();
        idle?;

        assert_eq!(report.steps_completed, 0);
        assert_eq!(report.field, sim::initial_field(24));
        Ok(())
    })?;
    Ok(())
}

#[test]
fn run_blocking_drives_a_configured_workload() -> TestResult {
    with_timeout(|| -> Result<()> {
        let cfg = ConfigFileBuilder::new()
            .workers(3)
            .ranks(2)
            .cells_per_rank(8)
            .steps(4)
            .latencies_us(0, 0)
            .build();
        let report = depflow::run_blocking(&cfg, &AtomicBool::new(false))?;
        let want = sim::reference(&sim::initial_field(16), cfg.simulation.alpha, 4);
        assert_eq!(report.field, want);
        Ok(())
    })?;
    Ok(())
}
