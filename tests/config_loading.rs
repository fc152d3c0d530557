mod common;

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use common::TestResult;
use depflow::cli::CliArgs;
use depflow::config::{RawConfigFile, load_and_validate, load_from_path, load_or_default};
use depflow::errors::SchedError;
use depflow_test_utils::builders::ConfigFileBuilder;
use depflow_test_utils::with_async_timeout;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_file_is_loaded() -> TestResult {
    let file = write_config(
        r#"
[scheduler]
workers = 4
dedicated_network_worker = false
write_graph = true
graph_dir = "out/graphs"

[device]
stream_latency_us = 50

[transport]
latency_us = 100

[simulation]
ranks = 3
cells_per_rank = 10
steps = 7
alpha = 0.5
double_buffer = false
"#,
    );

    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.scheduler.workers, 4);

    let pool = cfg.pool_config();
    assert_eq!(pool.workers, 4);
    assert!(!pool.dedicated_network_worker);

    let opts = cfg.scheduler_options();
    assert!(opts.write_graph);
    assert_eq!(opts.graph_dir, std::path::PathBuf::from("out/graphs"));

    let params = cfg.stencil_params();
    assert_eq!(params.ranks, 3);
    assert_eq!(params.cells_per_rank, 10);
    assert_eq!(params.steps, 7);
    assert!(!params.double_buffer);
    assert_eq!(params.stream_latency, Duration::from_micros(50));
    assert_eq!(params.transport_latency, Duration::from_micros(100));
    Ok(())
}

#[test]
fn empty_file_means_defaults() -> TestResult {
    let file = write_config("");
    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.scheduler.workers, 2);
    assert!(cfg.simulation.double_buffer);
    assert_eq!(cfg.simulation.alpha, 0.25);
    Ok(())
}

#[test]
fn zero_workers_is_rejected() {
    let file = write_config("[scheduler]\nworkers = 0\n");
    match load_and_validate(file.path()) {
        Err(SchedError::ConfigError(msg)) => assert!(msg.contains("workers")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn unstable_alpha_is_rejected() {
    let file = write_config("[simulation]\nalpha = 0.75\n");
    match load_and_validate(file.path()) {
        Err(SchedError::ConfigError(msg)) => assert!(msg.contains("alpha")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn graph_dump_needs_a_directory() {
    let mut raw = RawConfigFile::default();
    raw.scheduler.write_graph = true;
    raw.scheduler.graph_dir = None;
    match depflow::config::ConfigFile::try_from(raw) {
        Err(SchedError::ConfigError(msg)) => assert!(msg.contains("graph_dir")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn unknown_keys_are_toml_errors() {
    let file = write_config("[scheduler]\nthreads = 3\n");
    assert!(matches!(
        load_from_path(file.path()),
        Err(SchedError::TomlError(_))
    ));
}

#[test]
fn missing_explicit_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.toml");
    assert!(matches!(load_or_default(&path), Err(SchedError::IoError(_))));
}

#[test]
fn builder_produces_valid_config() {
    let cfg = ConfigFileBuilder::new()
        .workers(3)
        .ranks(4)
        .steps(2)
        .double_buffer(false)
        .build();
    assert_eq!(cfg.pool_config().workers, 3);
    assert_eq!(cfg.stencil_params().ranks, 4);
}

#[tokio::test]
async fn dry_run_only_validates() {
    let file = write_config("[simulation]\nsteps = 3\n");
    let path = file.path().to_str().unwrap();
    let args = CliArgs::try_parse_from(["depflow", "--config", path, "--dry-run", "--workers", "3"])
        .unwrap();

    let result = with_async_timeout(depflow::run(args)).await;
    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn cli_overrides_go_through_validation() {
    let file = write_config("");
    let path = file.path().to_str().unwrap();
    let args = CliArgs::try_parse_from(["depflow", "--config", path, "--workers", "0"]).unwrap();

    let err = with_async_timeout(depflow::run(args)).await.unwrap_err();
    assert!(format!("{err:#}").contains("workers"), "{err:#}");
}

#[tokio::test]
async fn short_run_from_the_command_line() {
    let file = write_config("[device]\nstream_latency_us = 0\n\n[transport]\nlatency_us = 0\n");
    let path = file.path().to_str().unwrap();
    let args = CliArgs::try_parse_from([
        "depflow", "--config", path, "--steps", "2", "--ranks", "2", "--workers", "2",
    ])
    .unwrap();

    let result = with_async_timeout(depflow::run(args)).await;
    assert!(result.is_ok(), "{result:?}");
}
