// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `depflow`.
///
/// Flags override the matching config file values.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "depflow",
    version,
    about = "Run a halo-exchange diffusion demo on the resource-dependency task scheduler.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Depflow.toml` in the current working directory; built-in
    /// defaults are used when that file does not exist.
    #[arg(long, value_name = "PATH", default_value = "Depflow.toml")]
    pub config: PathBuf,

    /// Number of worker threads.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Number of timesteps.
    #[arg(long, value_name = "N")]
    pub steps: Option<usize>,

    /// Number of simulated ranks.
    #[arg(long, value_name = "N")]
    pub ranks: Option<usize>,

    /// Dump the precedence graph as DOT after every update.
    #[arg(long)]
    pub write_graph: bool,

    /// Stage outgoing halos without the device double buffer.
    #[arg(long)]
    pub no_double_buffer: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEPFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the config, print the effective settings, run nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
