// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::processing::ProcessingId;

/// Command-line arguments for `kbflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "kbflow",
    version,
    about = "Run a knowledge-base integration pipeline defined in TOML.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    ///
    /// Default: `Kbflow.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Kbflow.toml")]
    pub config: String,

    /// Reuse this earlier processing (and everything it consumed) instead of
    /// recomputing it. May be given several times.
    #[arg(long, value_name = "PROCESSING_ID")]
    pub resume: Vec<ProcessingId>,

    /// Reuse the latest successful processing of this step. May be given
    /// several times.
    #[arg(long, value_name = "STEP")]
    pub resume_latest: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `KBFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the step graph, but don't execute anything.
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
