//! CLI argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::mode::ServerMode;
use crate::observability::LogFormat;

// ============================================================================
// Root CLI
// ============================================================================

/// Misbehaving test servers for client resilience testing.
#[derive(Parser, Debug)]
#[command(name = "roguewire", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output format.
    #[arg(long, default_value = "human", global = true, env = "ROGUEWIRE_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "ROGUEWIRE_COLOR")]
    pub color: ColorChoice,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a misbehaving server until interrupted.
    Serve(ServeArgs),

    /// List the available modes.
    Modes,
}

// ============================================================================
// Serve Command
// ============================================================================

/// Arguments for `serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to a YAML harness configuration.
    #[arg(short, long, env = "ROGUEWIRE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Misbehavior to run (overrides the config file).
    #[arg(short, long, env = "ROGUEWIRE_MODE")]
    pub mode: Option<ServerMode>,

    /// Bind this port instead of reserving one.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Response content (overrides the config file).
    #[arg(long)]
    pub content: Option<String>,

    /// Expose Prometheus metrics on `127.0.0.1:<port>`.
    #[arg(long, env = "ROGUEWIRE_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

// ============================================================================
// Shared Enums
// ============================================================================

/// Color output control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}
