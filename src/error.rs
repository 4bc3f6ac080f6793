//! Error types for `roguewire`.
//!
//! Configuration errors are raised before any resource is acquired, port
//! errors surface reservation failures, and [`HarnessError`] aggregates both
//! plus listener bind failures. Errors produced by a caller's probe never
//! pass through these types; they are returned to the caller untouched.

use std::path::PathBuf;

use thiserror::Error;

use crate::mode::ServerMode;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for the `roguewire` binary.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// Configuration error (unknown mode, invalid YAML, bad value)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (bind failure, file not found)
    pub const IO_ERROR: i32 = 3;

    /// No port could be reserved
    pub const PORT_ERROR: i32 = 4;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Error raised by the harness itself, as opposed to the probe it runs.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Configuration error, detected before any port is reserved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Port reservation failed
    #[error(transparent)]
    Port(#[from] PortError),

    /// The reserved port could not be bound
    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        /// Port that was reserved
        port: u16,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Returns the process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => ExitCode::CONFIG_ERROR,
            Self::Port(_) => ExitCode::PORT_ERROR,
            Self::Bind { .. } | Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The selected mode has no registered strategy
    #[error("the mode {mode} is not supported by this server")]
    UnsupportedMode {
        /// Mode that was requested
        mode: ServerMode,
    },

    /// A mode name did not match any known mode
    #[error("unknown server mode '{name}'")]
    UnknownMode {
        /// Name as given by the caller
        name: String,
    },

    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Configuration file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path to the configuration file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Port Reservation Errors
// ============================================================================

/// Port reservation errors.
#[derive(Debug, Error)]
pub enum PortError {
    /// Every port in the range is leased or bound by another process
    #[error("no free port in range {start}..={end}")]
    Exhausted {
        /// First port of the range
        start: u16,
        /// Last port of the range
        end: u16,
    },

    /// The configured range contains no usable port
    #[error("port range {start}..={end} is empty")]
    EmptyRange {
        /// First port of the range
        start: u16,
        /// Last port of the range
        end: u16,
    },

    /// The reserver was shut down and hands out no more ports
    #[error("port reserver for {start}..={end} has been shut down")]
    ShutDown {
        /// First port of the range
        start: u16,
        /// Last port of the range
        end: u16,
    },
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
