//! FetchCraft Logging
//!
//! Unified logging setup for FetchCraft binaries. Library crates only emit
//! `tracing` events; the binary picks level and destination once at startup.
//!
//! ## Usage
//!
//! ```no_run
//! use fetchcraft_logging::{init, LogLevel, LogTarget};
//!
//! // Initialize with info level on stdout
//! init(LogLevel::Info, LogTarget::Stdout);
//! ```
//!
//! `RUST_LOG` always takes precedence over the level passed in.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Info, warnings, and errors (default)
    #[default]
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    /// Create a log level from a verbose flag
    ///
    /// - `false` → `Info`
    /// - `true` → `Debug`
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Self::Debug
        } else {
            Self::Info
        }
    }

    /// Create a log level from a verbosity count
    ///
    /// - `0` → `Info`
    /// - `1` → `Debug`
    /// - `2+` → `Trace`
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => Self::Info,
            1 => Self::Debug,
            _ => Self::Trace,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Where log lines are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogTarget {
    #[default]
    Stdout,
    Stderr,
}

impl FromStr for LogTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STDOUT" => Ok(Self::Stdout),
            "STDERR" => Ok(Self::Stderr),
            other => Err(format!("unknown log target: {other}")),
        }
    }
}

/// Initialize logging with the specified level and target
///
/// This sets up tracing-subscriber with a formatted output.
/// Call this once at the start of your application.
///
/// # Panics
///
/// Panics if called more than once (tracing subscriber already set).
/// Use `try_init` if you need to handle this case.
pub fn init(level: LogLevel, target: LogTarget) {
    try_init(level, target).expect("Failed to initialize logging");
}

/// Try to initialize logging, returning an error if already initialized
pub fn try_init(level: LogLevel, target: LogTarget) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match target {
        LogTarget::Stdout => builder.with_writer(std::io::stdout).try_init(),
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
    }
    .map_err(|e| e.to_string())
}

/// Initialize logging for tests (captures output for test framework)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
