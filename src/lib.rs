//! netrepeat - repeated CLI command runs against network devices
//!
//! Logs into a device over SSH, issues a fixed list of read-only commands a
//! given number of times, appends every response to a log file, and returns
//! a report bracketed by start and end timestamps.
//!
//! ## Module Organization
//!
//! - [`commands`] - Command list validation (no configuration commands, check mode)
//! - [`session`] - Device sessions: the [`DeviceSession`] trait and the SSH transport
//! - [`execution`] - The repeat loop
//! - [`logger`] - Append-only execution log
//! - [`report`] - START/END report building
//! - [`runner`] - One run against one device, from validation to report
//! - [`fleet`] - Independent runs against many devices
//! - [`config`] - File configuration and per-device run settings
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use netrepeat::{DeviceConfig, RunConfig, Runner, SshConnector};
//!
//! # async fn demo() -> netrepeat::Result<()> {
//! let mut config = RunConfig::new(
//!     DeviceConfig::new("router1.lab"),
//!     vec!["show processes cpu | include CPU".into()],
//! );
//! config.repeat = 10;
//! config.sleep_seconds = 5;
//!
//! let report = Runner::new(SshConnector).run(&config).await?;
//! println!("{}", report.stdout.join("\n"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Each run owns exactly one session and issues commands strictly one at a
//! time. The SSH transport runs the system `ssh` client in a pseudo-terminal;
//! a reader thread per session forwards output to async code over a
//! `tokio::mpsc` channel. Runs against different devices share nothing and
//! are driven concurrently by [`fleet`].

#[macro_use]
extern crate tracing;

pub mod commands;
pub mod config;
pub mod error;
pub mod execution;
pub mod fleet;
pub mod logger;
pub mod report;
pub mod runner;
pub mod session;

pub use commands::{validate_commands, CommandInput, CommandRecord, Validation};
pub use config::loader::ConfigLoader;
pub use config::{DeviceConfig, FileConfig, RunConfig};
pub use error::{Error, ErrorKind, Result};
pub use execution::{ExecutionResult, RepeatLoop};
pub use fleet::{run_fleet, run_fleet_until, FleetEntry};
pub use logger::ExecutionLogger;
pub use report::{RunReport, RunReporter};
pub use runner::{RunPhase, Runner};
pub use session::{Connector, DeviceSession, SshConnector, SshSession};

/// The current version of netrepeat from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The application name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Human-readable explanation of a failure with hints for fixing it
pub fn describe_error(error: &Error) -> String {
    match error {
        Error::UnsupportedCommand { .. } => {
            format!(
                "Validation Error: {}\n\nTry:\n• Remove configuration-mode commands from the list\n• Use a configuration tool for changes",
                error
            )
        }
        Error::ConnectionFailed { .. } => {
            format!(
                "Connection Error: {}\n\nTry:\n• Check the host name and port\n• Check credentials or set the password variable\n• Add the host key to known_hosts",
                error
            )
        }
        Error::CommandTimeout { .. } => {
            format!(
                "Timeout Error: {}\n\nTry:\n• Raise the timeout\n• Check that prompt_pattern matches the device prompt",
                error
            )
        }
        Error::LogWrite { .. } | Error::LogDirectory { .. } => {
            format!(
                "Log Error: {}\n\nTry:\n• Check directory permissions\n• Verify disk space",
                error
            )
        }
        Error::Config(_) | Error::Toml(_) => {
            format!(
                "Configuration Error: {}\n\nTry:\n• Check configuration file syntax\n• Run with --debug to see which file was loaded",
                error
            )
        }
        _ => error.to_string(),
    }
}
