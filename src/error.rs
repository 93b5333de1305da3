//! Error types and Result aliases for netrepeat

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigError;

/// Result type alias for netrepeat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for netrepeat
#[derive(Debug)]
pub enum Error {
    // === Validation errors ===
    /// Command enters configuration mode
    UnsupportedCommand {
        command: String,
    },

    /// Command text cannot be sent as a single CLI line
    CommandValidationFailed {
        command: String,
        reason: String,
    },

    /// Repeat count below one
    InvalidRepeat {
        repeat: u32,
    },

    // === Session errors ===
    /// Failed to open a session to the device
    ConnectionFailed {
        host: String,
        reason: String,
    },

    /// Transport failed while a command was in flight
    Transport {
        command: String,
        reason: String,
    },

    /// Device answered with one of its error markers
    CommandRejected {
        command: String,
        output: String,
    },

    /// Device prompt did not come back in time
    CommandTimeout {
        command: String,
        duration: Duration,
    },

    /// Response bytes are not valid UTF-8
    Decode {
        command: String,
    },

    /// Run cancelled by the caller
    Cancelled {
        host: String,
    },

    // === Log errors ===
    /// Failed to append to the execution log
    LogWrite {
        command: String,
        path: PathBuf,
        reason: String,
    },

    /// Failed to create the log directory
    LogDirectory {
        path: PathBuf,
        reason: String,
    },

    // === Configuration errors ===
    /// Configuration rejected
    Config(ConfigError),

    // === I/O and serialization errors ===
    /// I/O errors
    Io(std::io::Error),

    /// Serialization errors
    Serde(serde_json::Error),

    /// TOML parsing errors
    Toml(toml::de::Error),

    /// Regex compilation errors
    Regex(regex::Error),

    // === Generic fallback (use sparingly) ===
    /// Generic errors
    Other(String),
}

/// Coarse classification used by callers deciding how to react to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Command list rejected before any device contact
    Validation,
    /// Session could not be opened
    Connection,
    /// Session failed mid-run (includes rejected commands and timeouts)
    Transport,
    /// Device output was not valid text
    Decode,
    /// Execution log could not be written
    LogWrite,
    /// Log directory could not be created
    LogDirectory,
    /// Run interrupted by the caller
    Cancelled,
    /// Bad configuration
    Config,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Process exit code used by the CLI for this kind of failure
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Validation => 2,
            ErrorKind::Config => 3,
            ErrorKind::Connection => 4,
            ErrorKind::Transport => 5,
            ErrorKind::Decode => 6,
            ErrorKind::LogWrite | ErrorKind::LogDirectory => 7,
            ErrorKind::Cancelled => 130,
            ErrorKind::Internal => 1,
        }
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedCommand { .. }
            | Error::CommandValidationFailed { .. }
            | Error::InvalidRepeat { .. } => ErrorKind::Validation,
            Error::ConnectionFailed { .. } => ErrorKind::Connection,
            Error::Transport { .. }
            | Error::CommandRejected { .. }
            | Error::CommandTimeout { .. } => ErrorKind::Transport,
            Error::Decode { .. } => ErrorKind::Decode,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::LogWrite { .. } => ErrorKind::LogWrite,
            Error::LogDirectory { .. } => ErrorKind::LogDirectory,
            Error::Config(_) | Error::Toml(_) | Error::Regex(_) => ErrorKind::Config,
            Error::Io(_) | Error::Serde(_) | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Command the failure is attributed to, when there is one
    pub fn command(&self) -> Option<&str> {
        match self {
            Error::UnsupportedCommand { command }
            | Error::CommandValidationFailed { command, .. }
            | Error::Transport { command, .. }
            | Error::CommandRejected { command, .. }
            | Error::CommandTimeout { command, .. }
            | Error::Decode { command }
            | Error::LogWrite { command, .. } => Some(command),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Validation errors
            Error::UnsupportedCommand { command } => {
                write!(f, "does not support config commands: '{}'", command)
            }
            Error::CommandValidationFailed { command, reason } => {
                write!(f, "Command validation failed for '{}': {}", command, reason)
            }
            Error::InvalidRepeat { repeat } => {
                write!(f, "repeat must be at least 1 (got {})", repeat)
            }

            // Session errors
            Error::ConnectionFailed { host, reason } => {
                write!(f, "Failed to connect to '{}': {}", host, reason)
            }
            Error::Transport { command, reason } => {
                write!(f, "Failed to get command output {} : {}", command, reason)
            }
            Error::CommandRejected { command, output } => {
                write!(f, "Device rejected command '{}': {}", command, output.trim())
            }
            Error::CommandTimeout { command, duration } => {
                write!(f, "Command '{}' timed out after {:?}", command, duration)
            }
            Error::Decode { command } => {
                write!(f, "Failed to decode output : {}", command)
            }
            Error::Cancelled { host } => {
                write!(f, "Run against '{}' was cancelled", host)
            }

            // Log errors
            Error::LogWrite {
                command,
                path,
                reason,
            } => {
                write!(
                    f,
                    "Failed to write output {} to '{}': {}",
                    command,
                    path.display(),
                    reason
                )
            }
            Error::LogDirectory { path, reason } => {
                write!(
                    f,
                    "Failed to create log directory '{}': {}",
                    path.display(),
                    reason
                )
            }

            Error::Config(err) => write!(f, "Configuration error: {}", err),

            // I/O and serialization errors
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Serde(err) => write!(f, "Serialization error: {}", err),
            Error::Toml(err) => write!(f, "TOML parsing error: {}", err),
            Error::Regex(err) => write!(f, "Regex compilation error: {}", err),

            // Generic fallback
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Serde(err) => Some(err),
            Error::Toml(err) => Some(err),
            Error::Regex(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Toml(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Regex(err)
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}
