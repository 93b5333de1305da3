//! Configuration management for netrepeat
//!
//! [`FileConfig`] mirrors the on-disk TOML/JSON layout. It resolves into one
//! [`RunConfig`] per device; a `RunConfig` is the immutable input of a single
//! invocation.

pub mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::commands::CommandInput;
use crate::session::prompt::{DEFAULT_ERROR_PATTERNS, DEFAULT_PROMPT_PATTERN};

/// Default log directory
pub const DEFAULT_LOG_DIR: &str = "log";

/// Default log file name
pub const DEFAULT_LOG_FILE: &str = "repeat_ios_cmd.log";

/// Placeholder replaced by the device host in log file names
pub const HOST_PLACEHOLDER: &str = "{host}";

/// Environment variable holding the device password unless overridden
pub const DEFAULT_PASSWORD_ENV: &str = "NETREPEAT_PASSWORD";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid pattern in '{field}' ({pattern}): {reason}")]
    InvalidPattern {
        field: String,
        pattern: String,
        reason: String,
    },

    #[error("Log path '{path}' is shared by {hosts:?}; use '{{host}}' in the log file name")]
    LogPathCollision { path: PathBuf, hosts: Vec<String> },

    #[error("Failed to load config from '{path}': {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Failed to parse {format} config: {reason}")]
    Parse { format: String, reason: String },

    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),
}

/// On-disk configuration layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Repeat loop settings shared by every device
    pub run: RunSection,

    /// SSH defaults shared by every device
    pub ssh: SshSection,

    /// Target devices
    pub devices: Vec<DeviceEntry>,
}

/// `[run]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    /// Commands to issue, bare strings or `{ command, prompt, answer }` tables
    pub commands: Vec<CommandInput>,

    /// Number of passes over the command list
    pub repeat: u32,

    /// Seconds to wait between passes
    pub sleep: u64,

    /// Echo each output back in the report
    pub store_stdout: bool,

    /// Directory holding the execution logs
    pub logdir: PathBuf,

    /// Log file name, may contain `{host}`
    pub logfile: String,

    /// Plan only: validate and connect, issue nothing
    pub check_mode: bool,

    /// Devices driven at the same time
    pub max_parallel: usize,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            repeat: 1,
            sleep: 0,
            store_stdout: false,
            logdir: PathBuf::from(DEFAULT_LOG_DIR),
            logfile: DEFAULT_LOG_FILE.to_string(),
            check_mode: false,
            max_parallel: 4,
        }
    }
}

/// `[ssh]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSection {
    /// SSH port
    pub port: u16,

    /// Login user (ssh's own default when unset)
    pub username: Option<String>,

    /// Environment variable the password is read from
    pub password_env: String,

    /// Private key passed with `-i`
    pub identity_file: Option<PathBuf>,

    /// Connect and per-command timeout in seconds
    pub timeout_secs: u64,

    /// Refuse unknown host keys
    pub strict_host_key_checking: bool,

    /// SSH client executable
    pub ssh_program: String,

    /// Extra `-o` options, e.g. `KexAlgorithms=+diffie-hellman-group14-sha1`
    pub options: Vec<String>,

    /// Regex matching the device CLI prompt at the end of output
    pub prompt_pattern: String,

    /// Commands sent once after login, output discarded
    pub setup_commands: Vec<String>,

    /// Regexes marking a device-side command failure
    pub error_patterns: Vec<String>,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            port: 22,
            username: None,
            password_env: DEFAULT_PASSWORD_ENV.to_string(),
            identity_file: None,
            timeout_secs: 30,
            strict_host_key_checking: true,
            ssh_program: "ssh".to_string(),
            options: Vec::new(),
            prompt_pattern: DEFAULT_PROMPT_PATTERN.to_string(),
            setup_commands: vec![
                "terminal length 0".to_string(),
                "terminal width 512".to_string(),
            ],
            error_patterns: DEFAULT_ERROR_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// `[[devices]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Host name or address
    pub host: String,

    /// Overrides `ssh.port`
    #[serde(default)]
    pub port: Option<u16>,

    /// Overrides `ssh.username`
    #[serde(default)]
    pub username: Option<String>,
}

impl DeviceEntry {
    /// Entry for a host with no overrides
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            username: None,
        }
    }
}

/// Everything needed to open a session to one device
#[derive(Clone)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub identity_file: Option<PathBuf>,
    pub timeout: Duration,
    pub strict_host_key_checking: bool,
    pub ssh_program: String,
    pub ssh_options: Vec<String>,
    pub prompt_pattern: String,
    pub setup_commands: Vec<String>,
    pub error_patterns: Vec<String>,
}

impl DeviceConfig {
    /// Device with the built-in SSH defaults
    pub fn new(host: impl Into<String>) -> Self {
        let ssh = SshSection::default();
        Self {
            host: host.into(),
            port: ssh.port,
            username: None,
            password: None,
            identity_file: None,
            timeout: Duration::from_secs(ssh.timeout_secs),
            strict_host_key_checking: ssh.strict_host_key_checking,
            ssh_program: ssh.ssh_program,
            ssh_options: ssh.options,
            prompt_pattern: ssh.prompt_pattern,
            setup_commands: ssh.setup_commands,
            error_patterns: ssh.error_patterns,
        }
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("identity_file", &self.identity_file)
            .field("timeout", &self.timeout)
            .field("strict_host_key_checking", &self.strict_host_key_checking)
            .field("ssh_program", &self.ssh_program)
            .field("ssh_options", &self.ssh_options)
            .field("prompt_pattern", &self.prompt_pattern)
            .finish_non_exhaustive()
    }
}

/// Input of one invocation against one device
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub commands: Vec<CommandInput>,
    pub repeat: u32,
    pub sleep_seconds: u64,
    pub store_stdout: bool,
    pub log_dir: PathBuf,
    pub log_path: PathBuf,
    pub check_mode: bool,
    pub device: DeviceConfig,
}

impl RunConfig {
    /// Run with the default loop settings, logging to `log/repeat_ios_cmd.log`
    pub fn new(device: DeviceConfig, commands: Vec<CommandInput>) -> Self {
        let log_dir = PathBuf::from(DEFAULT_LOG_DIR);
        Self {
            commands,
            repeat: 1,
            sleep_seconds: 0,
            store_stdout: false,
            log_path: log_dir.join(DEFAULT_LOG_FILE),
            log_dir,
            check_mode: false,
            device,
        }
    }

    /// Host this run targets
    pub fn host(&self) -> &str {
        &self.device.host
    }

    /// Delay between passes
    pub fn sleep(&self) -> Duration {
        Duration::from_secs(self.sleep_seconds)
    }
}

impl FileConfig {
    /// Resolve into one run per device, in device order
    pub fn into_run_configs(self) -> Result<Vec<RunConfig>, ConfigError> {
        self.validate()?;

        let mut configs = Vec::with_capacity(self.devices.len());
        for entry in &self.devices {
            let device = self.resolve_device(entry);
            let logfile = self.run.logfile.replace(HOST_PLACEHOLDER, &entry.host);

            configs.push(RunConfig {
                commands: self.run.commands.clone(),
                repeat: self.run.repeat,
                sleep_seconds: self.run.sleep,
                store_stdout: self.run.store_stdout,
                log_path: self.run.logdir.join(logfile),
                log_dir: self.run.logdir.clone(),
                check_mode: self.run.check_mode,
                device,
            });
        }

        check_log_paths(&configs)?;
        Ok(configs)
    }

    /// Validate settings that do not depend on a particular device
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.commands.is_empty() {
            return Err(validation("run.commands", "At least one command is required"));
        }

        if self.run.repeat == 0 {
            return Err(validation("run.repeat", "Repeat must be at least 1"));
        }

        if self.run.max_parallel == 0 {
            return Err(validation("run.max_parallel", "Must be at least 1"));
        }

        if self.run.logfile.trim().is_empty() {
            return Err(validation("run.logfile", "Log file name cannot be empty"));
        }

        if self.devices.is_empty() {
            return Err(validation("devices", "At least one device is required"));
        }

        if self.devices.iter().any(|d| d.host.trim().is_empty()) {
            return Err(validation("devices.host", "Host cannot be empty"));
        }

        if self.ssh.timeout_secs == 0 {
            return Err(validation("ssh.timeout_secs", "Timeout must be greater than 0"));
        }

        if self.ssh.timeout_secs > 3600 {
            return Err(validation(
                "ssh.timeout_secs",
                "Timeout cannot exceed 1 hour (3600 seconds)",
            ));
        }

        if self.ssh.ssh_program.trim().is_empty() {
            return Err(validation("ssh.ssh_program", "SSH program cannot be empty"));
        }

        check_pattern("ssh.prompt_pattern", &self.ssh.prompt_pattern)?;
        for pattern in &self.ssh.error_patterns {
            check_pattern("ssh.error_patterns", pattern)?;
        }
        for command in &self.run.commands {
            if let CommandInput::Structured {
                prompt: Some(prompt),
                ..
            } = command
            {
                check_pattern("run.commands.prompt", prompt)?;
            }
        }

        Ok(())
    }

    fn resolve_device(&self, entry: &DeviceEntry) -> DeviceConfig {
        let password = std::env::var(&self.ssh.password_env)
            .ok()
            .filter(|p| !p.is_empty())
            .map(Zeroizing::new);

        DeviceConfig {
            host: entry.host.trim().to_string(),
            port: entry.port.unwrap_or(self.ssh.port),
            username: entry.username.clone().or_else(|| self.ssh.username.clone()),
            password,
            identity_file: self.ssh.identity_file.clone(),
            timeout: Duration::from_secs(self.ssh.timeout_secs),
            strict_host_key_checking: self.ssh.strict_host_key_checking,
            ssh_program: self.ssh.ssh_program.clone(),
            ssh_options: self.ssh.options.clone(),
            prompt_pattern: self.ssh.prompt_pattern.clone(),
            setup_commands: self.ssh.setup_commands.clone(),
            error_patterns: self.ssh.error_patterns.clone(),
        }
    }
}

fn validation(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn check_pattern(field: &str, pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern {
            field: field.to_string(),
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// Concurrent runs must never append to the same log file
fn check_log_paths(configs: &[RunConfig]) -> Result<(), ConfigError> {
    let mut by_path: HashMap<&PathBuf, Vec<String>> = HashMap::new();
    for config in configs {
        by_path
            .entry(&config.log_path)
            .or_default()
            .push(config.device.host.clone());
    }

    match by_path.into_iter().find(|(_, hosts)| hosts.len() > 1) {
        Some((path, hosts)) => Err(ConfigError::LogPathCollision {
            path: path.clone(),
            hosts,
        }),
        None => Ok(()),
    }
}
