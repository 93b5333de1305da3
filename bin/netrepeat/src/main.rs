//! netrepeat - run CLI commands repeatedly against network devices
//!
//! Reads the configuration file, applies command-line overrides, runs every
//! device and prints one report per device.

use std::env;
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use futures::future;
use serde_json::json;
use tokio::signal;
use tracing::{debug, error, info, warn};

use netrepeat::config::DeviceEntry;
use netrepeat::fleet::{first_failure, run_fleet_until, FleetEntry};
use netrepeat::{describe_error, CommandInput, ConfigLoader, FileConfig, Result, Runner, SshConnector};

/// Repeatedly run read-only CLI commands on network devices over SSH
#[derive(Debug, Parser)]
#[command(name = "netrepeat", author, version, about, long_about = None)]
struct Cli {
    /// Devices to run against, replacing the configured device list
    hosts: Vec<String>,

    /// Configuration file (TOML, or JSON by extension)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Command to run; repeat the flag for several commands
    #[arg(short = 'c', long = "command", value_name = "COMMAND")]
    commands: Vec<String>,

    /// Number of passes over the command list
    #[arg(short, long)]
    repeat: Option<u32>,

    /// Seconds to wait between passes
    #[arg(short, long)]
    sleep: Option<u64>,

    /// Include every response in the report
    #[arg(long)]
    store_stdout: bool,

    /// Directory for execution logs
    #[arg(long)]
    logdir: Option<PathBuf>,

    /// Log file name; `{host}` is replaced by the device host
    #[arg(long)]
    logfile: Option<String>,

    /// Plan only: connect and validate, issue no commands
    #[arg(long)]
    check: bool,

    /// Login user
    #[arg(short = 'u', long = "user")]
    user: Option<String>,

    /// SSH port
    #[arg(short, long)]
    port: Option<u16>,

    /// SSH private key
    #[arg(short, long)]
    identity: Option<PathBuf>,

    /// Connect and per-command timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Accept unknown host keys
    #[arg(long)]
    no_strict_host_key: bool,

    /// Devices driven at the same time
    #[arg(short = 'j', long)]
    parallel: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging based on debug flag
    let log_level = if cli.debug
        || env::var("NETREPEAT_DEBUG").map_or(false, |v| v == "1" || v.to_lowercase() == "true")
    {
        "debug"
    } else {
        "info"
    };

    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from(env_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    info!("Starting netrepeat v{}", netrepeat::VERSION);
    debug!("Debug mode enabled");

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", describe_error(&e));
            e.kind().exit_code()
        }
    };

    process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let mut file_config = load_configuration(&cli)?;
    apply_overrides(&cli, &mut file_config);

    let max_parallel = file_config.run.max_parallel;
    let configs = file_config.into_run_configs()?;

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => warn!("Interrupted, cancelling runs"),
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {}", e);
                future::pending::<()>().await;
            }
        }
    };

    let runner = Runner::new(SshConnector);
    let entries = run_fleet_until(&runner, &configs, max_parallel, shutdown).await;

    match cli.format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Text => print_text(&entries),
    }

    Ok(first_failure(&entries).map_or(0, |e| e.kind().exit_code()))
}

fn load_configuration(cli: &Cli) -> Result<FileConfig> {
    let mut loader = ConfigLoader::new();
    let config = match &cli.config {
        Some(path) => loader.load_from_path(path)?,
        None => loader.load()?,
    };

    match loader.current_path() {
        Some(path) => info!("Using configuration from {}", path.display()),
        None => debug!("Using built-in defaults"),
    }

    Ok(config)
}

/// Command-line values win over the configuration file
fn apply_overrides(cli: &Cli, config: &mut FileConfig) {
    if !cli.commands.is_empty() {
        config.run.commands = cli.commands.iter().map(|c| CommandInput::from(c.as_str())).collect();
    }
    if !cli.hosts.is_empty() {
        config.devices = cli.hosts.iter().map(|h| DeviceEntry::new(h.as_str())).collect();
    }

    if let Some(repeat) = cli.repeat {
        config.run.repeat = repeat;
    }
    if let Some(sleep) = cli.sleep {
        config.run.sleep = sleep;
    }
    if cli.store_stdout {
        config.run.store_stdout = true;
    }
    if let Some(logdir) = &cli.logdir {
        config.run.logdir = logdir.clone();
    }
    if let Some(logfile) = &cli.logfile {
        config.run.logfile = logfile.clone();
    }
    if cli.check {
        config.run.check_mode = true;
    }
    if let Some(parallel) = cli.parallel {
        config.run.max_parallel = parallel;
    }

    if let Some(user) = &cli.user {
        config.ssh.username = Some(user.clone());
    }
    if let Some(port) = cli.port {
        config.ssh.port = port;
    }
    if let Some(identity) = &cli.identity {
        config.ssh.identity_file = Some(identity.clone());
    }
    if let Some(timeout) = cli.timeout {
        config.ssh.timeout_secs = timeout;
    }
    if cli.no_strict_host_key {
        config.ssh.strict_host_key_checking = false;
    }
}

fn print_json(entries: &[FleetEntry]) -> Result<()> {
    let values: Vec<serde_json::Value> = entries
        .iter()
        .map(|entry| match &entry.result {
            Ok(report) => serde_json::to_value(report),
            Err(e) => Ok(json!({
                "host": entry.host,
                "changed": false,
                "failed": true,
                "kind": format!("{:?}", e.kind()),
                "msg": e.to_string(),
            })),
        })
        .collect::<std::result::Result<_, _>>()?;

    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(())
}

fn print_text(entries: &[FleetEntry]) {
    for entry in entries {
        match &entry.result {
            Ok(report) => {
                println!("== {} ({} executed) ==", report.host, report.executed);
                for warning in &report.warnings {
                    println!("[WARNING] {}", warning);
                }
                for line in &report.stdout {
                    println!("{}", line);
                }
            }
            Err(e) => {
                println!("== {} FAILED ==", entry.host);
                println!("{}", describe_error(e));
            }
        }
        println!();
    }
}
