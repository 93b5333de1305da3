//! Multi-device fan-out
//!
//! Each device gets its own independent run; nothing is shared between runs
//! except the shutdown signal.

use futures::future::{self, FutureExt};
use futures::stream::{self, StreamExt};
use std::future::Future;

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::report::RunReport;
use crate::runner::Runner;
use crate::session::Connector;

/// Outcome of one device's run
#[derive(Debug)]
pub struct FleetEntry {
    pub host: String,
    pub result: Result<RunReport>,
}

impl FleetEntry {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// First failure in device order
pub fn first_failure(entries: &[FleetEntry]) -> Option<&Error> {
    entries.iter().find_map(|entry| entry.result.as_ref().err())
}

/// Run every config, at most `max_parallel` at a time
///
/// Entries come back in input order whatever order the runs finish in.
pub async fn run_fleet<C: Connector>(
    runner: &Runner<C>,
    configs: &[RunConfig],
    max_parallel: usize,
) -> Vec<FleetEntry> {
    run_fleet_until(runner, configs, max_parallel, future::pending::<()>()).await
}

/// Like [`run_fleet`], stopping every run when `shutdown` resolves
///
/// Runs that have not started yet by then fail with `Cancelled` without
/// contacting their device.
pub async fn run_fleet_until<C, F>(
    runner: &Runner<C>,
    configs: &[RunConfig],
    max_parallel: usize,
    shutdown: F,
) -> Vec<FleetEntry>
where
    C: Connector,
    F: Future<Output = ()>,
{
    let shutdown = shutdown.shared();
    let parallel = max_parallel.max(1);
    info!("Running {} device(s), {} at a time", configs.len(), parallel);

    stream::iter(configs.iter().map(|config| {
        let shutdown = shutdown.clone();
        async move {
            let host = config.host().to_string();
            let result = if shutdown.peek().is_some() {
                Err(Error::Cancelled { host: host.clone() })
            } else {
                runner.run_until(config, shutdown).await
            };
            FleetEntry { host, result }
        }
    }))
    .buffered(parallel)
    .collect()
    .await
}
