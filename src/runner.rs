//! Single-device run orchestration
//!
//! A [`Runner`] takes one [`RunConfig`] from validation through to a
//! [`RunReport`]:
//!
//! ```text
//! Idle -> Validating -> CheckModePlanned | Executing -> Reporting -> Done
//! ```
//!
//! Any failure ends the run in `Failed`. Once a session is open it is closed
//! on every path, including cancellation.

use std::future::Future;
use tracing::Instrument;
use uuid::Uuid;

use crate::commands::validate_commands;
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::execution::RepeatLoop;
use crate::logger::{ensure_log_dir, ExecutionLogger};
use crate::report::{RunReport, RunReporter};
use crate::session::Connector;

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    Idle,
    Validating,
    /// Check mode: session verified, nothing issued
    CheckModePlanned,
    Executing,
    Reporting,
    Done,
    Failed,
}

impl RunPhase {
    /// Whether moving from `self` to `next` is a legal step
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, CheckModePlanned)
                | (Validating, Executing)
                | (CheckModePlanned, Reporting)
                | (Executing, Reporting)
                | (Reporting, Done)
                | (Idle | Validating | CheckModePlanned | Executing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }
}

struct PhaseTracker {
    current: RunPhase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            current: RunPhase::Idle,
        }
    }

    fn advance(&mut self, next: RunPhase) {
        debug_assert!(
            self.current.can_transition_to(next),
            "illegal run phase transition {:?} -> {:?}",
            self.current,
            next
        );
        debug!("Run phase {:?} -> {:?}", self.current, next);
        self.current = next;
    }
}

/// Runs one invocation against one device
pub struct Runner<C> {
    connector: C,
}

impl<C: Connector> Runner<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run to completion
    pub async fn run(&self, config: &RunConfig) -> Result<RunReport> {
        self.run_until(config, std::future::pending::<()>()).await
    }

    /// Run until done or until `shutdown` resolves
    ///
    /// Cancellation stops the loop before its next command, closes the
    /// session and fails with [`Error::Cancelled`]. Records logged so far
    /// are kept.
    pub async fn run_until<F>(&self, config: &RunConfig, shutdown: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", host = %config.host(), run_id = %run_id);

        async move {
            let mut tracker = PhaseTracker::new();
            let result = self.drive(config, shutdown, &mut tracker).await;

            match &result {
                Ok(report) => {
                    info!("Run finished: {} command(s) executed", report.executed);
                }
                Err(e) => {
                    tracker.advance(RunPhase::Failed);
                    warn!("Run failed: {}", e);
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn drive<F>(
        &self,
        config: &RunConfig,
        shutdown: F,
        tracker: &mut PhaseTracker,
    ) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        ensure_log_dir(&config.log_dir)?;

        tracker.advance(RunPhase::Validating);
        let repeat_loop = RepeatLoop::from_config(config)?;
        let validation = validate_commands(&config.commands, config.check_mode)?;
        for warning in &validation.warnings {
            warn!("{}", warning);
        }

        let reporter = RunReporter::new(config.host());
        let start = reporter.begin();

        tracker.advance(if config.check_mode {
            RunPhase::CheckModePlanned
        } else {
            RunPhase::Executing
        });

        tokio::pin!(shutdown);

        // A half-open session dropped here is torn down by its own Drop
        let mut session = tokio::select! {
            biased;
            _ = &mut shutdown => return Err(cancelled(config)),
            session = self.connector.open(&config.device) => session?,
        };
        let logger = ExecutionLogger::new(&config.log_path);

        info!(
            "Running {} command(s) x {} against {}, logging to {}",
            validation.commands.len(),
            repeat_loop.repeat(),
            config.host(),
            logger.path().display()
        );

        let outcome = {
            let work = repeat_loop.run(&validation.commands, session.as_mut(), &logger);
            tokio::select! {
                biased;
                _ = &mut shutdown => Err(cancelled(config)),
                result = work => result,
            }
        };

        if let Err(e) = session.close().await {
            warn!("Failed to close session to {}: {}", config.host(), e);
        }

        let outcome = outcome?;

        tracker.advance(RunPhase::Reporting);
        let report = reporter.finish(
            start,
            validation.warnings,
            outcome.executed,
            &outcome.results,
        );
        tracker.advance(RunPhase::Done);

        Ok(report)
    }
}

fn cancelled(config: &RunConfig) -> Error {
    Error::Cancelled {
        host: config.host().to_string(),
    }
}
