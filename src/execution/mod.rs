//! Repeat loop
//!
//! Issues the validated command sequence `repeat` times over one device
//! session, strictly one command at a time, logging every response before
//! the next command goes out.

use serde::Serialize;
use std::time::Duration;

use crate::commands::CommandRecord;
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::logger::ExecutionLogger;
use crate::session::DeviceSession;

/// One command's decoded response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub command: String,
    pub output: String,
}

/// What a finished loop produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Commands executed and logged
    pub executed: usize,
    /// Responses in execution order, kept only when stdout is stored
    pub results: Vec<ExecutionResult>,
}

/// Drives repetitions of a command sequence
#[derive(Debug, Clone)]
pub struct RepeatLoop {
    repeat: u32,
    sleep: Duration,
    store_stdout: bool,
    check_mode: bool,
}

impl RepeatLoop {
    /// Fails with [`Error::InvalidRepeat`] when `repeat` is zero
    pub fn new(repeat: u32, sleep: Duration, store_stdout: bool, check_mode: bool) -> Result<Self> {
        if repeat == 0 {
            return Err(Error::InvalidRepeat { repeat });
        }

        Ok(Self {
            repeat,
            sleep,
            store_stdout,
            check_mode,
        })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Self::new(
            config.repeat,
            config.sleep(),
            config.store_stdout,
            config.check_mode,
        )
    }

    pub fn repeat(&self) -> u32 {
        self.repeat
    }

    /// Number of `execute` calls a full run of `commands` makes
    pub fn planned_executions(&self, commands: usize) -> usize {
        if self.check_mode {
            0
        } else {
            commands * self.repeat as usize
        }
    }

    /// Run every repetition in row-major order
    ///
    /// The first failure ends the loop; records already logged stay in the
    /// log. A response that cannot be logged stops the run before the next
    /// command is sent.
    pub async fn run(
        &self,
        commands: &[CommandRecord],
        session: &mut dyn DeviceSession,
        logger: &ExecutionLogger,
    ) -> Result<LoopOutcome> {
        let mut outcome = LoopOutcome::default();

        if self.check_mode {
            debug!("Check mode: {} command(s) planned, none issued", commands.len());
            return Ok(outcome);
        }

        for pass in 0..self.repeat {
            debug!("Repetition {}/{} on {}", pass + 1, self.repeat, session.host());

            for record in commands {
                let output = session.execute(record).await?;
                let result = ExecutionResult {
                    command: record.command().to_string(),
                    output,
                };

                logger.append_async(&result).await?;
                outcome.executed += 1;

                if self.store_stdout {
                    outcome.results.push(result);
                }
            }

            if !self.sleep.is_zero() && pass + 1 < self.repeat {
                tokio::time::sleep(self.sleep).await;
            }
        }

        Ok(outcome)
    }
}
