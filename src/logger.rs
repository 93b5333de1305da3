//! Execution log
//!
//! Append-only text file holding one record per executed command: the
//! command line, its decoded output, and a blank separator line.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::execution::ExecutionResult;

/// Appends execution records to one log file
#[derive(Debug, Clone)]
pub struct ExecutionLogger {
    path: PathBuf,
}

impl ExecutionLogger {
    /// Logger for `path`; nothing is touched until the first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and make sure it reached the disk
    ///
    /// The file is opened and closed for every record, so a failed run
    /// leaves every earlier record intact.
    pub fn append(&self, result: &ExecutionResult) -> Result<()> {
        self.write_record(result).map_err(|e| Error::LogWrite {
            command: result.command.clone(),
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// [`append`](Self::append) on the blocking pool
    ///
    /// `sync_data` can stall for a long time; keeping it off the async
    /// workers lets other devices' runs make progress meanwhile.
    pub async fn append_async(&self, result: &ExecutionResult) -> Result<()> {
        let logger = self.clone();
        let record = result.clone();

        tokio::task::spawn_blocking(move || logger.append(&record))
            .await
            .map_err(|e| Error::LogWrite {
                command: result.command.clone(),
                path: self.path.clone(),
                reason: e.to_string(),
            })?
    }

    fn write_record(&self, result: &ExecutionResult) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut record = String::with_capacity(result.command.len() + result.output.len() + 3);
        record.push_str(&result.command);
        record.push('\n');
        record.push_str(&result.output);
        record.push('\n');
        record.push('\n');

        file.write_all(record.as_bytes())?;
        file.flush()?;
        file.sync_data()
    }
}

/// Create the log directory (and parents) if missing
pub fn ensure_log_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || path.is_dir() {
        return Ok(());
    }

    fs::create_dir_all(path).map_err(|e| Error::LogDirectory {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    debug!("Created log directory {}", path.display());
    Ok(())
}
