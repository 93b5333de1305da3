//! Device sessions
//!
//! A [`DeviceSession`] owns one authenticated connection to one device and
//! issues commands on it strictly one at a time. A [`Connector`] opens
//! sessions, which lets the runner be driven by the real SSH transport or by
//! a scripted stand-in.

pub mod output;
pub mod prompt;
pub mod ssh;

use async_trait::async_trait;
use std::sync::Arc;

use crate::commands::CommandRecord;
use crate::config::DeviceConfig;
use crate::error::Result;

pub use ssh::{SshCommand, SshConnector, SshSession};

/// A live connection to exactly one device
#[async_trait]
pub trait DeviceSession: Send {
    /// Device this session talks to
    fn host(&self) -> &str;

    /// Send one command and wait for its complete, decoded response
    ///
    /// Fails with `Transport`, `CommandTimeout` or `CommandRejected` when the
    /// connection or the device reports a failure, and with `Decode` when the
    /// response is not valid UTF-8. Nothing is retried.
    async fn execute(&mut self, command: &CommandRecord) -> Result<String>;

    /// Release the connection; calling it again is a no-op
    async fn close(&mut self) -> Result<()>;
}

/// Opens device sessions
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open and authenticate a session, failing with `ConnectionFailed`
    async fn open(&self, device: &DeviceConfig) -> Result<Box<dyn DeviceSession>>;
}

#[async_trait]
impl<T: Connector + ?Sized> Connector for Arc<T> {
    async fn open(&self, device: &DeviceConfig) -> Result<Box<dyn DeviceSession>> {
        (**self).open(device).await
    }
}
