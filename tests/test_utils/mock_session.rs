//! Mock Device Session Implementation for Testing

use async_trait::async_trait;
use netrepeat::commands::CommandRecord;
use netrepeat::config::DeviceConfig;
use netrepeat::error::{Error, Result};
use netrepeat::session::{Connector, DeviceSession};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failure injected into a scripted session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Transport,
    Timeout,
    Decode,
    Rejected,
}

impl Failure {
    fn into_error(self, command: &str) -> Error {
        let command = command.to_string();
        match self {
            Failure::Transport => Error::Transport {
                command,
                reason: "connection reset by peer".to_string(),
            },
            Failure::Timeout => Error::CommandTimeout {
                command,
                duration: Duration::from_secs(30),
            },
            Failure::Decode => Error::Decode { command },
            Failure::Rejected => Error::CommandRejected {
                command,
                output: "% Invalid input detected at '^' marker.".to_string(),
            },
        }
    }
}

/// What happened on one host
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    pub opened: usize,
    pub closed: usize,
    pub executed: Vec<String>,
}

#[derive(Default)]
struct Shared {
    logs: Mutex<HashMap<String, SessionLog>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Shared {
    fn record(&self, host: &str, update: impl FnOnce(&mut SessionLog)) {
        let mut logs = self.logs.lock().unwrap();
        update(logs.entry(host.to_string()).or_default());
    }
}

/// Connector handing out scripted sessions
///
/// Every session answers `<command> #<n>` for its n-th call unless a canned
/// response is registered for the command.
#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Shared>,
    responses: HashMap<String, String>,
    connect_failures: HashSet<String>,
    fail_at: Option<(usize, Failure)>,
    fail_close: bool,
    delay: Option<Duration>,
    open_delay: Option<Duration>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned output for a command
    pub fn respond(mut self, command: &str, output: &str) -> Self {
        self.responses.insert(command.to_string(), output.to_string());
        self
    }

    /// Refuse sessions to `host`
    pub fn fail_connect(mut self, host: &str) -> Self {
        self.connect_failures.insert(host.to_string());
        self
    }

    /// Fail the `call`-th execute (1-based) of every session
    pub fn fail_at(mut self, call: usize, failure: Failure) -> Self {
        self.fail_at = Some((call, failure));
        self
    }

    /// Make `close` report an error
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Delay every execute
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delay every open, as a slow login would
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Session history for `host`
    pub fn log(&self, host: &str) -> SessionLog {
        self.shared
            .logs
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .unwrap_or_default()
    }

    /// Commands issued to `host`, in order
    pub fn executed(&self, host: &str) -> Vec<String> {
        self.log(host).executed
    }

    /// Most sessions open at the same time
    pub fn peak_sessions(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet closed
    pub fn active_sessions(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, device: &DeviceConfig) -> Result<Box<dyn DeviceSession>> {
        let host = device.host.clone();
        self.shared.record(&host, |log| log.opened += 1);

        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }

        if self.connect_failures.contains(&host) {
            return Err(Error::ConnectionFailed {
                host,
                reason: "Connection refused".to_string(),
            });
        }

        let active = self.shared.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(MockSession {
            host,
            calls: 0,
            closed: false,
            connector: self.clone(),
        }))
    }
}

/// Scripted session produced by [`MockConnector`]
pub struct MockSession {
    host: String,
    calls: usize,
    closed: bool,
    connector: MockConnector,
}

#[async_trait]
impl DeviceSession for MockSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&mut self, command: &CommandRecord) -> Result<String> {
        if let Some(delay) = self.connector.delay {
            tokio::time::sleep(delay).await;
        }

        self.calls += 1;
        let text = command.command().to_string();
        self.connector
            .shared
            .record(&self.host, |log| log.executed.push(text.clone()));

        if let Some((call, failure)) = self.connector.fail_at {
            if call == self.calls {
                return Err(failure.into_error(&text));
            }
        }

        Ok(self
            .connector
            .responses
            .get(&text)
            .cloned()
            .unwrap_or_else(|| format!("{} #{}", text, self.calls)))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.connector.shared.record(&self.host, |log| log.closed += 1);
        self.connector.shared.active.fetch_sub(1, Ordering::SeqCst);

        if self.connector.fail_close {
            return Err(Error::Other("close failed".to_string()));
        }
        Ok(())
    }
}
