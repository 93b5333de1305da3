//! SSH Device Session
//!
//! Runs the system `ssh` client inside a pseudo-terminal and talks to the
//! device CLI through it: log in, send one command line, read until the
//! prompt comes back. Blocking PTY reads are bridged to async code by a
//! reader thread and a channel.

use async_trait::async_trait;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use regex::Regex;
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::{timeout_at, Instant};

use super::output::{normalize_output, tail_text};
use super::prompt::{detect_login_event, LoginEvent, PromptMatcher};
use super::{Connector, DeviceSession};
use crate::commands::CommandRecord;
use crate::config::DeviceConfig;
use crate::error::{Error, Result};

/// How long `close` waits for the device to hang up after `exit`
const CLOSE_GRACE: Duration = Duration::from_millis(500);

const REAP_POLL: Duration = Duration::from_millis(10);

/// Program and arguments used to reach a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl SshCommand {
    /// Build the `ssh` command line for a device
    pub fn for_device(device: &DeviceConfig) -> Self {
        let strict = if device.strict_host_key_checking {
            "yes"
        } else {
            "no"
        };

        let mut args = vec![
            "-tt".to_string(),
            "-p".to_string(),
            device.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", device.timeout.as_secs().max(1)),
            "-o".to_string(),
            format!("StrictHostKeyChecking={}", strict),
        ];

        if let Some(user) = &device.username {
            args.push("-l".to_string());
            args.push(user.clone());
        }

        if let Some(identity) = &device.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        for option in &device.ssh_options {
            args.push("-o".to_string());
            args.push(option.clone());
        }

        args.push(device.host.clone());

        Self {
            program: device.ssh_program.clone(),
            args,
        }
    }
}

enum Chunk {
    Data(Vec<u8>),
    Closed,
    TimedOut,
}

enum WaitError {
    Closed,
    TimedOut,
    Write(std::io::Error),
}

/// Session to one device over an `ssh` child process
pub struct SshSession {
    host: String,
    child: Box<dyn Child + Send + Sync>,
    // Dropping the master hangs up the terminal
    _master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    output_rx: UnboundedReceiver<Vec<u8>>,
    matcher: PromptMatcher,
    timeout: Duration,
    closed: bool,
}

impl SshSession {
    /// Connect to a device with the configured `ssh` client
    pub async fn open(device: &DeviceConfig) -> Result<Self> {
        Self::open_with(device, SshCommand::for_device(device)).await
    }

    /// Connect through an explicit command line
    ///
    /// Logs in, then runs the device's setup commands (pager off and the
    /// like) with their output discarded.
    pub async fn open_with(device: &DeviceConfig, command: SshCommand) -> Result<Self> {
        let matcher = PromptMatcher::new(&device.prompt_pattern, &device.error_patterns)?;
        info!("Connecting to {} via {}", device.host, command.program);

        let mut session = Self::spawn(&device.host, &command, matcher, device.timeout)?;
        let password = device.password.as_deref().map(String::as_str);
        session.login(password).await?;

        for setup in &device.setup_commands {
            session
                .send_and_wait(setup, None)
                .await
                .map_err(|e| connection_error(&device.host, setup_failure(setup, e)))?;
        }

        info!("Connected to {}", device.host);
        Ok(session)
    }

    fn spawn(
        host: &str,
        command: &SshCommand,
        matcher: PromptMatcher,
        timeout: Duration,
    ) -> Result<Self> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 512,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| connection_error(host, format!("failed to open PTY: {}", e)))?;

        let mut builder = CommandBuilder::new(&command.program);
        builder.args(&command.args);

        let child = pair.slave.spawn_command(builder).map_err(|e| {
            connection_error(
                host,
                format!("failed to spawn '{}': {}", command.program, e),
            )
        })?;

        // Our copy of the slave would keep the terminal open after ssh exits
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| connection_error(host, format!("failed to clone PTY reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| connection_error(host, format!("failed to take PTY writer: {}", e)))?;

        Ok(Self {
            host: host.to_string(),
            child,
            _master: pair.master,
            writer,
            output_rx: spawn_reader(reader),
            matcher,
            timeout,
            closed: false,
        })
    }

    async fn login(&mut self, password: Option<&str>) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        let mut buffer = Vec::new();
        let mut password_sent = false;

        loop {
            match self.next_chunk(deadline).await {
                Chunk::Data(bytes) => buffer.extend_from_slice(&bytes),
                Chunk::Closed => {
                    return Err(connection_error(
                        &self.host,
                        format!("ssh exited before the device prompt: {}", last_line(&buffer)),
                    ))
                }
                Chunk::TimedOut => {
                    return Err(connection_error(
                        &self.host,
                        format!("no device prompt within {:?}", self.timeout),
                    ))
                }
            }

            let tail = tail_text(&buffer);
            if self.matcher.is_prompt(&tail) {
                debug!("Device prompt detected on {}", self.host);
                return Ok(());
            }

            match detect_login_event(&tail) {
                Some(LoginEvent::Password) => {
                    if password_sent {
                        return Err(connection_error(&self.host, "password rejected"));
                    }
                    let Some(password) = password else {
                        return Err(connection_error(
                            &self.host,
                            "password requested but none configured",
                        ));
                    };
                    self.send_line(password).map_err(|e| {
                        connection_error(&self.host, format!("failed to send password: {}", e))
                    })?;
                    password_sent = true;
                    buffer.clear();
                }
                Some(LoginEvent::Passphrase) => {
                    return Err(connection_error(
                        &self.host,
                        "key passphrase requested; load the key into an ssh agent",
                    ))
                }
                Some(LoginEvent::HostKeyVerification) => {
                    return Err(connection_error(
                        &self.host,
                        "host key is not trusted; add it to known_hosts",
                    ))
                }
                Some(LoginEvent::Failure(message)) => {
                    return Err(connection_error(&self.host, message))
                }
                None => {}
            }
        }
    }

    /// Send a line and collect everything up to the next device prompt
    async fn send_and_wait(
        &mut self,
        command: &str,
        answer: Option<(&Regex, &str)>,
    ) -> std::result::Result<Vec<u8>, WaitError> {
        self.send_line(command).map_err(WaitError::Write)?;

        let deadline = Instant::now() + self.timeout;
        let mut buffer = Vec::new();
        let mut answered = false;

        loop {
            match self.next_chunk(deadline).await {
                Chunk::Data(bytes) => buffer.extend_from_slice(&bytes),
                Chunk::Closed => return Err(WaitError::Closed),
                Chunk::TimedOut => return Err(WaitError::TimedOut),
            }

            let tail = tail_text(&buffer);
            if self.matcher.is_prompt(&tail) {
                return Ok(buffer);
            }

            if let (false, Some((question, reply))) = (answered, answer) {
                if question.is_match(&tail) {
                    debug!("Answering interactive prompt for '{}'", command);
                    self.send_line(reply).map_err(WaitError::Write)?;
                    answered = true;
                }
            }
        }
    }

    async fn next_chunk(&mut self, deadline: Instant) -> Chunk {
        match timeout_at(deadline, self.output_rx.recv()).await {
            Ok(Some(bytes)) => Chunk::Data(bytes),
            Ok(None) => Chunk::Closed,
            Err(_) => Chunk::TimedOut,
        }
    }

    fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\r")?;
        self.writer.flush()
    }

    /// Kill the child if it is still running
    ///
    /// Returns whether it is safe to wait for the child: a failed kill
    /// leaves a process that may never exit.
    fn kill(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_)) => true,
            Ok(None) => match self.child.kill() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to kill ssh process for {}: {}", self.host, e);
                    false
                }
            },
            Err(e) => {
                warn!("Failed to query ssh process for {}: {}", self.host, e);
                false
            }
        }
    }

    /// Kill and reap without blocking the async worker
    async fn reap(&mut self) -> Result<()> {
        if !self.kill() {
            return Ok(());
        }

        let deadline = Instant::now() + CLOSE_GRACE;
        loop {
            if self.child.try_wait()?.is_some() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!("ssh process for {} did not exit after kill", self.host);
                return Ok(());
            }
            tokio::time::sleep(REAP_POLL).await;
        }
    }

    /// Kill and reap from synchronous code
    fn terminate(&mut self) -> std::io::Result<()> {
        if self.kill() {
            self.child.wait()?;
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceSession for SshSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&mut self, record: &CommandRecord) -> Result<String> {
        let command = record.command();
        let question = record.prompt().map(Regex::new).transpose()?;
        let answer = question
            .as_ref()
            .map(|re| (re, record.answer().unwrap_or("")));
        let timeout = self.timeout;

        debug!("Sending '{}' to {}", command, self.host);
        let raw = self
            .send_and_wait(command, answer)
            .await
            .map_err(|e| command_error(command, timeout, e))?;

        let text = String::from_utf8(raw).map_err(|_| Error::Decode {
            command: command.to_string(),
        })?;

        let output = normalize_output(&text, command, &self.matcher);
        if let Some(line) = self.matcher.find_error(&output) {
            return Err(Error::CommandRejected {
                command: command.to_string(),
                output: line.to_string(),
            });
        }

        Ok(output)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("Closing session to {}", self.host);

        if self.send_line("exit").is_ok() {
            let deadline = Instant::now() + CLOSE_GRACE;
            while let Chunk::Data(_) = self.next_chunk(deadline).await {}
        }

        self.reap().await
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.terminate() {
                warn!("Failed to reap ssh process for {}: {}", self.host, e);
            }
        }
    }
}

/// Opens [`SshSession`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    async fn open(&self, device: &DeviceConfig) -> Result<Box<dyn DeviceSession>> {
        let session = SshSession::open(device).await?;
        Ok(Box::new(session))
    }
}

/// Reader thread: forward PTY output to the async side until EOF
fn spawn_reader(mut reader: Box<dyn Read + Send>) -> UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = unbounded_channel::<Vec<u8>>();

    thread::spawn(move || {
        let mut buf = [0u8; 4096];

        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!("PTY read EOF - ssh exited");
                    break;
                }
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        debug!("PTY read: session dropped, stopping reader thread");
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                    continue;
                }
                Err(e) => {
                    // Linux reports a hung-up PTY as EIO
                    debug!("PTY read ended: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

fn connection_error(host: &str, reason: impl Into<String>) -> Error {
    Error::ConnectionFailed {
        host: host.to_string(),
        reason: reason.into(),
    }
}

fn setup_failure(command: &str, error: WaitError) -> String {
    match error {
        WaitError::Closed => format!("connection closed during '{}'", command),
        WaitError::TimedOut => format!("no prompt after '{}'", command),
        WaitError::Write(e) => format!("failed to send '{}': {}", command, e),
    }
}

fn command_error(command: &str, timeout: Duration, error: WaitError) -> Error {
    match error {
        WaitError::Closed => Error::Transport {
            command: command.to_string(),
            reason: "connection closed by remote device".to_string(),
        },
        WaitError::TimedOut => Error::CommandTimeout {
            command: command.to_string(),
            duration: timeout,
        },
        WaitError::Write(e) => Error::Transport {
            command: command.to_string(),
            reason: e.to_string(),
        },
    }
}

fn last_line(buffer: &[u8]) -> String {
    tail_text(buffer)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or("no output")
        .to_string()
}
