//! Command list parsing and validation
//!
//! Turns the caller's command list into normalized [`CommandRecord`]s,
//! refusing anything that would enter configuration mode and, in check
//! mode, planning only `show` commands.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest command line accepted
pub const MAX_COMMAND_LENGTH: usize = 10000;

const CONFIG_PREFIX: &str = "conf";
const SHOW_PREFIX: &str = "show";

/// A command as supplied by the caller: bare text or a structured entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandInput {
    /// Plain command line
    Text(String),
    /// Command with an optional interactive prompt/answer pair
    Structured {
        command: String,
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        answer: Option<String>,
    },
}

impl CommandInput {
    /// Command text as supplied, before normalization
    pub fn command(&self) -> &str {
        match self {
            CommandInput::Text(command) => command,
            CommandInput::Structured { command, .. } => command,
        }
    }
}

impl From<&str> for CommandInput {
    fn from(command: &str) -> Self {
        CommandInput::Text(command.to_string())
    }
}

impl From<String> for CommandInput {
    fn from(command: String) -> Self {
        CommandInput::Text(command)
    }
}

/// A validated command, immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRecord {
    command: String,
    prompt: Option<String>,
    answer: Option<String>,
}

impl CommandRecord {
    /// Command text sent to the device
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Regex for an interactive question the command may raise
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    /// Reply sent when [`prompt`](Self::prompt) matches
    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    /// Whether the command is a read-only `show` command
    pub fn is_show_command(&self) -> bool {
        has_prefix_ignore_case(&self.command, SHOW_PREFIX)
    }
}

/// Outcome of a validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    /// Commands to execute, in request order
    pub commands: Vec<CommandRecord>,
    /// One entry per command skipped in check mode, in request order
    pub warnings: Vec<String>,
}

/// Validate and normalize a command list
///
/// Fails with [`Error::UnsupportedCommand`] as soon as any command starts
/// with `conf` (case-insensitive), wherever it sits in the list. In check
/// mode every command that does not start with `show` is dropped and a
/// warning naming it is recorded instead.
pub fn validate_commands(inputs: &[CommandInput], check_mode: bool) -> Result<Validation> {
    // Config commands are refused before any other check, whatever their position
    if let Some(command) = inputs
        .iter()
        .map(|input| input.command().trim())
        .find(|command| has_prefix_ignore_case(command, CONFIG_PREFIX))
    {
        return Err(Error::UnsupportedCommand {
            command: command.to_string(),
        });
    }

    let mut validation = Validation::default();

    for input in inputs {
        let record = normalize(input)?;

        if check_mode && !record.is_show_command() {
            validation.warnings.push(check_mode_warning(&record.command));
            continue;
        }

        validation.commands.push(record);
    }

    Ok(validation)
}

/// Warning recorded for a command skipped in check mode
pub fn check_mode_warning(command: &str) -> String {
    format!(
        "only show commands are supported when using check mode, not executing `{}`",
        command
    )
}

fn normalize(input: &CommandInput) -> Result<CommandRecord> {
    let (command, prompt, answer) = match input {
        CommandInput::Text(command) => (command.as_str(), None, None),
        CommandInput::Structured {
            command,
            prompt,
            answer,
        } => (command.as_str(), prompt.clone(), answer.clone()),
    };

    let command = command.trim();
    validate_command_line(command)?;

    let prompt = prompt.filter(|p| !p.is_empty());
    if let Some(pattern) = &prompt {
        Regex::new(pattern).map_err(|e| Error::CommandValidationFailed {
            command: command.to_string(),
            reason: format!("Invalid prompt pattern '{}': {}", pattern, e),
        })?;
    }

    Ok(CommandRecord {
        command: command.to_string(),
        prompt,
        answer,
    })
}

/// Check that a command can be sent as exactly one CLI line
pub fn validate_command_line(command: &str) -> Result<()> {
    if command.is_empty() {
        return Err(Error::CommandValidationFailed {
            command: String::new(),
            reason: "Command cannot be empty".to_string(),
        });
    }

    if command.len() > MAX_COMMAND_LENGTH {
        return Err(Error::CommandValidationFailed {
            command: command.chars().take(50).collect(),
            reason: format!("Command too long (max {} chars)", MAX_COMMAND_LENGTH),
        });
    }

    // A line break would smuggle a second command past the config check
    if command.chars().any(|c| c.is_control() && c != '\t') {
        return Err(Error::CommandValidationFailed {
            command: command.escape_debug().to_string(),
            reason: "Command contains control characters".to_string(),
        });
    }

    Ok(())
}

fn has_prefix_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}
