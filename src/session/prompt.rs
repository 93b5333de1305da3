//! Prompt Detection Logic
//!
//! Recognizes the device CLI prompt, the questions ssh asks during login,
//! and the markers a device prints when it refuses a command.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;

/// Default device prompt: `router>`, `switch-01#`, `RP/0/RSP0/CPU0:xr#`
pub const DEFAULT_PROMPT_PATTERN: &str = r"[\w+\-.:/\[\]@()]+[>#]\s*$";

/// Default markers of a device-side command failure
pub const DEFAULT_ERROR_PATTERNS: &[&str] = &[
    r"% ?Error",
    r"% ?Bad secret",
    r"(?i)invalid input",
    r"(?i)(?:incomplete|ambiguous) command",
    r"Command authorization failed",
];

/// ssh client messages that end a login attempt
const SSH_FAILURES: &[&str] = &[
    "permission denied",
    "connection refused",
    "could not resolve hostname",
    "host key verification failed",
    "connection timed out",
    "no route to host",
    "connection closed by",
];

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[@-Z\\-_])")
        .expect("ANSI escape pattern is valid")
});

/// Something ssh asked or reported before the device prompt appeared
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    /// Password authentication
    Password,
    /// SSH key passphrase entry
    Passphrase,
    /// Unknown host key (yes/no/fingerprint)
    HostKeyVerification,
    /// Fatal ssh client message
    Failure(String),
}

/// Detect ssh login prompts and failures at the end of `text`
pub fn detect_login_event(text: &str) -> Option<LoginEvent> {
    let text_lower = text.to_lowercase();

    if text_lower.contains("the authenticity of host")
        || text_lower.contains("are you sure you want to continue connecting")
    {
        return Some(LoginEvent::HostKeyVerification);
    }

    if text_lower.contains("enter passphrase for key") {
        return Some(LoginEvent::Passphrase);
    }

    if let Some(line) = text
        .lines()
        .find(|line| SSH_FAILURES.iter().any(|m| line.to_lowercase().contains(m)))
    {
        return Some(LoginEvent::Failure(line.trim().to_string()));
    }

    // Only an actual prompt, not any line mentioning passwords
    let trimmed = text_lower.trim_end();
    if trimmed.ends_with("password:") || trimmed.ends_with("password for") {
        return Some(LoginEvent::Password);
    }
    if let Some(last) = trimmed.lines().last() {
        if last.contains("password") && last.ends_with(':') {
            return Some(LoginEvent::Password);
        }
    }

    None
}

/// Compiled prompt and error patterns for one device
#[derive(Debug, Clone)]
pub struct PromptMatcher {
    prompt: Regex,
    errors: Vec<Regex>,
}

impl PromptMatcher {
    /// Compile the patterns
    pub fn new(prompt_pattern: &str, error_patterns: &[String]) -> Result<Self> {
        let prompt = Regex::new(prompt_pattern)?;
        let errors = error_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { prompt, errors })
    }

    /// Whether `text` ends with the device prompt
    pub fn is_prompt(&self, text: &str) -> bool {
        self.prompt.is_match(text)
    }

    /// First line of `output` carrying a device error marker
    pub fn find_error<'a>(&self, output: &'a str) -> Option<&'a str> {
        output
            .lines()
            .find(|line| self.errors.iter().any(|re| re.is_match(line)))
    }
}

impl Default for PromptMatcher {
    fn default() -> Self {
        Self {
            prompt: Regex::new(DEFAULT_PROMPT_PATTERN).expect("default prompt pattern is valid"),
            errors: DEFAULT_ERROR_PATTERNS
                .iter()
                .map(|p| Regex::new(p).expect("default error pattern is valid"))
                .collect(),
        }
    }
}

/// Strip ANSI escape sequences from text
pub fn strip_ansi_codes(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").to_string()
}
