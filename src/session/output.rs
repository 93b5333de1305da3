//! Device output cleanup
//!
//! Turns what came back over the terminal into the text a caller expects:
//! no escape sequences, `\n` line endings, and neither the echoed command
//! nor the trailing prompt.

use super::prompt::{strip_ansi_codes, PromptMatcher};

/// Bytes of trailing output inspected when looking for prompts
pub const TAIL_WINDOW: usize = 512;

/// Normalize one command's raw response
pub fn normalize_output(raw: &str, command: &str, matcher: &PromptMatcher) -> String {
    let text = normalize_line_endings(&strip_ansi_codes(raw));
    let mut lines: Vec<&str> = text.split('\n').collect();

    if let Some(first) = lines.first() {
        if first.trim_end().ends_with(command) {
            lines.remove(0);
        }
    }

    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }

    if let Some(last) = lines.last() {
        if matcher.is_prompt(last) {
            lines.pop();
        }
    }

    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

/// Fold `\r\n` and stray `\r` into plain `\n` line structure
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "")
}

/// Lossy view of the end of `buffer`, for prompt matching only
pub fn tail_text(buffer: &[u8]) -> String {
    let start = buffer.len().saturating_sub(TAIL_WINDOW);
    strip_ansi_codes(&String::from_utf8_lossy(&buffer[start..]))
}
