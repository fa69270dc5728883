// src/core/output.rs

use crate::models::CommandStatus;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use std::fmt;

/// The immutable result of a completed process execution.
///
/// Holds the raw captured byte buffers (empty for streams that were not
/// captured) plus the exit status, and derives higher-level views on
/// demand. Each view is computed once and memoized; the memoization is
/// presence-based, so an empty decoded string is still a cache hit and
/// never recomputed.
pub struct Output {
    /// Raw captured stdout bytes. Empty if stdout was not captured.
    pub stdout: Vec<u8>,
    /// Raw captured stderr bytes. Empty if stderr was not captured.
    pub stderr: Vec<u8>,
    /// Exit code of the process.
    pub code: i32,
    /// Signal that terminated the process, if any.
    pub signal: Option<i32>,
    /// Whether the exit code was zero.
    pub success: bool,
    text: OnceCell<String>,
    lines: OnceCell<Vec<String>>,
    json: OnceCell<serde_json::Value>,
    error_text: OnceCell<String>,
    error_lines: OnceCell<Vec<String>>,
    error_json: OnceCell<serde_json::Value>,
}

impl Output {
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, status: CommandStatus) -> Self {
        Self {
            stdout,
            stderr,
            code: status.code,
            signal: status.signal,
            success: status.success,
            text: OnceCell::new(),
            lines: OnceCell::new(),
            json: OnceCell::new(),
            error_text: OnceCell::new(),
            error_lines: OnceCell::new(),
            error_json: OnceCell::new(),
        }
    }

    pub fn status(&self) -> CommandStatus {
        CommandStatus {
            success: self.success,
            code: self.code,
            signal: self.signal,
        }
    }

    /// Captured stdout decoded as UTF-8 (invalid sequences become U+FFFD).
    ///
    /// A zero-length buffer yields `""` without running the decoder.
    pub fn text(&self) -> &str {
        self.text.get_or_init(|| decode(&self.stdout))
    }

    /// [`text`](Self::text) split on CRLF-or-LF boundaries.
    ///
    /// Empty text yields a single-element slice containing the empty
    /// string, never an empty slice.
    pub fn lines(&self) -> &[String] {
        self.lines.get_or_init(|| split_lines(self.text()))
    }

    /// Captured stdout parsed as JSON.
    ///
    /// # Errors
    /// Returns the parse error on every call while the text is not valid
    /// JSON; a successful parse is cached.
    pub fn json(&self) -> Result<&serde_json::Value, serde_json::Error> {
        if let Some(value) = self.json.get() {
            return Ok(value);
        }
        let value: serde_json::Value = serde_json::from_str(self.text())?;
        Ok(self.json.get_or_init(|| value))
    }

    /// Captured stderr decoded as UTF-8, with the same rules as
    /// [`text`](Self::text).
    pub fn error_text(&self) -> &str {
        self.error_text.get_or_init(|| decode(&self.stderr))
    }

    /// [`error_text`](Self::error_text) split on CRLF-or-LF boundaries.
    pub fn error_lines(&self) -> &[String] {
        self.error_lines
            .get_or_init(|| split_lines(self.error_text()))
    }

    /// Captured stderr parsed as JSON, with the same caching rules as
    /// [`json`](Self::json).
    ///
    /// # Errors
    /// Returns the parse error on every call while the text is not valid
    /// JSON.
    pub fn error_json(&self) -> Result<&serde_json::Value, serde_json::Error> {
        if let Some(value) = self.error_json.get() {
            return Ok(value);
        }
        let value: serde_json::Value = serde_json::from_str(self.error_text())?;
        Ok(self.error_json.get_or_init(|| value))
    }

    /// Deserializes captured stdout into a typed value.
    ///
    /// # Errors
    /// Returns the underlying JSON error when the text does not parse
    /// into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(self.text())
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("code", &self.code)
            .field("signal", &self.signal)
            .field("success", &self.success)
            .field("stdout_len", &self.stdout.len())
            .field("stderr_len", &self.stderr.len())
            .finish()
    }
}

fn decode(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    String::from_utf8_lossy(bytes).into_owned()
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}
