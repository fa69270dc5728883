// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitStatus;

// --- STDIO NEGOTIATION ---

/// How one of a child's standard streams is connected to the parent.
///
/// Each of stdin/stdout/stderr is negotiated independently. A stream that
/// is not `Piped` has no readable/writable endpoint on the running handle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StdioMode {
    /// The child shares the parent's stream.
    #[default]
    Inherit,
    /// The stream is discarded.
    Null,
    /// The stream is captured and exposed as a byte-stream endpoint.
    Piped,
}

// --- EXIT STATUS ---

/// Snapshot of a finished process: exit code, optional termination signal,
/// and the derived success flag.
///
/// `success` is `code == 0`, independent of whether a signal was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    pub success: bool,
    pub code: i32,
    pub signal: Option<i32>,
}

impl From<ExitStatus> for CommandStatus {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        // A signal-terminated process has no exit code; report 1 like the
        // underlying launch primitives do.
        let code = status.code().unwrap_or(1);
        Self {
            success: code == 0,
            code,
            signal,
        }
    }
}

// --- SHELL TABLE MODELS (FOR shells.toml) ---
// These are what the user sees and edits in shells.toml.

/// One shell dialect: where its interpreter lives and how a script body is
/// handed to it.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ShellConfig {
    /// Interpreter executable name or path.
    pub path: PathBuf,
    /// Arguments placed before the script target.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extension for materialized script files (without the dot).
    #[serde(default = "default_extension")]
    pub extension: String,
    /// When true the script body is passed inline as the final argument
    /// (a `-c`-style dialect) and no temporary file is created.
    #[serde(default)]
    pub inline: bool,
}

fn default_extension() -> String {
    "sh".to_string()
}

/// The full shell table, keyed by shell name.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ShellsConfig {
    pub shells: HashMap<String, ShellConfig>,
}
