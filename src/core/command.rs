// src/core/command.rs

use crate::core::cancellation::CancellationToken;
use crate::core::output::Output;
use crate::models::StdioMode;
use crate::system::child::ChildProcess;
use crate::system::launcher::{self, Launcher};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("no executable specified to run")]
    EmptyExecutable,
    #[error("arguments could not be parsed: {0}")]
    ArgsParse(String),
    #[error("'{exe}' could not be launched: {source}")]
    Launch {
        exe: String,
        #[source]
        source: io::Error,
    },
    #[error("i/o failure while running '{exe}': {source}")]
    Io {
        exe: String,
        #[source]
        source: io::Error,
    },
    #[error("{channel} is not available on this process handle")]
    StreamUnavailable { channel: &'static str },
    #[error("operation was cancelled before launch")]
    Cancelled,
}

/// Arguments for an executable, before materialization.
///
/// Either an already-flat ordered list, or a single command-line string
/// that is split with shell-style quoting rules at launch time.
#[derive(Debug, Clone)]
pub enum CommandArgs {
    Line(String),
    List(Vec<String>),
}

impl CommandArgs {
    /// Materializes into the flat ordered list handed to the executable.
    pub fn flatten(&self) -> Result<Vec<String>, CommandError> {
        match self {
            Self::List(list) => Ok(list.clone()),
            Self::Line(line) => {
                shlex::split(line).ok_or_else(|| CommandError::ArgsParse(line.clone()))
            }
        }
    }
}

impl From<&str> for CommandArgs {
    fn from(line: &str) -> Self {
        Self::Line(line.to_string())
    }
}

impl From<String> for CommandArgs {
    fn from(line: String) -> Self {
        Self::Line(line)
    }
}

impl From<Vec<String>> for CommandArgs {
    fn from(list: Vec<String>) -> Self {
        Self::List(list)
    }
}

impl From<Vec<&str>> for CommandArgs {
    fn from(list: Vec<&str>) -> Self {
        Self::List(list.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for CommandArgs {
    fn from(list: &[&str]) -> Self {
        Self::List(list.iter().map(|s| (*s).to_string()).collect())
    }
}

/// Per-convention stdio defaults. An explicit caller choice always wins;
/// the defaults below only fill the gaps.
struct StdioDefaults {
    stdin: StdioMode,
    stdout: StdioMode,
    stderr: StdioMode,
}

/// Fire-and-forget and live-handle runs share the terminal.
const INHERIT_DEFAULTS: StdioDefaults = StdioDefaults {
    stdin: StdioMode::Inherit,
    stdout: StdioMode::Inherit,
    stderr: StdioMode::Inherit,
};

/// Buffered capture pays for piping both output streams.
const CAPTURE_DEFAULTS: StdioDefaults = StdioDefaults {
    stdin: StdioMode::Inherit,
    stdout: StdioMode::Piped,
    stderr: StdioMode::Piped,
};

/// A declarative description of a process to launch.
///
/// Built once per invocation with `with_*` methods, then executed through
/// one of three calling conventions that differ only in default stdio
/// wiring:
///
/// - [`run`](Self::run) / [`run_sync`](Self::run_sync): everything
///   inherited; returns a completed [`Output`] whose buffers are empty.
/// - [`output`](Self::output) / [`output_sync`](Self::output_sync):
///   stdout/stderr captured; returns an [`Output`] carrying the bytes.
/// - [`spawn`](Self::spawn): everything inherited; returns a live
///   [`ChildProcess`] immediately.
#[derive(Debug, Clone, Default)]
pub struct Command {
    exe: String,
    args: Option<CommandArgs>,
    cwd: Option<PathBuf>,
    env: HashMap<String, String>,
    clear_env: bool,
    uid: Option<u32>,
    gid: Option<u32>,
    signal: Option<CancellationToken>,
    stdin: Option<StdioMode>,
    stdout: Option<StdioMode>,
    stderr: Option<StdioMode>,
    raw_arguments: bool,
}

impl Command {
    pub fn new(exe: impl Into<String>) -> Self {
        Self {
            exe: exe.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: impl Into<CommandArgs>) -> Self {
        self.args = Some(args.into());
        self
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Adds one variable to the environment overlay merged over the
    /// inherited environment.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Extends the environment overlay from an iterator of pairs.
    #[must_use]
    pub fn with_envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// When set, the child starts from an empty environment and the
    /// overlay becomes its entire environment.
    #[must_use]
    pub fn with_clear_env(mut self, clear: bool) -> Self {
        self.clear_env = clear;
        self
    }

    /// Unix user id to run as. Ignored elsewhere.
    #[must_use]
    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    /// Unix group id to run as. Ignored elsewhere.
    #[must_use]
    pub fn with_gid(mut self, gid: u32) -> Self {
        self.gid = Some(gid);
        self
    }

    #[must_use]
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    #[must_use]
    pub fn with_stdin(mut self, mode: StdioMode) -> Self {
        self.stdin = Some(mode);
        self
    }

    #[must_use]
    pub fn with_stdout(mut self, mode: StdioMode) -> Self {
        self.stdout = Some(mode);
        self
    }

    #[must_use]
    pub fn with_stderr(mut self, mode: StdioMode) -> Self {
        self.stderr = Some(mode);
        self
    }

    /// Passes arguments verbatim on Windows instead of re-quoting them.
    /// No effect elsewhere.
    #[must_use]
    pub fn with_raw_arguments(mut self, raw: bool) -> Self {
        self.raw_arguments = raw;
        self
    }

    // --- Calling conventions ---

    /// Runs to completion with inherited stdio.
    ///
    /// # Errors
    /// Fails on launch failure or argument parse failure; a non-zero exit
    /// is data on the returned [`Output`], not an error.
    pub async fn run(&self) -> Result<Output, CommandError> {
        let handle = launcher::native().launch(&self.plan(&INHERIT_DEFAULTS)?)?;
        handle.output().await
    }

    /// Blocking variant of [`run`](Self::run).
    ///
    /// # Errors
    /// Same failure surface as [`run`](Self::run).
    pub fn run_sync(&self) -> Result<Output, CommandError> {
        launcher::native().launch_sync(&self.plan(&INHERIT_DEFAULTS)?)
    }

    /// Runs to completion capturing stdout and stderr.
    ///
    /// # Errors
    /// Fails on launch failure or argument parse failure; a non-zero exit
    /// is data on the returned [`Output`], not an error.
    pub async fn output(&self) -> Result<Output, CommandError> {
        self.output_with(launcher::native()).await
    }

    /// Blocking variant of [`output`](Self::output).
    ///
    /// # Errors
    /// Same failure surface as [`output`](Self::output).
    pub fn output_sync(&self) -> Result<Output, CommandError> {
        self.output_sync_with(launcher::native())
    }

    /// Starts the process and returns a live handle immediately.
    ///
    /// When a cancellation token is attached this must be called within a
    /// tokio runtime, which hosts the cancellation watcher.
    ///
    /// # Errors
    /// Fails on launch failure or argument parse failure.
    pub fn spawn(&self) -> Result<ChildProcess, CommandError> {
        self.spawn_with(launcher::native())
    }

    // --- Backend injection points ---

    /// [`output`](Self::output) through an explicit launch backend.
    ///
    /// # Errors
    /// Same failure surface as [`output`](Self::output).
    pub async fn output_with(&self, launcher: &dyn Launcher) -> Result<Output, CommandError> {
        let handle = launcher.launch(&self.plan(&CAPTURE_DEFAULTS)?)?;
        handle.output().await
    }

    /// [`output_sync`](Self::output_sync) through an explicit launch
    /// backend.
    ///
    /// # Errors
    /// Same failure surface as [`output_sync`](Self::output_sync).
    pub fn output_sync_with(&self, launcher: &dyn Launcher) -> Result<Output, CommandError> {
        launcher.launch_sync(&self.plan(&CAPTURE_DEFAULTS)?)
    }

    /// [`spawn`](Self::spawn) through an explicit launch backend.
    ///
    /// # Errors
    /// Same failure surface as [`spawn`](Self::spawn).
    pub fn spawn_with(&self, launcher: &dyn Launcher) -> Result<ChildProcess, CommandError> {
        launcher.launch(&self.plan(&INHERIT_DEFAULTS)?)
    }

    /// Resolves the command against convention defaults into the concrete
    /// plan handed to the launch backend.
    fn plan(&self, defaults: &StdioDefaults) -> Result<LaunchPlan, CommandError> {
        if self.exe.trim().is_empty() {
            return Err(CommandError::EmptyExecutable);
        }
        let args = match &self.args {
            Some(args) => args.flatten()?,
            None => Vec::new(),
        };
        Ok(LaunchPlan {
            exe: self.exe.clone(),
            args,
            cwd: self.cwd.clone(),
            env: self.env.clone(),
            clear_env: self.clear_env,
            uid: self.uid,
            gid: self.gid,
            signal: self.signal.clone(),
            stdin: self.stdin.unwrap_or(defaults.stdin),
            stdout: self.stdout.unwrap_or(defaults.stdout),
            stderr: self.stderr.unwrap_or(defaults.stderr),
            raw_arguments: self.raw_arguments,
        })
    }
}

/// A fully resolved launch: defaults applied, arguments materialized.
/// This is the value a [`Launcher`] backend consumes.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub exe: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub clear_env: bool,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub signal: Option<CancellationToken>,
    pub stdin: StdioMode,
    pub stdout: StdioMode,
    pub stderr: StdioMode,
    pub raw_arguments: bool,
}

// --- Convention free functions ---

/// Runs `exe` to completion with inherited stdio.
///
/// # Errors
/// Same failure surface as [`Command::run`].
pub async fn run(exe: &str, args: impl Into<CommandArgs>) -> Result<Output, CommandError> {
    Command::new(exe).with_args(args).run().await
}

/// Blocking variant of [`run`].
///
/// # Errors
/// Same failure surface as [`Command::run_sync`].
pub fn run_sync(exe: &str, args: impl Into<CommandArgs>) -> Result<Output, CommandError> {
    Command::new(exe).with_args(args).run_sync()
}

/// Runs `exe` to completion capturing stdout and stderr.
///
/// # Errors
/// Same failure surface as [`Command::output`].
pub async fn output(exe: &str, args: impl Into<CommandArgs>) -> Result<Output, CommandError> {
    Command::new(exe).with_args(args).output().await
}

/// Blocking variant of [`output`].
///
/// # Errors
/// Same failure surface as [`Command::output_sync`].
pub fn output_sync(exe: &str, args: impl Into<CommandArgs>) -> Result<Output, CommandError> {
    Command::new(exe).with_args(args).output_sync()
}

/// Starts `exe` and returns a live handle immediately.
///
/// # Errors
/// Same failure surface as [`Command::spawn`].
pub fn spawn(exe: &str, args: impl Into<CommandArgs>) -> Result<ChildProcess, CommandError> {
    Command::new(exe).with_args(args).spawn()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_command(script: &str) -> Command {
        if cfg!(windows) {
            Command::new("cmd").with_args(vec!["/C", script])
        } else {
            Command::new("sh").with_args(vec!["-c", script])
        }
    }

    // --- argument materialization ---

    #[test]
    fn test_args_line_is_shell_split() {
        let args = CommandArgs::from("show-ref master").flatten().unwrap();
        assert_eq!(args, ["show-ref", "master"]);
    }

    #[test]
    fn test_args_line_respects_quoting() {
        let args = CommandArgs::from("commit -m 'first cut'").flatten().unwrap();
        assert_eq!(args, ["commit", "-m", "first cut"]);
    }

    #[test]
    fn test_args_unbalanced_quote_is_parse_error() {
        let result = CommandArgs::from("commit -m 'oops").flatten();
        assert!(matches!(result, Err(CommandError::ArgsParse(_))));
    }

    #[test]
    fn test_args_list_passes_through_untouched() {
        let args = CommandArgs::from(vec!["a b", "c"]).flatten().unwrap();
        assert_eq!(args, ["a b", "c"]);
    }

    // --- stdio defaults per convention ---

    #[test]
    fn test_capture_defaults_pipe_both_outputs() {
        let plan = Command::new("tool").plan(&CAPTURE_DEFAULTS).unwrap();
        assert_eq!(plan.stdin, StdioMode::Inherit);
        assert_eq!(plan.stdout, StdioMode::Piped);
        assert_eq!(plan.stderr, StdioMode::Piped);
    }

    #[test]
    fn test_inherit_defaults_leave_terminal_attached() {
        let plan = Command::new("tool").plan(&INHERIT_DEFAULTS).unwrap();
        assert_eq!(plan.stdin, StdioMode::Inherit);
        assert_eq!(plan.stdout, StdioMode::Inherit);
        assert_eq!(plan.stderr, StdioMode::Inherit);
    }

    #[test]
    fn test_explicit_stdio_choice_beats_convention_default() {
        let plan = Command::new("tool")
            .with_stdout(StdioMode::Null)
            .with_stdin(StdioMode::Piped)
            .plan(&CAPTURE_DEFAULTS)
            .unwrap();
        assert_eq!(plan.stdout, StdioMode::Null);
        assert_eq!(plan.stdin, StdioMode::Piped);
        // The unspecified channel still follows the convention.
        assert_eq!(plan.stderr, StdioMode::Piped);
    }

    #[test]
    fn test_empty_executable_is_rejected() {
        let result = Command::new("  ").plan(&CAPTURE_DEFAULTS);
        assert!(matches!(result, Err(CommandError::EmptyExecutable)));
    }

    // --- execution through the native backend ---

    #[tokio::test]
    async fn test_output_captures_known_bytes() {
        let out = shell_command("echo hello").output().await.unwrap();
        assert!(out.success);
        assert_eq!(out.code, 0);
        assert_eq!(out.text().trim_end(), "hello");
        // The decoded view is cached, not recomputed.
        assert_eq!(out.text().as_ptr(), out.text().as_ptr());
    }

    #[tokio::test]
    async fn test_output_with_inherited_stdout_captures_nothing() {
        let out = shell_command("echo hello")
            .with_stdout(StdioMode::Inherit)
            .output()
            .await
            .unwrap();
        assert_eq!(out.code, 0);
        assert!(out.stdout.is_empty());
        assert_eq!(out.text(), "");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_data_not_error() {
        let out = shell_command("exit 3").output().await.unwrap();
        assert!(!out.success);
        assert_eq!(out.code, 3);
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let result = Command::new("definitely-missing-tool-9f3a")
            .output()
            .await;
        assert!(matches!(result, Err(CommandError::Launch { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cwd_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), b"x").unwrap();
        let out = Command::new("ls")
            .with_cwd(dir.path())
            .output()
            .await
            .unwrap();
        assert!(out.text().contains("marker.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_overlay_reaches_child() {
        let out = Command::new("sh")
            .with_args(vec!["-c", "printf '%s' \"$EXEKIT_TEST_VALUE\""])
            .with_env("EXEKIT_TEST_VALUE", "overlaid")
            .output()
            .await
            .unwrap();
        assert_eq!(out.text(), "overlaid");
    }

    #[tokio::test]
    async fn test_run_reports_status_with_empty_buffers() {
        let out = shell_command("exit 0")
            .with_stdout(StdioMode::Null)
            .with_stderr(StdioMode::Null)
            .run()
            .await
            .unwrap();
        assert!(out.success);
        assert!(out.stdout.is_empty());
        assert!(out.stderr.is_empty());
    }

    #[test]
    fn test_output_sync_matches_async_semantics() {
        let out = shell_command("echo sync").output_sync().unwrap();
        assert!(out.success);
        assert_eq!(out.text().trim_end(), "sync");
    }

    #[test]
    fn test_run_sync_reports_exit_code() {
        let out = shell_command("exit 5")
            .with_stdout(StdioMode::Null)
            .with_stderr(StdioMode::Null)
            .run_sync()
            .unwrap();
        assert_eq!(out.code, 5);
        assert!(!out.success);
    }

    #[tokio::test]
    async fn test_free_functions_mirror_methods() {
        let exe = if cfg!(windows) { "cmd" } else { "sh" };
        let args: Vec<&str> = if cfg!(windows) {
            vec!["/C", "echo free"]
        } else {
            vec!["-c", "echo free"]
        };
        let out = output(exe, args).await.unwrap();
        assert_eq!(out.text().trim_end(), "free");
    }
}
