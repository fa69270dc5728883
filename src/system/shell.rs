// src/system/shell.rs

use crate::constants::SCRIPT_FILE_PREFIX;
use crate::core::cancellation::CancellationToken;
use crate::core::command::{Command, CommandArgs, CommandError};
use crate::core::output::Output;
use crate::models::{ShellConfig, StdioMode};
use crate::system::child::ChildProcess;
use crate::system::shells_config;
use scopeguard::ScopeGuard;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("requested shell '{0}' is not defined in the shell table")]
    ShellNotDefined(String),
    #[error("failed to parse shells.toml: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// A script body executed through a shell interpreter.
///
/// File dialects get the body materialized as a uniquely named temporary
/// script that is deleted on every exit path: after completion for the
/// buffered conventions, at handle disposal for [`spawn`](Self::spawn).
/// Inline (`-c`-style) dialects receive the body directly and create no
/// file. Caller-supplied positional arguments are appended only when a
/// script file is the executed target.
///
/// The same four calling conventions as [`Command`] are available.
#[derive(Debug, Clone, Default)]
pub struct Script {
    body: String,
    shell: Option<String>,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: HashMap<String, String>,
    signal: Option<CancellationToken>,
    stdin: Option<StdioMode>,
    stdout: Option<StdioMode>,
    stderr: Option<StdioMode>,
}

impl Script {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Selects the shell dialect by table name ("bash", "sh", "cmd", …).
    /// Defaults to the platform shell.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    /// Positional arguments handed to the script file.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
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

    // --- Calling conventions ---

    /// Runs the script to completion with inherited stdio.
    ///
    /// # Errors
    /// Shell-table and temp-file failures, plus the [`Command::run`]
    /// failure surface.
    pub async fn run(&self) -> Result<Output, ShellError> {
        let shell = shells_config::resolve_shell(self.shell.as_deref())?;
        if shell.inline {
            return Ok(self.command_for(&shell, ScriptTarget::Inline).run().await?);
        }
        let script_path = self.materialize(&shell.extension)?;
        let _cleanup = scopeguard::guard(script_path.clone(), |path| remove_script(&path));
        let out = self
            .command_for(&shell, ScriptTarget::File(script_path))
            .run()
            .await?;
        Ok(out)
    }

    /// Blocking variant of [`run`](Self::run).
    ///
    /// # Errors
    /// Same failure surface as [`run`](Self::run).
    pub fn run_sync(&self) -> Result<Output, ShellError> {
        let shell = shells_config::resolve_shell(self.shell.as_deref())?;
        if shell.inline {
            return Ok(self.command_for(&shell, ScriptTarget::Inline).run_sync()?);
        }
        let script_path = self.materialize(&shell.extension)?;
        let _cleanup = scopeguard::guard(script_path.clone(), |path| remove_script(&path));
        let out = self
            .command_for(&shell, ScriptTarget::File(script_path))
            .run_sync()?;
        Ok(out)
    }

    /// Runs the script to completion capturing stdout and stderr.
    ///
    /// # Errors
    /// Shell-table and temp-file failures, plus the [`Command::output`]
    /// failure surface.
    pub async fn output(&self) -> Result<Output, ShellError> {
        let shell = shells_config::resolve_shell(self.shell.as_deref())?;
        if shell.inline {
            return Ok(self
                .command_for(&shell, ScriptTarget::Inline)
                .output()
                .await?);
        }
        let script_path = self.materialize(&shell.extension)?;
        let _cleanup = scopeguard::guard(script_path.clone(), |path| remove_script(&path));
        let out = self
            .command_for(&shell, ScriptTarget::File(script_path))
            .output()
            .await?;
        Ok(out)
    }

    /// Blocking variant of [`output`](Self::output).
    ///
    /// # Errors
    /// Same failure surface as [`output`](Self::output).
    pub fn output_sync(&self) -> Result<Output, ShellError> {
        let shell = shells_config::resolve_shell(self.shell.as_deref())?;
        if shell.inline {
            return Ok(self.command_for(&shell, ScriptTarget::Inline).output_sync()?);
        }
        let script_path = self.materialize(&shell.extension)?;
        let _cleanup = scopeguard::guard(script_path.clone(), |path| remove_script(&path));
        let out = self
            .command_for(&shell, ScriptTarget::File(script_path))
            .output_sync()?;
        Ok(out)
    }

    /// Starts the script and returns a live handle immediately.
    ///
    /// The handle cannot be wrapped in a scoped cleanup, so the temp
    /// script's deletion is registered as a disposal callback instead:
    /// it runs exactly once, after the process has fully exited.
    ///
    /// # Errors
    /// Shell-table and temp-file failures, plus the [`Command::spawn`]
    /// failure surface. A launch failure still deletes the script file.
    pub fn spawn(&self) -> Result<ChildProcess, ShellError> {
        let shell = shells_config::resolve_shell(self.shell.as_deref())?;
        if shell.inline {
            return Ok(self.command_for(&shell, ScriptTarget::Inline).spawn()?);
        }
        let script_path = self.materialize(&shell.extension)?;
        let cleanup = scopeguard::guard(script_path.clone(), |path| remove_script(&path));
        let mut handle = self
            .command_for(&shell, ScriptTarget::File(script_path))
            .spawn()?;
        // Launched: cleanup responsibility moves from the guard to the
        // handle's disposal hook.
        let script_path = ScopeGuard::into_inner(cleanup);
        handle.on_dispose(move || remove_script(&script_path));
        Ok(handle)
    }

    /// Writes the body into a uniquely named script file with the
    /// dialect's extension. The caller owns the returned path and its
    /// deletion.
    fn materialize(&self, extension: &str) -> Result<PathBuf, ShellError> {
        let placeholder = NamedTempFile::with_prefix(SCRIPT_FILE_PREFIX)?.into_temp_path();
        let script_path = placeholder.with_extension(extension);
        fs::write(&script_path, &self.body)?;
        log::debug!("temporary script written to: {}", script_path.display());
        Ok(script_path)
    }

    fn command_for(&self, shell: &ShellConfig, target: ScriptTarget) -> Command {
        let mut argv: Vec<String> = shell.args.clone();
        match target {
            ScriptTarget::Inline => {
                argv.push(self.body.clone());
                if !self.args.is_empty() {
                    log::debug!("positional arguments are ignored for inline shell dialects");
                }
            }
            ScriptTarget::File(path) => {
                argv.push(path.to_string_lossy().into_owned());
                argv.extend(self.args.iter().cloned());
            }
        }

        let mut cmd = Command::new(shell.path.to_string_lossy().into_owned())
            .with_args(CommandArgs::List(argv))
            .with_envs(self.env.clone());
        if let Some(cwd) = &self.cwd {
            cmd = cmd.with_cwd(cwd);
        }
        if let Some(signal) = &self.signal {
            cmd = cmd.with_signal(signal.clone());
        }
        if let Some(mode) = self.stdin {
            cmd = cmd.with_stdin(mode);
        }
        if let Some(mode) = self.stdout {
            cmd = cmd.with_stdout(mode);
        }
        if let Some(mode) = self.stderr {
            cmd = cmd.with_stderr(mode);
        }
        cmd
    }
}

enum ScriptTarget {
    File(PathBuf),
    Inline,
}

/// Deletes a materialized script. Failures never mask the execution's
/// real outcome; anything but "already gone" is logged.
fn remove_script(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!(
                "failed to remove temporary script '{}': {}",
                path.display(),
                e
            );
        }
    }
}

// --- Convention free functions ---

/// Runs `body` through the default shell with inherited stdio.
///
/// # Errors
/// Same failure surface as [`Script::run`].
pub async fn run_script(body: &str) -> Result<Output, ShellError> {
    Script::new(body).run().await
}

/// Runs `body` through the default shell, capturing stdout and stderr.
///
/// # Errors
/// Same failure surface as [`Script::output`].
pub async fn output_script(body: &str) -> Result<Output, ShellError> {
    Script::new(body).output().await
}

/// Blocking variant of [`output_script`].
///
/// # Errors
/// Same failure surface as [`Script::output_sync`].
pub fn output_script_sync(body: &str) -> Result<Output, ShellError> {
    Script::new(body).output_sync()
}

/// Starts `body` through the default shell and returns the live handle.
///
/// # Errors
/// Same failure surface as [`Script::spawn`].
pub fn spawn_script(body: &str) -> Result<ChildProcess, ShellError> {
    Script::new(body).spawn()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    mod posix {
        use super::super::*;
        use std::time::Duration;

        #[tokio::test]
        async fn test_script_file_runs_and_is_deleted() {
            // $0 is the materialized script path when a file is the
            // executed target.
            let out = Script::new("echo \"$0\"")
                .with_shell("bash")
                .output()
                .await
                .unwrap();
            assert!(out.success);
            let script_path = out.text().trim().to_string();
            assert!(script_path.contains(crate::constants::SCRIPT_FILE_PREFIX));
            assert!(script_path.ends_with(".sh"));
            assert!(
                !Path::new(&script_path).exists(),
                "script file must be deleted after the call"
            );
        }

        #[tokio::test]
        async fn test_failed_script_is_still_deleted() {
            let out = Script::new("echo \"$0\"; exit 3")
                .with_shell("bash")
                .output()
                .await
                .unwrap();
            assert!(!out.success);
            assert_eq!(out.code, 3);
            let script_path = out.text().trim().to_string();
            assert!(!Path::new(&script_path).exists());
        }

        #[test]
        fn test_sync_script_file_is_deleted() {
            let out = Script::new("echo \"$0\"")
                .with_shell("bash")
                .output_sync()
                .unwrap();
            let script_path = out.text().trim().to_string();
            assert!(!Path::new(&script_path).exists());
        }

        #[tokio::test]
        async fn test_positional_args_reach_file_scripts() {
            let out = Script::new("printf '%s-%s' \"$1\" \"$2\"")
                .with_shell("bash")
                .with_args(["alpha", "beta"])
                .output()
                .await
                .unwrap();
            assert_eq!(out.text(), "alpha-beta");
        }

        #[tokio::test]
        async fn test_inline_dialect_skips_the_temp_file() {
            // sh is an inline dialect: $0 is the interpreter name, not a
            // script path.
            let out = Script::new("printf '%s' \"$0\"")
                .with_shell("sh")
                .output()
                .await
                .unwrap();
            assert!(out.success);
            assert!(!out.text().contains(crate::constants::SCRIPT_FILE_PREFIX));
        }

        #[tokio::test]
        async fn test_spawned_script_is_deleted_at_disposal() {
            let handle = Script::new("echo \"$0\"")
                .with_shell("bash")
                .with_stdout(crate::models::StdioMode::Piped)
                .spawn()
                .unwrap();
            let out = handle.output().await.unwrap();
            let script_path = out.text().trim().to_string();
            assert!(
                !Path::new(&script_path).exists(),
                "script file must be deleted once the handle is released"
            );
        }

        #[tokio::test]
        async fn test_spawned_script_survives_until_disposal() {
            let mut handle = Script::new("echo \"$0\"; sleep 30")
                .with_shell("bash")
                .with_stdout(crate::models::StdioMode::Piped)
                .spawn()
                .unwrap();
            // Read the path while the process is still running: the
            // script must not have been deleted out from under it.
            let mut stdout = handle.stdout().unwrap();
            let mut line = Vec::new();
            use tokio::io::AsyncReadExt;
            let mut byte = [0u8; 1];
            loop {
                stdout.read_exact(&mut byte).await.unwrap();
                if byte[0] == b'\n' {
                    break;
                }
                line.push(byte[0]);
            }
            let script_path = String::from_utf8_lossy(&line).trim().to_string();
            assert!(Path::new(&script_path).exists());

            handle.kill().unwrap();
            handle.status().await.unwrap();
            handle.dispose().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(!Path::new(&script_path).exists());
        }

        #[tokio::test]
        async fn test_env_and_cwd_reach_the_script() {
            let dir = tempfile::tempdir().unwrap();
            let out = Script::new("printf '%s:%s' \"$PWD\" \"$EXEKIT_SCRIPT_VAR\"")
                .with_shell("bash")
                .with_cwd(dir.path())
                .with_env("EXEKIT_SCRIPT_VAR", "wired")
                .output()
                .await
                .unwrap();
            let text = out.text();
            assert!(text.ends_with(":wired"));
        }
    }

    #[cfg(windows)]
    mod windows {
        use super::super::*;

        #[tokio::test]
        async fn test_cmd_script_runs_and_is_deleted() {
            let out = Script::new("@echo %0")
                .with_shell("cmd")
                .output()
                .await
                .unwrap();
            assert!(out.success);
            let script_path = out.text().trim().trim_matches('"').to_string();
            assert!(!Path::new(&script_path).exists());
        }
    }

    #[test]
    fn test_unknown_shell_surfaces_as_error() {
        let result = Script::new("echo hi").with_shell("no-such-shell").output_sync();
        assert!(matches!(result, Err(ShellError::ShellNotDefined(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_sync_reports_exit_status() {
        let out = Script::new("exit 4").with_shell("bash").run_sync().unwrap();
        assert_eq!(out.code, 4);
        assert!(!out.success);
    }

    #[test]
    fn test_materialized_script_is_deleted_when_launch_fails() {
        let script = Script::new("echo hi");
        let path = script.materialize("sh").unwrap();
        assert!(path.exists());
        {
            let _cleanup = scopeguard::guard(path.clone(), |p| remove_script(&p));
            let result = Command::new("definitely-missing-shell-2b1c")
                .with_args(CommandArgs::List(vec![path.to_string_lossy().into_owned()]))
                .output_sync();
            assert!(result.is_err());
        }
        assert!(!path.exists());
    }
}
