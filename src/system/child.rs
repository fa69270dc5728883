// src/system/child.rs

use crate::core::cancellation::CancellationToken;
use crate::core::command::CommandError;
use crate::core::output::Output;
use crate::models::{CommandStatus, StdioMode};
use std::io;
use std::mem;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;

type CleanupFn = Box<dyn FnOnce() + Send + 'static>;

/// A live handle to a running child process.
///
/// The handle owns the OS process for its lifetime. Stream endpoints
/// exist only for channels launched as [`StdioMode::Piped`]; requesting
/// any other channel is a [`CommandError::StreamUnavailable`]. The exit
/// status resolves exactly once and is memoized, so repeated waits
/// observe the same value.
///
/// Disposal ([`dispose`](Self::dispose), or `Drop` as a best-effort
/// fallback) releases the handle and runs every registered cleanup
/// callback exactly once, after the exit status is known. A detached
/// handle hands that wait to a background reaper instead of blocking.
pub struct ChildProcess {
    child: Option<Child>,
    exe: String,
    pid: Option<u32>,
    status: Option<CommandStatus>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    stdin_piped: bool,
    stdout_piped: bool,
    stderr_piped: bool,
    detached: bool,
    cleanups: Vec<CleanupFn>,
    cancel_watch: Option<JoinHandle<()>>,
}

impl ChildProcess {
    pub(crate) fn new(
        mut child: Child,
        exe: String,
        stdin_mode: StdioMode,
        stdout_mode: StdioMode,
        stderr_mode: StdioMode,
        signal: Option<CancellationToken>,
    ) -> Self {
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let pid = child.id();

        // The watcher only requests termination; the exit status is still
        // delivered through the normal wait path and aborts the watcher.
        let cancel_watch = signal.map(|token| {
            let exe = exe.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                log::debug!(
                    "cancellation requested, sending termination to '{}' (pid {:?})",
                    exe,
                    pid
                );
                request_termination(pid);
            })
        });

        Self {
            child: Some(child),
            exe,
            pid,
            status: None,
            stdin,
            stdout,
            stderr,
            stdin_piped: stdin_mode == StdioMode::Piped,
            stdout_piped: stdout_mode == StdioMode::Piped,
            stderr_piped: stderr_mode == StdioMode::Piped,
            detached: false,
            cleanups: Vec::new(),
            cancel_watch,
        }
    }

    /// OS process id, if the process image loaded far enough to have one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The child's stdin endpoint. Can be taken once.
    ///
    /// # Errors
    /// [`CommandError::StreamUnavailable`] when stdin was not launched as
    /// piped, or was already taken.
    pub fn stdin(&mut self) -> Result<ChildStdin, CommandError> {
        if !self.stdin_piped {
            return Err(CommandError::StreamUnavailable { channel: "stdin" });
        }
        self.stdin
            .take()
            .ok_or(CommandError::StreamUnavailable { channel: "stdin" })
    }

    /// The child's stdout endpoint. Can be taken once.
    ///
    /// # Errors
    /// [`CommandError::StreamUnavailable`] when stdout was not launched as
    /// piped, or was already taken.
    pub fn stdout(&mut self) -> Result<ChildStdout, CommandError> {
        if !self.stdout_piped {
            return Err(CommandError::StreamUnavailable { channel: "stdout" });
        }
        self.stdout
            .take()
            .ok_or(CommandError::StreamUnavailable { channel: "stdout" })
    }

    /// The child's stderr endpoint. Can be taken once.
    ///
    /// # Errors
    /// [`CommandError::StreamUnavailable`] when stderr was not launched as
    /// piped, or was already taken.
    pub fn stderr(&mut self) -> Result<ChildStderr, CommandError> {
        if !self.stderr_piped {
            return Err(CommandError::StreamUnavailable { channel: "stderr" });
        }
        self.stderr
            .take()
            .ok_or(CommandError::StreamUnavailable { channel: "stderr" })
    }

    /// Waits for the process to exit and returns its status.
    ///
    /// The first call performs the wait; the resolved status is memoized
    /// and every later call returns the same value immediately.
    ///
    /// # Errors
    /// [`CommandError::Io`] when the underlying wait fails.
    pub async fn status(&mut self) -> Result<CommandStatus, CommandError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        // Close an untaken stdin pipe so the child cannot block reading it.
        self.stdin.take();
        let Some(child) = self.child.as_mut() else {
            return Err(CommandError::Io {
                exe: self.exe.clone(),
                source: io::Error::other("process handle already released"),
            });
        };
        let status = child.wait().await.map_err(|e| CommandError::Io {
            exe: self.exe.clone(),
            source: e,
        })?;
        let status = CommandStatus::from(status);
        self.status = Some(status);
        if let Some(watch) = self.cancel_watch.take() {
            watch.abort();
        }
        Ok(status)
    }

    /// Drains the captured streams, waits for exit, and aggregates the
    /// result.
    ///
    /// Completion joins three signals: stdout end-of-stream, stderr
    /// end-of-stream, and the exit event. Channels that were not piped
    /// (or whose endpoint was taken by the caller) contribute empty
    /// buffers. Registered cleanups run before this returns.
    ///
    /// # Errors
    /// [`CommandError::Io`] when waiting or draining fails.
    pub async fn output(mut self) -> Result<Output, CommandError> {
        self.stdin.take();
        let stdout_task = self.stdout.take().map(spawn_reader);
        let stderr_task = self.stderr.take().map(spawn_reader);

        let status = self.status().await?;
        let stdout = drain(stdout_task, &self.exe).await?;
        let stderr = drain(stderr_task, &self.exe).await?;
        self.run_cleanups();
        Ok(Output::new(stdout, stderr, status))
    }

    /// Requests graceful termination (SIGTERM on Unix). The process may
    /// ignore it; the exit status still arrives through
    /// [`status`](Self::status).
    ///
    /// # Errors
    /// [`CommandError::Io`] when the signal cannot be delivered.
    pub fn terminate(&mut self) -> Result<(), CommandError> {
        if self.status.is_some() {
            return Ok(());
        }
        #[cfg(unix)]
        {
            match self.pid {
                Some(pid) => send_sigterm(pid).map_err(|e| CommandError::Io {
                    exe: self.exe.clone(),
                    source: e,
                }),
                None => Ok(()),
            }
        }
        #[cfg(not(unix))]
        {
            self.kill()
        }
    }

    /// Forcefully kills the process.
    ///
    /// # Errors
    /// [`CommandError::Io`] when the kill cannot be issued.
    pub fn kill(&mut self) -> Result<(), CommandError> {
        if self.status.is_some() {
            return Ok(());
        }
        if let Some(child) = self.child.as_mut() {
            child.start_kill().map_err(|e| CommandError::Io {
                exe: self.exe.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Makes disposal wait for the process (the default). Each handle
    /// keeps its own flag; retaining one handle never affects another.
    pub fn retain(&mut self) {
        self.detached = false;
    }

    /// Makes disposal leave the process running and hand pending cleanup
    /// to a background reaper.
    pub fn detach(&mut self) {
        self.detached = true;
    }

    /// Registers a callback to run exactly once at disposal time, after
    /// the exit status is known.
    pub fn on_dispose(&mut self, cleanup: impl FnOnce() + Send + 'static) {
        self.cleanups.push(Box::new(cleanup));
    }

    /// Releases the handle deterministically.
    ///
    /// Retained handles wait for the process to exit first; detached
    /// handles move the wait and any pending cleanups onto a background
    /// reaper task and return immediately.
    pub async fn dispose(mut self) {
        if self.status.is_none() {
            if self.detached {
                if let Some(mut child) = self.child.take() {
                    let cleanups = mem::take(&mut self.cleanups);
                    if let Some(watch) = self.cancel_watch.take() {
                        watch.abort();
                    }
                    tokio::spawn(async move {
                        let _ = child.wait().await;
                        for cleanup in cleanups {
                            cleanup();
                        }
                    });
                    return;
                }
            } else if let Err(e) = self.status().await {
                log::debug!("wait during dispose failed: {}", e);
            }
        }
        self.run_cleanups();
    }

    fn run_cleanups(&mut self) {
        for cleanup in mem::take(&mut self.cleanups) {
            cleanup();
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if let Some(watch) = self.cancel_watch.take() {
            watch.abort();
        }
        if self.cleanups.is_empty() {
            return;
        }
        let cleanups = mem::take(&mut self.cleanups);
        match (self.status, self.child.take()) {
            // Still running: reap in the background when a runtime is
            // available, otherwise run the cleanups right away rather
            // than leaking them.
            (None, Some(mut child)) => {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        let _ = child.wait().await;
                        for cleanup in cleanups {
                            cleanup();
                        }
                    });
                } else {
                    for cleanup in cleanups {
                        cleanup();
                    }
                }
            }
            _ => {
                for cleanup in cleanups {
                    cleanup();
                }
            }
        }
    }
}

impl std::fmt::Debug for ChildProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcess")
            .field("exe", &self.exe)
            .field("pid", &self.pid)
            .field("status", &self.status)
            .field("detached", &self.detached)
            .finish()
    }
}

fn spawn_reader<R>(mut reader: R) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    })
}

async fn drain(
    task: Option<JoinHandle<io::Result<Vec<u8>>>>,
    exe: &str,
) -> Result<Vec<u8>, CommandError> {
    match task {
        None => Ok(Vec::new()),
        Some(task) => match task.await {
            Ok(Ok(buf)) => Ok(buf),
            Ok(Err(e)) => Err(CommandError::Io {
                exe: exe.to_string(),
                source: e,
            }),
            Err(e) => Err(CommandError::Io {
                exe: exe.to_string(),
                source: io::Error::other(e),
            }),
        },
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).map_err(io::Error::other)?;
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => Ok(()),
        // The process already exited on its own.
        Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::from_raw_os_error(e as i32)),
    }
}

#[cfg(unix)]
fn request_termination(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    if let Err(e) = send_sigterm(pid) {
        log::warn!("failed to signal pid {}: {}", pid, e);
    }
}

#[cfg(windows)]
fn request_termination(pid: Option<u32>) {
    use std::process::Stdio;

    let Some(pid) = pid else { return };
    let result = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = result {
        log::warn!("failed to run taskkill for pid {}: {}", pid, e);
    }
}

#[cfg(not(any(unix, windows)))]
fn request_termination(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::Command;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn sh(script: &str) -> Command {
        if cfg!(windows) {
            Command::new("cmd").with_args(vec!["/C", script])
        } else {
            Command::new("sh").with_args(vec!["-c", script])
        }
    }

    #[tokio::test]
    async fn test_spawn_exposes_pid_and_status() {
        let mut handle = sh("exit 7")
            .with_stdout(StdioMode::Null)
            .with_stderr(StdioMode::Null)
            .spawn()
            .unwrap();
        assert!(handle.pid().is_some());
        let status = handle.status().await.unwrap();
        assert_eq!(status.code, 7);
        assert!(!status.success);
        // The status future is memoized: a second wait observes the same
        // resolved value.
        assert_eq!(handle.status().await.unwrap(), status);
    }

    #[tokio::test]
    async fn test_streams_gated_by_stdio_mode() {
        let mut handle = sh("echo hi")
            .with_stdout(StdioMode::Piped)
            .with_stderr(StdioMode::Null)
            .spawn()
            .unwrap();
        // stderr was discarded, stdin inherited: neither is available.
        assert!(matches!(
            handle.stderr(),
            Err(CommandError::StreamUnavailable { channel: "stderr" })
        ));
        assert!(matches!(
            handle.stdin(),
            Err(CommandError::StreamUnavailable { channel: "stdin" })
        ));
        // stdout can be taken exactly once.
        let mut stdout = handle.stdout().unwrap();
        assert!(matches!(
            handle.stdout(),
            Err(CommandError::StreamUnavailable { channel: "stdout" })
        ));
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&buf).trim_end(), "hi");
        handle.status().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_joins_both_streams_and_exit() {
        let handle = sh("printf out; printf err >&2")
            .with_stdout(StdioMode::Piped)
            .with_stderr(StdioMode::Piped)
            .spawn()
            .unwrap();
        let out = handle.output().await.unwrap();
        assert!(out.success);
        assert_eq!(out.text(), "out");
        assert_eq!(out.error_text(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_terminates_but_status_still_resolves() {
        let token = CancellationToken::new();
        let mut handle = sh("sleep 30")
            .with_stdout(StdioMode::Null)
            .with_stderr(StdioMode::Null)
            .with_signal(token.clone())
            .spawn()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        let status = tokio::time::timeout(Duration::from_secs(5), handle.status())
            .await
            .expect("status must resolve after cancellation")
            .unwrap();
        assert!(!status.success);
        assert_eq!(status.signal, Some(15));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_delivers_sigterm() {
        let mut handle = sh("sleep 30")
            .with_stdout(StdioMode::Null)
            .with_stderr(StdioMode::Null)
            .spawn()
            .unwrap();
        handle.terminate().unwrap();
        let status = tokio::time::timeout(Duration::from_secs(5), handle.status())
            .await
            .expect("status must resolve after terminate")
            .unwrap();
        assert_eq!(status.signal, Some(15));
    }

    #[tokio::test]
    async fn test_dispose_runs_cleanup_after_exit() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let mut handle = sh("exit 0")
            .with_stdout(StdioMode::Null)
            .with_stderr(StdioMode::Null)
            .spawn()
            .unwrap();
        handle.on_dispose(move || flag.store(true, Ordering::SeqCst));
        assert!(!ran.load(Ordering::SeqCst));
        handle.dispose().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_detached_dispose_still_runs_cleanup() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let mut handle = sh("exit 0")
            .with_stdout(StdioMode::Null)
            .with_stderr(StdioMode::Null)
            .spawn()
            .unwrap();
        handle.on_dispose(move || flag.store(true, Ordering::SeqCst));
        handle.detach();
        handle.dispose().await;
        // The reaper owns the wait now; give it a moment.
        for _ in 0..50 {
            if ran.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_output_uses_empty_buffers_for_uncaptured_streams() {
        let handle = sh("echo ignored")
            .with_stdout(StdioMode::Null)
            .with_stderr(StdioMode::Null)
            .spawn()
            .unwrap();
        let out = handle.output().await.unwrap();
        assert!(out.stdout.is_empty());
        assert!(out.stderr.is_empty());
        assert!(out.success);
    }
}
