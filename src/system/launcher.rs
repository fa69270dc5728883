// src/system/launcher.rs

use crate::core::command::{CommandError, LaunchPlan};
use crate::core::output::Output;
use crate::models::StdioMode;
use crate::system::child::ChildProcess;
use std::process::Stdio;
use std::time::Duration;

/// The launch backend seam.
///
/// `Command` execution methods talk to a `Launcher` instead of an OS
/// facility directly: [`launch`](Launcher::launch) starts a process and
/// yields the live handle, [`launch_sync`](Launcher::launch_sync) blocks
/// until completion and yields a buffered [`Output`]. Production code
/// uses [`NativeLauncher`]; tests can substitute their own
/// implementation that fabricates results without spawning processes.
pub trait Launcher: Send + Sync {
    /// Starts the planned process and returns a live handle.
    ///
    /// # Errors
    /// [`CommandError::Launch`] when the executable cannot be started.
    fn launch(&self, plan: &LaunchPlan) -> Result<ChildProcess, CommandError>;

    /// Runs the planned process to completion, blocking the calling
    /// thread, and returns the buffered result.
    ///
    /// # Errors
    /// [`CommandError::Launch`] when the executable cannot be started,
    /// [`CommandError::Cancelled`] when the plan's token was already
    /// cancelled before launch.
    fn launch_sync(&self, plan: &LaunchPlan) -> Result<Output, CommandError>;
}

/// The production launch backend: `tokio::process` for live handles,
/// `std::process` for blocking capture.
#[derive(Debug, Default)]
pub struct NativeLauncher;

/// The backend used by `Command`'s execution methods.
pub fn native() -> &'static NativeLauncher {
    static NATIVE: NativeLauncher = NativeLauncher;
    &NATIVE
}

fn map_stdio(mode: StdioMode) -> Stdio {
    match mode {
        StdioMode::Inherit => Stdio::inherit(),
        StdioMode::Null => Stdio::null(),
        StdioMode::Piped => Stdio::piped(),
    }
}

impl Launcher for NativeLauncher {
    fn launch(&self, plan: &LaunchPlan) -> Result<ChildProcess, CommandError> {
        let mut cmd = tokio::process::Command::new(&plan.exe);
        apply_args_async(&mut cmd, plan);
        if let Some(cwd) = &plan.cwd {
            cmd.current_dir(dunce::simplified(cwd));
        }
        if plan.clear_env {
            cmd.env_clear();
        }
        cmd.envs(&plan.env);
        #[cfg(unix)]
        {
            if let Some(uid) = plan.uid {
                cmd.uid(uid);
            }
            if let Some(gid) = plan.gid {
                cmd.gid(gid);
            }
        }
        cmd.stdin(map_stdio(plan.stdin))
            .stdout(map_stdio(plan.stdout))
            .stderr(map_stdio(plan.stderr));

        let child = cmd.spawn().map_err(|e| CommandError::Launch {
            exe: plan.exe.clone(),
            source: e,
        })?;
        log::debug!("spawned '{}' (pid {:?})", plan.exe, child.id());
        Ok(ChildProcess::new(
            child,
            plan.exe.clone(),
            plan.stdin,
            plan.stdout,
            plan.stderr,
            plan.signal.clone(),
        ))
    }

    fn launch_sync(&self, plan: &LaunchPlan) -> Result<Output, CommandError> {
        // A capturing run cannot poll for cancellation without risking
        // pipe backpressure, so the token is only honored pre-flight
        // there; non-capturing runs poll below.
        if let Some(token) = &plan.signal {
            if token.is_cancelled() {
                return Err(CommandError::Cancelled);
            }
        }

        let mut cmd = std::process::Command::new(&plan.exe);
        apply_args_sync(&mut cmd, plan);
        if let Some(cwd) = &plan.cwd {
            cmd.current_dir(dunce::simplified(cwd));
        }
        if plan.clear_env {
            cmd.env_clear();
        }
        cmd.envs(&plan.env);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if let Some(uid) = plan.uid {
                cmd.uid(uid);
            }
            if let Some(gid) = plan.gid {
                cmd.gid(gid);
            }
        }
        cmd.stdin(map_stdio(plan.stdin))
            .stdout(map_stdio(plan.stdout))
            .stderr(map_stdio(plan.stderr));

        let piped = plan.stdin == StdioMode::Piped
            || plan.stdout == StdioMode::Piped
            || plan.stderr == StdioMode::Piped;

        let mut child = cmd.spawn().map_err(|e| CommandError::Launch {
            exe: plan.exe.clone(),
            source: e,
        })?;
        log::debug!("spawned '{}' (pid {})", plan.exe, child.id());

        if let Some(token) = plan.signal.as_ref().filter(|_| !piped) {
            // Non-blocking wait loop so the run can be interrupted.
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        return Ok(Output::new(Vec::new(), Vec::new(), status.into()));
                    }
                    Ok(None) => {
                        if token.is_cancelled() {
                            log::debug!(
                                "cancellation requested, killing child process (pid {})",
                                child.id()
                            );
                            if let Err(e) = child.kill() {
                                log::warn!("failed to kill child process {}: {}", child.id(), e);
                            }
                            // The real exit status still flows back as data.
                            let status = child.wait().map_err(|e| CommandError::Io {
                                exe: plan.exe.clone(),
                                source: e,
                            })?;
                            return Ok(Output::new(Vec::new(), Vec::new(), status.into()));
                        }
                        std::thread::sleep(Duration::from_millis(50));
                    }
                    Err(e) => {
                        return Err(CommandError::Io {
                            exe: plan.exe.clone(),
                            source: e,
                        });
                    }
                }
            }
        }

        let out = child.wait_with_output().map_err(|e| CommandError::Io {
            exe: plan.exe.clone(),
            source: e,
        })?;
        Ok(Output::new(out.stdout, out.stderr, out.status.into()))
    }
}

#[cfg(windows)]
fn apply_args_async(cmd: &mut tokio::process::Command, plan: &LaunchPlan) {
    if plan.raw_arguments {
        for arg in &plan.args {
            cmd.raw_arg(arg);
        }
    } else {
        cmd.args(&plan.args);
    }
}

#[cfg(not(windows))]
fn apply_args_async(cmd: &mut tokio::process::Command, plan: &LaunchPlan) {
    cmd.args(&plan.args);
}

#[cfg(windows)]
fn apply_args_sync(cmd: &mut std::process::Command, plan: &LaunchPlan) {
    use std::os::windows::process::CommandExt;
    if plan.raw_arguments {
        for arg in &plan.args {
            cmd.raw_arg(arg);
        }
    } else {
        cmd.args(&plan.args);
    }
}

#[cfg(not(windows))]
fn apply_args_sync(cmd: &mut std::process::Command, plan: &LaunchPlan) {
    cmd.args(&plan.args);
}
