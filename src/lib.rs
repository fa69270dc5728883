//! Cross-platform process execution: spawn executables, negotiate how
//! their standard streams are wired, and consume a uniform result object.
//!
//! The building blocks:
//!
//! - [`Command`]: a declarative command description executed through one of three
//!   calling conventions (`run`, `output`, `spawn`), each with its own
//!   stdio defaults. Capturing output costs buffering, so only the
//!   `output` convention pays for it by default.
//! - [`Output`]: captured bytes plus exit status, with lazy, memoized
//!   `text()` / `lines()` / `json()` views and their stderr mirrors.
//! - [`ChildProcess`]: the live handle: stream endpoints, memoized exit
//!   status, signaling, and deterministic disposal.
//! - [`which`] / [`PathFinder`]: search-path lookup and a caching
//!   resolver with env-variable overrides and per-platform fallbacks.
//! - [`Script`]: runs a shell-interpreted body, materializing it as an
//!   auto-deleted temporary script file when the dialect needs one.
//!
//! ```no_run
//! use exekit::Command;
//!
//! # async fn demo() -> Result<(), exekit::CommandError> {
//! // A single command-line string is shell-split; a Vec passes through.
//! let out = Command::new("git").with_args("show-ref master").output().await?;
//! println!("code: {}, first line: {:?}", out.code, out.lines().first());
//!
//! if let Some(deno) = exekit::path_finder().find_exe("deno").await {
//!     Command::new(deno.to_string_lossy().into_owned())
//!         .with_args("--version")
//!         .run()
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod core;
pub mod models;
pub mod system;

pub use crate::core::cancellation::CancellationToken;
pub use crate::core::command::{
    Command, CommandArgs, CommandError, LaunchPlan, output, output_sync, run, run_sync, spawn,
};
pub use crate::core::finder::{PathFinder, PathFinderEntry, path_finder};
pub use crate::core::output::Output;
pub use crate::core::which::{which, which_in, which_in_sync, which_sync};
pub use crate::models::{CommandStatus, ShellConfig, ShellsConfig, StdioMode};
pub use crate::system::child::ChildProcess;
pub use crate::system::launcher::{Launcher, NativeLauncher};
pub use crate::system::shell::{
    Script, ShellError, output_script, output_script_sync, run_script, spawn_script,
};
