//! # System Interaction Layer
//!
//! This module provides abstractions for interacting with the underlying operating system.
//! It serves as a boundary between the declarative command model and the specifics of
//! process management, shell environments, and configuration files.
//!
//! ## Modules
//!
//! - **`launcher`**: The launch backend seam. Turns a resolved launch plan into either a
//!   live child process (async) or a completed, buffered result (blocking), with one
//!   production implementation and room for test substitutes.
//! - **`child`**: The live process handle: stream endpoints, memoized exit status,
//!   signaling, disposal, and cleanup callbacks.
//! - **`shell`**: Executes shell-interpreted script bodies, managing the lifecycle of
//!   the temporary script files they are materialized into.
//! - **`shells_config`**: Handles the loading and parsing of the `shells.toml` file,
//!   which defines the shell dialects available to script execution.

pub mod child;
pub mod launcher;
pub mod shell;
pub mod shells_config;
