// src/core/which.rs

use std::env;
use std::ffi::OsString;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

/// Finds an executable on the standard search path.
///
/// Returns the first `PATH` entry containing `name` as an executable
/// regular file, or `None`. On Windows the lookup is `PATHEXT`-aware:
/// a bare `name` is probed with each configured extension appended. A
/// `name` containing a path separator skips the search path and is probed
/// directly.
pub async fn which(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH").unwrap_or_default();
    which_in(name, &paths).await
}

/// Synchronous variant of [`which`]. Both walk the same candidate list in
/// the same order.
pub fn which_sync(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH").unwrap_or_default();
    which_in_sync(name, &paths)
}

/// [`which`] against an explicit search path instead of `PATH`.
pub async fn which_in(name: &str, paths: &std::ffi::OsStr) -> Option<PathBuf> {
    for candidate in candidate_paths(name, paths) {
        if let Ok(metadata) = tokio::fs::metadata(&candidate).await {
            if is_executable(&metadata) {
                return Some(candidate);
            }
        }
    }
    None
}

/// [`which_sync`] against an explicit search path instead of `PATH`.
pub fn which_in_sync(name: &str, paths: &std::ffi::OsStr) -> Option<PathBuf> {
    for candidate in candidate_paths(name, paths) {
        if let Ok(metadata) = std::fs::metadata(&candidate) {
            if is_executable(&metadata) {
                return Some(candidate);
            }
        }
    }
    None
}

/// Produces every path the lookup will probe, in precedence order.
/// Shared by the sync and async variants so they cannot disagree.
fn candidate_paths(name: &str, paths: &std::ffi::OsStr) -> Vec<PathBuf> {
    if name.is_empty() {
        return Vec::new();
    }

    let extensions = path_extensions();

    if has_separator(name) {
        return expand_with_extensions(PathBuf::from(name), name, &extensions);
    }

    let mut candidates = Vec::new();
    for dir in env::split_paths(paths) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        candidates.extend(expand_with_extensions(dir.join(name), name, &extensions));
    }
    candidates
}

fn expand_with_extensions(base: PathBuf, name: &str, extensions: &[String]) -> Vec<PathBuf> {
    if extensions.is_empty() || has_known_extension(name, extensions) {
        return vec![base];
    }
    let mut out = Vec::with_capacity(extensions.len() + 1);
    out.push(base.clone());
    for ext in extensions {
        let mut with_ext: OsString = base.clone().into_os_string();
        with_ext.push(ext);
        out.push(PathBuf::from(with_ext));
    }
    out
}

fn has_separator(name: &str) -> bool {
    name.contains('/') || (cfg!(windows) && name.contains('\\'))
}

#[cfg(windows)]
fn path_extensions() -> Vec<String> {
    env::var("PATHEXT")
        .unwrap_or_else(|_| ".EXE;.CMD;.BAT;.COM".to_string())
        .split(';')
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_string())
        .collect()
}

#[cfg(not(windows))]
fn path_extensions() -> Vec<String> {
    Vec::new()
}

fn has_known_extension(name: &str, extensions: &[String]) -> bool {
    extensions
        .iter()
        .any(|ext| name.len() > ext.len() && name.to_ascii_lowercase().ends_with(&ext.to_ascii_lowercase()))
}

#[cfg(unix)]
fn is_executable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(metadata: &Metadata) -> bool {
    metadata.is_file()
}

/// True when `path` names an existing regular file.
pub(crate) fn is_regular_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Async variant of [`is_regular_file`].
pub(crate) async fn is_regular_file_async(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
