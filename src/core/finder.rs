// src/core/finder.rs

use crate::constants::EXE_ENV_SUFFIX;
use crate::core::which::{self, is_regular_file, is_regular_file_async};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

lazy_static! {
    static ref PATH_FINDER: PathFinder = PathFinder::new();
}

/// The process-wide default [`PathFinder`] registry.
pub fn path_finder() -> &'static PathFinder {
    &PATH_FINDER
}

/// Registration record for one logical executable name.
#[derive(Debug, Clone)]
pub struct PathFinderEntry {
    /// Logical name callers resolve by.
    pub name: String,
    /// Executable name to search for; defaults to the logical name.
    pub executable: Option<String>,
    /// Environment variable that short-circuits the search when it names
    /// an existing executable. Derived as `<NAME>_EXE` when not given.
    pub env_variable: Option<String>,
    /// Resolved path, written once per process lifetime unless cleared.
    pub cached: Option<PathBuf>,
    /// Fallback path templates for the Windows family.
    pub windows: Vec<String>,
    /// Fallback path templates for the Darwin family.
    pub darwin: Vec<String>,
    /// Fallback path templates for other Unix systems.
    pub linux: Vec<String>,
}

impl PathFinderEntry {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let env_variable = Some(derive_env_variable(&name));
        Self {
            name,
            executable: None,
            env_variable,
            cached: None,
            windows: Vec::new(),
            darwin: Vec::new(),
            linux: Vec::new(),
        }
    }

    /// The fallback template list for the host OS family.
    fn platform_fallbacks(&self) -> &[String] {
        if cfg!(windows) {
            &self.windows
        } else if cfg!(target_os = "macos") {
            &self.darwin
        } else {
            &self.linux
        }
    }
}

/// Derives the canonical override variable for a logical name:
/// upper-cased, underscore-delimited, suffixed `_EXE`.
/// `age-keygen` becomes `AGE_KEYGEN_EXE`.
fn derive_env_variable(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + EXE_ENV_SUFFIX.len());
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if ch.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_uppercase());
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    let trimmed = out.trim_end_matches('_');
    format!("{trimmed}{EXE_ENV_SUFFIX}")
}

type ProbeFn = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Registry that resolves logical executable names to verified paths.
///
/// Resolution precedence, first hit wins:
/// 1. the entry's environment-variable override, resolved through the
///    search path and verified as a regular file (cached on success);
/// 2. the cached path from an earlier resolution, trusted without
///    re-validation until explicitly cleared;
/// 3. a standard search-path lookup of the executable name;
/// 4. the per-platform fallback template list, environment references
///    expanded at search time.
/// A miss is an absent result, not an error: callers routinely probe for
/// optional tooling.
///
/// The async and sync lookups interpret one shared resolution plan, so
/// their precedence cannot drift apart. A process-wide instance is
/// available through [`path_finder`]; independent instances can be
/// constructed for isolation.
pub struct PathFinder {
    entries: Mutex<HashMap<String, PathFinderEntry>>,
    probe: Option<ProbeFn>,
}

impl PathFinder {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            probe: None,
        }
    }

    /// A registry whose file probes go through `probe` instead of the
    /// filesystem. Lets tests count or fake probe traffic.
    pub fn with_probe(probe: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            probe: Some(Box::new(probe)),
        }
    }

    pub fn set(&self, name: impl Into<String>, entry: PathFinderEntry) {
        self.entries.lock().unwrap().insert(name.into(), entry);
    }

    pub fn get(&self, name: &str) -> Option<PathFinderEntry> {
        self.entries.lock().unwrap().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.lock().unwrap().contains_key(name)
    }

    pub fn delete(&self, name: &str) -> bool {
        self.entries.lock().unwrap().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Drops the cached path of `name`, forcing the next resolution to
    /// search again. Returns false when no such entry exists.
    pub fn clear_cached(&self, name: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(name) {
            Some(entry) => {
                entry.cached = None;
                true
            }
            None => false,
        }
    }

    /// Looks an entry up by exact name, then by registered name, cached
    /// path, or case-insensitive key.
    pub fn find(&self, name: &str) -> Option<PathFinderEntry> {
        let entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(name) {
            return Some(entry.clone());
        }
        for (key, entry) in entries.iter() {
            if entry.name == name
                || entry.cached.as_deref() == Some(Path::new(name))
                || key.eq_ignore_ascii_case(name)
            {
                return Some(entry.clone());
            }
        }
        None
    }

    /// Resolves `name` to a verified executable path, or `None`.
    pub async fn find_exe(&self, name: &str) -> Option<PathBuf> {
        let plan = self.resolution_plan(name);

        if let Some(value) = env_override(plan.env_variable.as_deref()) {
            if let Some(path) = which::which(&value).await {
                if self.probe_async(&path).await {
                    self.store_cached(name, &path);
                    return Some(path);
                }
            }
        }

        if let Some(cached) = plan.cached {
            return Some(cached);
        }

        if let Some(path) = which::which(&plan.target).await {
            if self.probe_async(&path).await {
                self.store_cached(name, &path);
                return Some(path);
            }
        }

        for template in &plan.fallbacks {
            if let Some(path) = expand_template(template) {
                if self.probe_async(&path).await {
                    self.store_cached(name, &path);
                    return Some(path);
                }
            }
        }

        None
    }

    /// Synchronous variant of [`find_exe`](Self::find_exe), with identical
    /// precedence.
    pub fn find_exe_sync(&self, name: &str) -> Option<PathBuf> {
        let plan = self.resolution_plan(name);

        if let Some(value) = env_override(plan.env_variable.as_deref()) {
            if let Some(path) = which::which_sync(&value) {
                if self.probe_sync(&path) {
                    self.store_cached(name, &path);
                    return Some(path);
                }
            }
        }

        if let Some(cached) = plan.cached {
            return Some(cached);
        }

        if let Some(path) = which::which_sync(&plan.target) {
            if self.probe_sync(&path) {
                self.store_cached(name, &path);
                return Some(path);
            }
        }

        for template in &plan.fallbacks {
            if let Some(path) = expand_template(template) {
                if self.probe_sync(&path) {
                    self.store_cached(name, &path);
                    return Some(path);
                }
            }
        }

        None
    }

    /// Snapshots everything one resolution pass needs, registering a
    /// default entry when the name is unknown. Holding the lock only here
    /// keeps racing resolutions benign: probes run unlocked and the last
    /// cache writer wins.
    fn resolution_plan(&self, name: &str) -> ResolutionPlan {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(name.to_string())
            .or_insert_with(|| PathFinderEntry::new(name));
        ResolutionPlan {
            env_variable: entry.env_variable.clone(),
            cached: entry.cached.clone(),
            target: entry.executable.clone().unwrap_or_else(|| entry.name.clone()),
            fallbacks: entry.platform_fallbacks().to_vec(),
        }
    }

    fn store_cached(&self, name: &str, path: &Path) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(name) {
            entry.cached = Some(path.to_path_buf());
        }
    }

    fn probe_sync(&self, path: &Path) -> bool {
        match &self.probe {
            Some(probe) => probe(path),
            None => is_regular_file(path),
        }
    }

    async fn probe_async(&self, path: &Path) -> bool {
        match &self.probe {
            Some(probe) => probe(path),
            None => is_regular_file_async(path).await,
        }
    }
}

impl Default for PathFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PathFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathFinder")
            .field("entries", &self.entries.lock().unwrap().len())
            .field("custom_probe", &self.probe.is_some())
            .finish()
    }
}

struct ResolutionPlan {
    env_variable: Option<String>,
    cached: Option<PathBuf>,
    target: String,
    fallbacks: Vec<String>,
}

fn env_override(variable: Option<&str>) -> Option<String> {
    let variable = variable?;
    env::var(variable).ok().filter(|value| !value.is_empty())
}

/// Expands environment references and `~` in a fallback template.
/// Templates that reference unset variables are skipped, not fatal.
fn expand_template(template: &str) -> Option<PathBuf> {
    match shellexpand::full(template) {
        Ok(expanded) => Some(PathBuf::from(expanded.into_owned())),
        Err(e) => {
            log::debug!("skipping fallback path template '{}': {}", template, e);
            None
        }
    }
}
