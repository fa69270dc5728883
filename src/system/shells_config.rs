// src/system/shells_config.rs

use crate::constants::{CONFIG_DIR_NAME, SHELLS_CONFIG_FILENAME};
use crate::models::{ShellConfig, ShellsConfig};
use crate::system::shell::ShellError;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

lazy_static! {
    static ref CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

/// Returns the exekit config directory, memoized for the process
/// lifetime. `None` when the platform exposes no config location.
fn get_config_dir() -> Option<PathBuf> {
    let mut cached = CONFIG_DIR.lock().unwrap();
    if let Some(path) = &*cached {
        return Some(path.clone());
    }
    let dir = dirs::config_dir()?.join(CONFIG_DIR_NAME);
    *cached = Some(dir.clone());
    Some(dir)
}

/// Loads the shell table.
///
/// Reads `shells.toml` from the config directory when present; otherwise
/// returns the built-in table, persisting it so users have a file to
/// edit. A missing or unwritable config directory is not an error; the
/// built-in table still works.
///
/// # Errors
/// Fails only when an existing `shells.toml` cannot be read or parsed.
pub fn load_shells_config() -> Result<ShellsConfig, ShellError> {
    let Some(config_dir) = get_config_dir() else {
        log::debug!("no config directory available, using built-in shell table");
        return Ok(default_shells_config());
    };
    let shells_path = config_dir.join(SHELLS_CONFIG_FILENAME);
    if shells_path.exists() {
        let content = fs::read_to_string(&shells_path)?;
        Ok(toml::from_str(&content)?)
    } else {
        let default_config = default_shells_config();
        match toml::to_string_pretty(&default_config) {
            Ok(toml_string) => {
                let written = fs::create_dir_all(&config_dir)
                    .and_then(|()| fs::write(&shells_path, toml_string));
                if let Err(e) = written {
                    log::debug!(
                        "could not write default shell table to '{}': {}",
                        shells_path.display(),
                        e
                    );
                }
            }
            Err(e) => log::debug!("could not serialize default shell table: {}", e),
        }
        Ok(default_config)
    }
}

/// The built-in shell table used when no `shells.toml` exists.
pub fn default_shells_config() -> ShellsConfig {
    let mut shells = HashMap::new();

    if cfg!(target_os = "windows") {
        shells.insert(
            "cmd".to_string(),
            ShellConfig {
                path: PathBuf::from("cmd.exe"),
                args: vec!["/D".to_string(), "/C".to_string()],
                extension: "cmd".to_string(),
                inline: false,
            },
        );
        for (name, exe) in [("powershell", "powershell.exe"), ("pwsh", "pwsh.exe")] {
            shells.insert(
                name.to_string(),
                ShellConfig {
                    path: PathBuf::from(exe),
                    args: vec![
                        "-ExecutionPolicy".to_string(),
                        "Bypass".to_string(),
                        "-NoLogo".to_string(),
                        "-NonInteractive".to_string(),
                        "-NoProfile".to_string(),
                        "-File".to_string(),
                    ],
                    extension: "ps1".to_string(),
                    inline: false,
                },
            );
        }
    }

    let bash_path = if cfg!(target_os = "windows") {
        "bash.exe"
    } else {
        "bash"
    };
    shells.insert(
        "bash".to_string(),
        ShellConfig {
            path: PathBuf::from(bash_path),
            args: Vec::new(),
            extension: "sh".to_string(),
            inline: false,
        },
    );

    // `sh` takes its body inline, so short one-liners skip the temp file.
    let sh_path = if cfg!(target_os = "windows") {
        "sh.exe"
    } else {
        "sh"
    };
    shells.insert(
        "sh".to_string(),
        ShellConfig {
            path: PathBuf::from(sh_path),
            args: vec!["-c".to_string()],
            extension: "sh".to_string(),
            inline: true,
        },
    );

    if !cfg!(target_os = "windows") {
        shells.insert(
            "zsh".to_string(),
            ShellConfig {
                path: PathBuf::from("zsh"),
                args: Vec::new(),
                extension: "sh".to_string(),
                inline: false,
            },
        );
    }

    ShellsConfig { shells }
}

pub fn get_default_shell_name() -> &'static str {
    if cfg!(target_os = "windows") { "cmd" } else { "bash" }
}

/// Resolves a shell by name against the loaded table, falling back to
/// the platform default shell when no name is given.
///
/// # Errors
/// [`ShellError::ShellNotDefined`] for unknown names, plus the
/// [`load_shells_config`] failure surface.
pub fn resolve_shell(name: Option<&str>) -> Result<ShellConfig, ShellError> {
    let config = load_shells_config()?;
    let shell_name = name.unwrap_or_else(|| get_default_shell_name());
    config
        .shells
        .get(shell_name)
        .cloned()
        .ok_or_else(|| ShellError::ShellNotDefined(shell_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_covers_posix_shells() {
        let config = default_shells_config();
        assert!(config.shells.contains_key("bash"));
        assert!(config.shells.contains_key("sh"));
        let sh = config.shells.get("sh").unwrap();
        assert!(sh.inline);
        assert_eq!(sh.args, ["-c"]);
        let bash = config.shells.get("bash").unwrap();
        assert!(!bash.inline);
        assert_eq!(bash.extension, "sh");
    }

    #[cfg(windows)]
    #[test]
    fn test_default_table_covers_windows_shells() {
        let config = default_shells_config();
        assert!(config.shells.contains_key("cmd"));
        assert!(config.shells.contains_key("powershell"));
        assert_eq!(get_default_shell_name(), "cmd");
    }

    #[test]
    fn test_resolve_unknown_shell_is_an_error() {
        let result = resolve_shell(Some("no-such-shell"));
        assert!(matches!(result, Err(ShellError::ShellNotDefined(name)) if name == "no-such-shell"));
    }

    #[test]
    fn test_table_round_trips_through_toml() {
        let config = default_shells_config();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed: ShellsConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.shells.len(), config.shells.len());
        assert!(parsed.shells.contains_key("bash"));
    }
}
