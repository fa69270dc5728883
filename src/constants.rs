// src/constants.rs

/// The name of the directory containing exekit configuration (inside the
/// platform config directory).
pub const CONFIG_DIR_NAME: &str = "exekit";

/// The name of the shell table file (inside the exekit config directory).
pub const SHELLS_CONFIG_FILENAME: &str = "shells.toml";

/// Prefix used for materialized temporary script files.
pub const SCRIPT_FILE_PREFIX: &str = "exekit-script-";

/// Suffix appended to a derived environment-variable override name,
/// e.g. `deno` is overridable through `DENO_EXE`.
pub const EXE_ENV_SUFFIX: &str = "_EXE";
