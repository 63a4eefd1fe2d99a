//! Finding and layering config files.
//!
//! Layers, lowest precedence first:
//! 1. the user file, `~/.config/reframe/config.toml` or
//!    `$REFRAME_CONFIG_DIR/config.toml`
//! 2. `reframe.toml` in the working (project) directory
//! 3. `REFRAME_*` environment variables
//!
//! Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};

use crate::{ConfigError, ReframeConfig, Result, env};

/// Name of the per-directory config file.
pub const PROJECT_CONFIG_FILE: &str = "reframe.toml";

const USER_CONFIG_FILE: &str = "config.toml";

const APP_NAME: &str = "reframe";

/// Overrides the user config directory.
pub const CONFIG_DIR_ENV: &str = "REFRAME_CONFIG_DIR";

/// One file that discovery looked at.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// False when the file is absent or failed to parse.
    pub loaded: bool,
}

/// Merged configuration plus a record of how it was built.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ReframeConfig,
    /// Candidate files, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Broken files and unusable env values that were skipped.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Discover and merge every layer. `project_dir` defaults to the working
/// directory.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with the user config directory pinned to
/// `config_dir` instead of `REFRAME_CONFIG_DIR` or the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user_file = config_dir
        .map(|dir| dir.join(USER_CONFIG_FILE))
        .or_else(xdg_config_path);
    let project_file = project_dir
        .unwrap_or_else(|| Path::new("."))
        .join(PROJECT_CONFIG_FILE);

    let mut loaded = LoadedConfig {
        config: ReframeConfig::new(),
        sources: Vec::new(),
        warnings: Vec::new(),
    };
    for path in user_file.into_iter().chain(std::iter::once(project_file)) {
        let source = merge_file(&mut loaded, path);
        loaded.sources.push(source);
    }

    let env_warnings = env::apply_overrides(&mut loaded.config);
    loaded.warnings.extend(env_warnings);
    Ok(loaded)
}

/// Parse one file, without discovery or env overrides.
pub fn load_config_file(path: &Path) -> Result<ReframeConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    ReframeConfig::from_toml(&text)
}

/// Write `config` as TOML, creating missing parent directories.
pub fn save_config(config: &ReframeConfig, path: &Path) -> Result<()> {
    let write_error = |at: &Path| {
        let at = at.display().to_string();
        move |source: std::io::Error| ConfigError::WriteFile { path: at, source }
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_error(parent))?;
    }
    std::fs::write(path, config.to_toml()?).map_err(write_error(path))
}

pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|dir| dir.join(USER_CONFIG_FILE))
}

/// `$REFRAME_CONFIG_DIR` when set and non-empty, otherwise the platform
/// config directory plus `reframe`.
pub fn xdg_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|base| base.join(APP_NAME)),
    }
}

/// Merge `path` into `loaded.config` if it exists. A file that fails to
/// parse is recorded as a warning and skipped.
fn merge_file(loaded: &mut LoadedConfig, path: PathBuf) -> ConfigSource {
    let mut was_loaded = false;
    if path.is_file() {
        match load_config_file(&path) {
            Ok(layer) => {
                loaded.config.merge(layer);
                was_loaded = true;
            }
            Err(e) => loaded
                .warnings
                .push(format!("skipping {}: {e}", path.display())),
        }
    }
    ConfigSource {
        path,
        loaded: was_loaded,
    }
}
