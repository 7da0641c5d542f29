//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use wbiis::WbiisConfig;

use crate::types::{CliError, CliResult};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "WBIIS_CONFIG";

/// Resolve the config file path.
///
/// Order: explicit path, `WBIIS_CONFIG`, `./.wbiis/config.json`,
/// `~/.wbiis/config.json`. Returns `None` when nothing is configured and no
/// default file exists.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let cwd_config = PathBuf::from(".wbiis/config.json");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    let home_config = default_config_path();
    home_config.exists().then_some(home_config)
}

fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    PathBuf::from(home).join(".wbiis").join("config.json")
}

/// Load the configuration, falling back to defaults when no file is found.
pub fn load_config(explicit: Option<&str>) -> CliResult<WbiisConfig> {
    match resolve_config_path(explicit) {
        Some(path) => {
            tracing::info!("Loading config from {}", path.display());
            read_config_file(&path)
        }
        None => {
            tracing::debug!("No config file found, using defaults");
            Ok(WbiisConfig::default())
        }
    }
}

/// Read and validate one config file.
pub fn read_config_file(path: &Path) -> CliResult<WbiisConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::Config(format!("Failed to read {}: {e}", path.display())))?;
    WbiisConfig::from_json(&text)
        .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))
}
