//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment → XDG → system → defaults.

use std::path::{Path, PathBuf};

/// Where the configuration file was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in the XDG config directory.
    XdgConfig,

    /// Found in /etc/etas-forecast/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// A resolved configuration location.
#[derive(Debug, Clone, Default)]
pub struct ConfigPath {
    /// Path to the config file, or None for built-in defaults.
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "ETAS_FORECAST_CONFIG";
pub const ENV_CONFIG_DIR: &str = "ETAS_FORECAST_CONFIG_DIR";

/// File names searched in config directories, in order.
const CONFIG_FILENAMES: [&str; 2] = ["forecast.json", "forecast.toml"];

/// Application name for XDG and system directories.
const APP_NAME: &str = "etas-forecast";

/// Resolve the configuration file path.
///
/// 1. Explicit CLI path (returned even if missing, so the load reports it)
/// 2. `ETAS_FORECAST_CONFIG`
/// 3. `ETAS_FORECAST_CONFIG_DIR` + forecast.json / forecast.toml
/// 4. XDG config directory (~/.config/etas-forecast/)
/// 5. System config (/etc/etas-forecast/)
/// 6. Built-in defaults (None)
pub fn resolve_config(cli_path: Option<&Path>) -> ConfigPath {
    if let Some(path) = cli_path {
        return ConfigPath {
            path: Some(path.to_path_buf()),
            source: ConfigSource::CliArgument,
        };
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return found(path, ConfigSource::Environment);
        }
    }

    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        if let Some(path) = find_in_dir(Path::new(&dir)) {
            return found(path, ConfigSource::Environment);
        }
    }

    if let Some(dir) = xdg_config_dir() {
        if let Some(path) = find_in_dir(&dir) {
            return found(path, ConfigSource::XdgConfig);
        }
    }

    if let Some(path) = find_in_dir(&system_config_dir()) {
        return found(path, ConfigSource::SystemConfig);
    }

    ConfigPath::default()
}

fn found(path: PathBuf, source: ConfigSource) -> ConfigPath {
    ConfigPath {
        path: Some(path),
        source,
    }
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// The XDG config directory for etas-forecast.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// The system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(format!("{}", ConfigSource::XdgConfig), "XDG config");
        assert_eq!(format!("{}", ConfigSource::BuiltinDefault), "builtin default");
    }

    #[test]
    fn test_cli_path_wins_even_if_missing() {
        let resolved = resolve_config(Some(Path::new("/nonexistent/forecast.json")));
        assert_eq!(resolved.source, ConfigSource::CliArgument);
        assert!(resolved.path.is_some());
    }

    #[test]
    fn test_find_in_dir_prefers_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("forecast.toml"), "").unwrap();
        assert_eq!(find_in_dir(dir.path()), Some(dir.path().join("forecast.toml")));
        std::fs::write(dir.path().join("forecast.json"), "{}").unwrap();
        assert_eq!(find_in_dir(dir.path()), Some(dir.path().join("forecast.json")));
    }
}
