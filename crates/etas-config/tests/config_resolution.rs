//! Configuration resolution and loading against real files.
//!
//! Covers:
//! - Resolution order (CLI > env path > env dir > XDG)
//! - JSON and TOML files through the same loader
//! - Validation of loaded files

use etas_config::forecast::FileFormat;
use etas_config::resolve::{resolve_config, ConfigSource, ENV_CONFIG_DIR, ENV_CONFIG_PATH};
use etas_config::{validate_config, ForecastConfig, ValidationError};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

struct EnvGuard {
    keys: Vec<String>,
    saved: Vec<Option<String>>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let saved = keys.iter().map(|k| env::var(k).ok()).collect();
        for key in keys {
            env::remove_var(key);
        }
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            saved,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.keys.iter().zip(&self.saved) {
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    f()
}

fn write_config(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    fs::create_dir_all(dir).expect("create config dir");
    let path = dir.join(name);
    fs::write(&path, body).expect("write config");
    path
}

const ENV_KEYS: [&str; 3] = [ENV_CONFIG_PATH, ENV_CONFIG_DIR, "XDG_CONFIG_HOME"];

#[test]
fn test_cli_over_env() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        let cli = write_config(&temp.path().join("cli"), "forecast.json", "{}");
        let from_env = write_config(&temp.path().join("env"), "forecast.json", "{}");
        env::set_var(ENV_CONFIG_PATH, from_env.display().to_string());

        let resolved = resolve_config(Some(&cli));
        assert_eq!(resolved.source, ConfigSource::CliArgument);
        assert_eq!(resolved.path.unwrap(), cli);
    });
}

#[test]
fn test_env_path_over_env_dir() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        let direct = write_config(&temp.path().join("direct"), "mine.toml", "");
        let dir = temp.path().join("dir");
        write_config(&dir, "forecast.json", "{}");
        env::set_var(ENV_CONFIG_PATH, direct.display().to_string());
        env::set_var(ENV_CONFIG_DIR, dir.display().to_string());

        let resolved = resolve_config(None);
        assert_eq!(resolved.source, ConfigSource::Environment);
        assert_eq!(resolved.path.unwrap(), direct);
    });
}

#[test]
fn test_env_dir_used_when_path_missing() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&ENV_KEYS);
        let temp = TempDir::new().expect("temp dir");
        let dir = temp.path().join("dir");
        let file = write_config(&dir, "forecast.toml", "");
        env::set_var(ENV_CONFIG_PATH, temp.path().join("missing.json").display().to_string());
        env::set_var(ENV_CONFIG_DIR, dir.display().to_string());

        let resolved = resolve_config(None);
        assert_eq!(resolved.source, ConfigSource::Environment);
        assert_eq!(resolved.path.unwrap(), file);
    });
}

#[test]
fn test_load_toml_file_and_validate() {
    let temp = TempDir::new().expect("temp dir");
    let path = write_config(
        temp.path(),
        "forecast.toml",
        r#"
[model]
branch_ratio = 0.4

[[model.seeds]]
t_day = 0.0
mag = 7.1

[ensemble]
num_catalogs = 2000
min_sim_catalogs = 200
seed = 7

[bins]
time_values = [0.0, 1.0, 30.0]
mag_values = [4.0, 5.0]
"#,
    );
    let (config, raw) = ForecastConfig::from_file(&path).expect("load toml");
    assert!(raw.contains("branch_ratio"));
    assert_eq!(config.model.seeds.len(), 1);
    assert_eq!(config.model.seeds[0].mag, 7.1);
    assert_eq!(config.ensemble.seed, Some(7));
    validate_config(&config).expect("loaded config validates");
}

#[test]
fn test_load_invalid_json_value() {
    let temp = TempDir::new().expect("temp dir");
    let path = write_config(
        temp.path(),
        "forecast.json",
        r#"{ "model": { "c": -0.01 } }"#,
    );
    let (config, _) = ForecastConfig::from_file(&path).expect("syntactically valid");
    let err = validate_config(&config).expect_err("negative c");
    assert!(matches!(err, ValidationError::InvalidValue { .. }));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = ForecastConfig::from_file(Path::new("/nonexistent/etas/forecast.json"))
        .expect_err("missing file");
    assert!(matches!(err, ValidationError::IoError(_)));
    assert_eq!(FileFormat::from_path(Path::new("x.json")), FileFormat::Json);
}
