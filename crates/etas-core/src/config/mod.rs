//! Configuration loading for etas-core.
//!
//! This module handles:
//! - Resolving and reading the forecast configuration (JSON or TOML)
//! - Applying a preset on top of the file
//! - Semantic validation
//! - Turning the validated configuration into model parameters, an
//!   initializer and a forecast plan

pub use etas_config::{
    apply_preset, get_preset, resolve_config, validate_config, ConfigPath, ConfigSnapshot,
    ConfigSource, ForecastConfig, ModelConfig, PresetError, PresetName, ValidationError,
    CONFIG_SCHEMA_VERSION,
};

use std::path::PathBuf;
use std::time::Duration;

use etas_common::{CatalogParams, CatalogRange};
use etas_math::inverse_branch_ratio;
use thiserror::Error;

use crate::engine::FixedInitializer;
use crate::ensemble::EnsembleOptions;
use crate::ranging::{ForecastPlan, RangingOptions};

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid config {path}: {source}")]
    Invalid {
        path: String,
        #[source]
        source: ValidationError,
    },

    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ConfigError {
    /// True when the file was readable but declares another schema version.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, ConfigError::VersionMismatch { .. })
    }
}

impl From<ConfigError> for etas_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid { source, .. } => source.into(),
            other => etas_common::Error::Config(other.to_string()),
        }
    }
}

/// Configuration resolution options.
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Explicit config file (highest priority).
    pub config_path: Option<PathBuf>,
    /// Preset applied over the file.
    pub preset: Option<PresetName>,
}

/// Resolved configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: ForecastConfig,
    pub location: ConfigPath,
    /// File content as read, for hashing.
    pub raw: Option<String>,
    pub preset: Option<PresetName>,
}

impl ResolvedConfig {
    /// Built-in defaults, no file.
    pub fn defaults() -> Self {
        Self {
            config: ForecastConfig::default(),
            location: ConfigPath::default(),
            raw: None,
            preset: None,
        }
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(
            &self.config,
            &self.location,
            self.raw.as_deref(),
            self.preset.map(|p| p.as_str()),
        )
    }
}

/// Load configuration with the standard resolution order.
///
/// Resolution order (highest to lowest priority):
/// 1. Explicit CLI path (via ConfigOptions)
/// 2. `ETAS_FORECAST_CONFIG` / `ETAS_FORECAST_CONFIG_DIR`
/// 3. XDG config home (~/.config/etas-forecast/)
/// 4. /etc/etas-forecast/
/// 5. Built-in defaults
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    let location = resolve_config(options.config_path.as_deref());

    let (mut config, raw) = match &location.path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::NotFound { path: path.clone() });
            }
            let (config, raw) =
                ForecastConfig::from_file(path).map_err(|source| ConfigError::Invalid {
                    path: path.display().to_string(),
                    source,
                })?;
            (config, Some(raw))
        }
        None => (ForecastConfig::default(), None),
    };

    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(ConfigError::VersionMismatch {
            expected: CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if let Some(preset) = options.preset {
        apply_preset(&mut config, preset);
    }

    validate_config(&config).map_err(|source| ConfigError::Invalid {
        path: location
            .path
            .as_ref()
            .map_or_else(|| "<defaults>".to_string(), |p| p.display().to_string()),
        source,
    })?;

    Ok(ResolvedConfig {
        config,
        location,
        raw,
        preset: options.preset,
    })
}

/// Productivity `a`, given directly or derived from the branch ratio over
/// [mref, msup] and [0, tint].
pub fn productivity_a(model: &ModelConfig) -> etas_common::Result<f64> {
    let a = match (model.a, model.branch_ratio) {
        (Some(a), None) => a,
        (None, Some(n)) => inverse_branch_ratio(
            n,
            model.p,
            model.c,
            model.b,
            model.alpha,
            model.mref,
            model.msup,
            model.tint,
        ),
        _ => {
            return Err(etas_common::Error::invalid(
                "model",
                "exactly one of a and branch_ratio must be set",
            ))
        }
    };
    if !a.is_finite() {
        return Err(etas_common::Error::Numerical(format!(
            "productivity a is not finite (branch_ratio {:?})",
            model.branch_ratio
        )));
    }
    Ok(a)
}

/// Validated catalog parameters for `model` over `range`.
pub fn catalog_params(model: &ModelConfig, range: &CatalogRange) -> etas_common::Result<CatalogParams> {
    let params = CatalogParams {
        a: productivity_a(model)?,
        p: model.p,
        c: model.c,
        b: model.b,
        alpha: model.alpha,
        mref: model.mref,
        msup: model.msup,
        range: range.clone(),
        max_generations: model.max_generations,
        max_catalog_size: model.max_catalog_size,
    };
    params.validate()?;
    Ok(params)
}

/// Initializer seeded with the configured ruptures.
pub fn build_initializer(config: &ForecastConfig) -> etas_common::Result<FixedInitializer> {
    let params = catalog_params(&config.model, &config.range)?;
    let seeds = config.model.seeds.iter().map(|s| (s.t_day, s.mag)).collect();
    Ok(FixedInitializer::new(params, seeds).with_tint(config.model.tint))
}

/// Ranging and simulation settings for [`crate::ranging::run_forecast`].
///
/// `threads` and `seed` override the configuration when set.
pub fn forecast_plan(config: &ForecastConfig, threads: Option<usize>, seed: Option<u64>) -> ForecastPlan {
    let ens = &config.ensemble;
    let threads = threads.unwrap_or(ens.num_threads);
    let seed = seed.or(ens.seed);
    ForecastPlan {
        ranging: RangingOptions::from_config(&config.ranging)
            .with_threads(threads)
            .with_seed(seed),
        simulation: EnsembleOptions::new(ens.num_catalogs)
            .with_threads(threads)
            .with_seed(seed)
            .with_progress_interval(Duration::from_millis(ens.progress_interval_ms.max(1))),
        time_limit: (ens.time_limit_secs > 0.0).then(|| Duration::from_secs_f64(ens.time_limit_secs)),
        ranging_fraction: config.ranging.time_fraction,
        min_sim_catalogs: ens.min_sim_catalogs.min(ens.num_catalogs),
        forecast_end: config.bins.time_values.last().copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Initializer;
    use etas_math::branch_ratio;
    use std::io::Write;

    #[test]
    fn test_explicit_missing_file_is_not_found() {
        let options = ConfigOptions {
            config_path: Some(PathBuf::from("/nonexistent/etas/forecast.json")),
            preset: None,
        };
        assert!(matches!(
            load_config(&options),
            Err(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn test_file_and_preset_combine() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"model": {{"p": 1.2}}, "ensemble": {{"seed": 5}}}}"#).unwrap();
        let options = ConfigOptions {
            config_path: Some(file.path().to_path_buf()),
            preset: Some(PresetName::Quick),
        };
        let resolved = load_config(&options).unwrap();
        assert_eq!(resolved.config.model.p, 1.2);
        assert_eq!(resolved.config.ensemble.seed, Some(5));
        assert_eq!(resolved.config.ensemble.num_catalogs, 1_000);
        assert_eq!(resolved.location.source, ConfigSource::CliArgument);

        let snapshot = resolved.snapshot();
        assert_eq!(snapshot.preset.as_deref(), Some("quick"));
        assert!(snapshot.file_hash.is_some());
    }

    #[test]
    fn test_version_mismatch() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"schema_version": "0.1.0"}}"#).unwrap();
        let options = ConfigOptions {
            config_path: Some(file.path().to_path_buf()),
            preset: None,
        };
        let err = load_config(&options).unwrap_err();
        assert!(err.is_version_mismatch());
    }

    #[test]
    fn test_branch_ratio_sets_productivity() {
        let model = ModelConfig::default();
        let a = productivity_a(&model).unwrap();
        let n = branch_ratio(a, model.p, model.c, model.b, model.alpha, model.mref, model.msup, model.tint);
        assert!((n - 0.5).abs() < 1e-9);

        let both = ModelConfig {
            a: Some(-2.0),
            ..ModelConfig::default()
        };
        assert!(productivity_a(&both).is_err());
    }

    #[test]
    fn test_initializer_from_defaults() {
        let init = build_initializer(&ForecastConfig::default()).unwrap();
        assert_eq!(init.get_mainshock_mag(), Some(6.0));
        assert_eq!(init.get_range(), CatalogRange::default());
    }

    #[test]
    fn test_plan_overrides() {
        let plan = forecast_plan(&ForecastConfig::default(), Some(3), Some(99));
        assert_eq!(plan.simulation.num_threads, 3);
        assert_eq!(plan.ranging.seed, Some(99));
        assert_eq!(plan.time_limit, Some(Duration::from_secs(600)));
        assert_eq!(plan.min_sim_catalogs, 1_000);
        assert_eq!(plan.forecast_end, ForecastConfig::default().bins.time_values.last().copied());
    }
}
