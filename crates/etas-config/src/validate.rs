//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::forecast::{BinConfig, EnsembleConfig, ForecastConfig, ModelConfig, RangingConfig};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }

    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<ValidationError> for etas_common::Error {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidValue { field, message } => {
                etas_common::Error::InvalidParameter { field, message }
            }
            other => etas_common::Error::Config(other.to_string()),
        }
    }
}

/// Validate a forecast configuration semantically.
pub fn validate_config(config: &ForecastConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    validate_model(&config.model)?;
    config.range.validate().map_err(|e| match e {
        etas_common::Error::InvalidParameter { field, message } => {
            ValidationError::invalid(format!("range.{field}"), message)
        }
        other => ValidationError::SemanticError(other.to_string()),
    })?;
    validate_ensemble(&config.ensemble)?;
    validate_ranging(&config.ranging)?;
    validate_bins(&config.bins)?;

    Ok(())
}

fn positive(field: &str, value: f64) -> ValidationResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::invalid(
            field,
            format!("Must be positive, got {value}"),
        ))
    }
}

fn unit_interval(field: &str, value: f64) -> ValidationResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::invalid(
            field,
            format!("Must be in [0, 1], got {value}"),
        ))
    }
}

fn strictly_increasing(field: &str, values: &[f64], min_len: usize) -> ValidationResult<()> {
    if values.len() < min_len {
        return Err(ValidationError::invalid(
            field,
            format!("Needs at least {min_len} values, got {}", values.len()),
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ValidationError::invalid(field, "Values must be finite"));
    }
    if let Some(i) = values.windows(2).position(|w| w[1] <= w[0]) {
        return Err(ValidationError::invalid(
            field,
            format!(
                "Must be strictly increasing, but {} follows {}",
                values[i + 1],
                values[i]
            ),
        ));
    }
    Ok(())
}

fn validate_model(model: &ModelConfig) -> ValidationResult<()> {
    match (model.a, model.branch_ratio) {
        (Some(_), Some(_)) | (None, None) => {
            return Err(ValidationError::SemanticError(
                "exactly one of model.a and model.branch_ratio must be set".to_string(),
            ));
        }
        (Some(a), None) if !a.is_finite() => {
            return Err(ValidationError::invalid("model.a", "Must be finite"));
        }
        (None, Some(n)) => positive("model.branch_ratio", n)?,
        _ => {}
    }

    positive("model.p", model.p)?;
    positive("model.c", model.c)?;
    positive("model.b", model.b)?;
    positive("model.tint", model.tint)?;
    if !model.alpha.is_finite() {
        return Err(ValidationError::invalid("model.alpha", "Must be finite"));
    }
    if model.mref >= model.msup {
        return Err(ValidationError::invalid(
            "model.msup",
            format!("Must exceed mref ({} <= {})", model.msup, model.mref),
        ));
    }
    if model.max_generations == 0 {
        return Err(ValidationError::invalid("model.max_generations", "Must be positive"));
    }
    if model.max_catalog_size == 0 {
        return Err(ValidationError::invalid("model.max_catalog_size", "Must be positive"));
    }
    if model.seeds.is_empty() {
        return Err(ValidationError::invalid("model.seeds", "At least one seed rupture is required"));
    }
    for (i, seed) in model.seeds.iter().enumerate() {
        if !seed.t_day.is_finite() || !seed.mag.is_finite() {
            return Err(ValidationError::invalid(
                format!("model.seeds[{i}]"),
                "Time and magnitude must be finite",
            ));
        }
    }
    Ok(())
}

fn validate_ensemble(ensemble: &EnsembleConfig) -> ValidationResult<()> {
    if ensemble.num_catalogs == 0 {
        return Err(ValidationError::invalid("ensemble.num_catalogs", "Must be positive"));
    }
    positive("ensemble.time_limit_secs", ensemble.time_limit_secs)?;
    if ensemble.min_sim_catalogs > ensemble.num_catalogs {
        return Err(ValidationError::invalid(
            "ensemble.min_sim_catalogs",
            format!(
                "Must not exceed num_catalogs ({} > {})",
                ensemble.min_sim_catalogs, ensemble.num_catalogs
            ),
        ));
    }
    Ok(())
}

fn validate_ranging(ranging: &RangingConfig) -> ValidationResult<()> {
    if ranging.num_catalogs == 0 {
        return Err(ValidationError::invalid("ranging.num_catalogs", "Must be positive"));
    }
    if ranging.target_size == 0 {
        return Err(ValidationError::invalid("ranging.target_size", "Must be positive"));
    }
    if ranging.max_attempts == 0 {
        return Err(ValidationError::invalid("ranging.max_attempts", "Must be positive"));
    }
    if ranging.time_bins == 0 {
        return Err(ValidationError::invalid("ranging.time_bins", "Must be positive"));
    }
    unit_interval("ranging.size_fractile", ranging.size_fractile)?;
    unit_interval("ranging.exceed_fraction", ranging.exceed_fraction)?;
    positive("ranging.ratio_clamp_lo", ranging.ratio_clamp_lo)?;
    if ranging.ratio_clamp_lo >= ranging.ratio_clamp_hi {
        return Err(ValidationError::invalid(
            "ranging.ratio_clamp_hi",
            "Must exceed ratio_clamp_lo",
        ));
    }
    if !(ranging.converge_lo <= 1.0 && 1.0 <= ranging.converge_hi) {
        return Err(ValidationError::invalid(
            "ranging.converge_lo",
            "Convergence band must contain 1.0",
        ));
    }
    positive("ranging.min_duration_days", ranging.min_duration_days)?;
    positive("ranging.min_mag_gap", ranging.min_mag_gap)?;
    if !(ranging.time_fraction > 0.0 && ranging.time_fraction <= 1.0) {
        return Err(ValidationError::invalid(
            "ranging.time_fraction",
            format!("Must be in (0, 1], got {}", ranging.time_fraction),
        ));
    }
    if ranging.min_attempt_secs < 0.0 {
        return Err(ValidationError::invalid("ranging.min_attempt_secs", "Must be non-negative"));
    }
    if ranging.seed_est_generations == 0 {
        return Err(ValidationError::invalid("ranging.seed_est_generations", "Must be positive"));
    }
    positive("ranging.seed_est_mag_step", ranging.seed_est_mag_step)?;
    Ok(())
}

fn validate_bins(bins: &BinConfig) -> ValidationResult<()> {
    strictly_increasing("bins.time_values", &bins.time_values, 2)?;
    strictly_increasing("bins.mag_values", &bins.mag_values, 1)?;
    for (i, f) in bins.fractiles.iter().enumerate() {
        unit_interval(&format!("bins.fractiles[{i}]"), *f)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::SeedRupture;

    #[test]
    fn default_config_is_valid() {
        validate_config(&ForecastConfig::default()).unwrap();
    }

    #[test]
    fn both_a_and_branch_ratio_rejected() {
        let mut cfg = ForecastConfig::default();
        cfg.model.a = Some(-2.0);
        let err = validate_config(&cfg).unwrap_err();
        assert_eq!(err.code(), 63);
    }

    #[test]
    fn non_increasing_bins_rejected() {
        let mut cfg = ForecastConfig::default();
        cfg.bins.time_values = vec![0.0, 7.0, 7.0];
        let err = validate_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("bins.time_values"));
    }

    #[test]
    fn fractile_out_of_range_rejected() {
        let mut cfg = ForecastConfig::default();
        cfg.ranging.size_fractile = 1.5;
        assert!(validate_config(&cfg).is_err());
        let mut cfg = ForecastConfig::default();
        cfg.bins.fractiles = vec![0.5, -0.1];
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn range_errors_are_prefixed() {
        let mut cfg = ForecastConfig::default();
        cfg.range.mag_min_sim = 9.9;
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ValidationError::InvalidValue { field, .. } => assert_eq!(field, "range.mag_min_sim"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_finite_seed_rejected() {
        let mut cfg = ForecastConfig::default();
        cfg.model.seeds = vec![SeedRupture {
            t_day: f64::NAN,
            mag: 6.0,
        }];
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn version_mismatch() {
        let cfg = ForecastConfig {
            schema_version: "0.9".to_string(),
            ..ForecastConfig::default()
        };
        assert_eq!(validate_config(&cfg).unwrap_err().code(), 66);
    }

    #[test]
    fn converts_into_common_error() {
        let err: etas_common::Error = ValidationError::invalid("model.c", "bad").into();
        assert_eq!(err.code(), 11);
    }
}
