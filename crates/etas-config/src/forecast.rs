//! Forecast configuration file schema.
//!
//! Every field has a default, so a file only needs the values it changes:
//!
//! ```json
//! {
//!   "model": { "branch_ratio": 0.5, "p": 1.1 },
//!   "ensemble": { "num_catalogs": 10000, "seed": 42 },
//!   "ranging": { "target_size": 4000 }
//! }
//! ```

use std::path::Path;

use etas_common::CatalogRange;
use serde::{Deserialize, Serialize};

use crate::validate::{ValidationError, ValidationResult};

/// Root of the forecast configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub schema_version: String,
    pub model: ModelConfig,
    pub range: CatalogRange,
    pub ensemble: EnsembleConfig,
    pub ranging: RangingConfig,
    pub bins: BinConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            model: ModelConfig::default(),
            range: CatalogRange::default(),
            ensemble: EnsembleConfig::default(),
            ranging: RangingConfig::default(),
            bins: BinConfig::default(),
        }
    }
}

/// A seed rupture as written in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedRupture {
    pub t_day: f64,
    pub mag: f64,
}

/// Physical ETAS model.
///
/// Exactly one of `a` and `branch_ratio` must be set; the other is
/// derived over [mref, msup] and [0, tint].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_ratio: Option<f64>,
    pub p: f64,
    pub c: f64,
    pub b: f64,
    pub alpha: f64,
    pub mref: f64,
    pub msup: f64,
    /// Time window for the branch ratio, days.
    pub tint: f64,
    pub max_generations: u32,
    pub max_catalog_size: u64,
    pub seeds: Vec<SeedRupture>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            a: None,
            branch_ratio: Some(0.5),
            p: 1.08,
            c: 0.01,
            b: 1.0,
            alpha: 1.0,
            mref: 3.0,
            msup: 9.5,
            tint: 365.0,
            max_generations: 100,
            max_catalog_size: 5_000_000,
            seeds: vec![SeedRupture { t_day: 0.0, mag: 6.0 }],
        }
    }
}

/// Full-size simulation ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub num_catalogs: u64,
    /// Worker threads; 0 uses the available parallelism.
    pub num_threads: usize,
    /// Wall-clock budget for ranging plus simulation, seconds.
    pub time_limit_secs: f64,
    /// Base seed; omitted means a fresh random seed per run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub progress_interval_ms: u64,
    /// A timed-out simulation still succeeds with at least this many catalogs.
    pub min_sim_catalogs: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            num_catalogs: 10_000,
            num_threads: 0,
            time_limit_secs: 600.0,
            seed: None,
            progress_interval_ms: 2_000,
            min_sim_catalogs: 1_000,
        }
    }
}

/// Which ranging method to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangingMethodName {
    /// Iterative small simulations.
    #[default]
    Simulation,
    /// One analytic pass over the seed generation.
    SeedEstimate,
    /// Use the configured range unchanged.
    None,
}

impl std::fmt::Display for RangingMethodName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangingMethodName::Simulation => write!(f, "simulation"),
            RangingMethodName::SeedEstimate => write!(f, "seed_estimate"),
            RangingMethodName::None => write!(f, "none"),
        }
    }
}

/// Adaptive ranging control law.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangingConfig {
    pub method: RangingMethodName,
    /// Catalogs per ranging attempt.
    pub num_catalogs: u64,
    /// Target catalog size at `size_fractile`.
    pub target_size: u64,
    pub size_fractile: f64,
    /// Tolerated fraction of catalogs that stop before the survival bin.
    pub exceed_fraction: f64,
    pub max_attempts: u32,
    /// Time bins spanning the initial range during ranging.
    pub time_bins: usize,
    /// Clamp applied to the size ratio before adjusting.
    pub ratio_clamp_lo: f64,
    pub ratio_clamp_hi: f64,
    /// Converged once the ratio lands in this band after the first attempt.
    pub converge_lo: f64,
    pub converge_hi: f64,
    /// Shortest acceptable surviving duration, days.
    pub min_duration_days: f64,
    /// Smallest acceptable `mag_max_sim - mag_min_sim`.
    pub min_mag_gap: f64,
    /// Share of the total time limit available to ranging.
    pub time_fraction: f64,
    /// An attempt starts only if at least this much ranging time remains.
    pub min_attempt_secs: f64,
    /// Generations summed by the seed-estimate method.
    pub seed_est_generations: u32,
    /// Candidate magnitude spacing for the seed-estimate method.
    pub seed_est_mag_step: f64,
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            method: RangingMethodName::Simulation,
            num_catalogs: 500,
            target_size: 4_000,
            size_fractile: 0.60,
            exceed_fraction: 0.15,
            max_attempts: 8,
            time_bins: 50,
            ratio_clamp_lo: 0.10,
            ratio_clamp_hi: 10.0,
            converge_lo: 0.8,
            converge_hi: 1.2,
            min_duration_days: 1.0,
            min_mag_gap: 1.0,
            time_fraction: 0.25,
            min_attempt_secs: 0.5,
            seed_est_generations: 20,
            seed_est_mag_step: 0.1,
        }
    }
}

/// Forecast output bins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinConfig {
    /// Time bin boundaries, days; bin `i` ends at `time_values[i + 1]` and
    /// counts everything since `time_values[0]`.
    pub time_values: Vec<f64>,
    /// Magnitude thresholds; column `j` counts ruptures with mag >= `mag_values[j]`.
    pub mag_values: Vec<f64>,
    /// Fractiles reported in forecast tables.
    pub fractiles: Vec<f64>,
}

impl Default for BinConfig {
    fn default() -> Self {
        Self {
            time_values: vec![0.0, 1.0, 7.0, 30.0, 365.0],
            mag_values: vec![3.0, 4.0, 5.0, 6.0, 7.0],
            fractiles: vec![0.025, 0.5, 0.975],
        }
    }
}

/// Config file syntax, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    /// `.toml` is TOML; anything else is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => FileFormat::Toml,
            _ => FileFormat::Json,
        }
    }
}

impl ForecastConfig {
    /// Parse configuration text.
    pub fn parse(content: &str, format: FileFormat) -> ValidationResult<Self> {
        match format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ValidationError::ParseError(e.to_string())),
            FileFormat::Toml => {
                toml::from_str(content).map_err(|e| ValidationError::ParseError(e.to_string()))
            }
        }
    }

    /// Read and parse a configuration file. Returns the raw text alongside
    /// for hashing.
    pub fn from_file(path: &Path) -> ValidationResult<(Self, String)> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ValidationError::IoError(format!("{}: {}", path.display(), e)))?;
        let config = Self::parse(&content, FileFormat::from_path(path))?;
        Ok((config, content))
    }

    /// Canonical JSON used for hashing and `config show`.
    pub fn to_canonical_json(&self) -> ValidationResult<String> {
        serde_json::to_string(self).map_err(|e| ValidationError::ParseError(e.to_string()))
    }
}
