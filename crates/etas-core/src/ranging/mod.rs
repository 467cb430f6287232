//! Adaptive choice of the simulation range.
//!
//! Ranging runs small trial ensembles before the full simulation and
//! rewrites the initializer's [`CatalogRange`] so the full run produces
//! catalogs of roughly the target size. [`run_forecast`] chains ranging and
//! the full simulation under one time budget.

pub mod controller;
pub mod forecast;

pub use controller::RangingController;
pub use forecast::{covers, run_forecast, ForecastPlan, ForecastRun, SimulationSummary};

use std::time::Duration;

use etas_common::CatalogRange;
use etas_config::{RangingConfig, RangingMethodName};
use serde::Serialize;

/// How the range is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangingMethod {
    /// Iterative trial simulations through the simulation-ranging
    /// accumulator.
    Simulation,
    /// One seed-only pass through the seed-estimate accumulator.
    SeedEstimate,
    /// Keep the configured range.
    None,
}

impl From<RangingMethodName> for RangingMethod {
    fn from(name: RangingMethodName) -> Self {
        match name {
            RangingMethodName::Simulation => RangingMethod::Simulation,
            RangingMethodName::SeedEstimate => RangingMethod::SeedEstimate,
            RangingMethodName::None => RangingMethod::None,
        }
    }
}

impl std::fmt::Display for RangingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangingMethod::Simulation => write!(f, "simulation"),
            RangingMethod::SeedEstimate => write!(f, "seed_estimate"),
            RangingMethod::None => write!(f, "none"),
        }
    }
}

/// Control-law constants and per-attempt ensemble settings.
#[derive(Debug, Clone)]
pub struct RangingOptions {
    pub method: RangingMethod,
    pub num_catalogs: u64,
    pub target_size: u64,
    pub size_fractile: f64,
    pub exceed_fraction: f64,
    pub max_attempts: u32,
    pub time_bins: usize,
    pub ratio_clamp: (f64, f64),
    pub converge: (f64, f64),
    pub min_duration_days: f64,
    pub min_mag_gap: f64,
    /// An attempt starts only if at least this much ranging time remains.
    pub min_attempt: Duration,
    pub seed_est_generations: u32,
    pub seed_est_mag_step: f64,
    pub num_threads: usize,
    pub seed: Option<u64>,
}

impl Default for RangingOptions {
    fn default() -> Self {
        Self::from_config(&RangingConfig::default())
    }
}

impl RangingOptions {
    pub fn from_config(cfg: &RangingConfig) -> Self {
        Self {
            method: cfg.method.into(),
            num_catalogs: cfg.num_catalogs,
            target_size: cfg.target_size,
            size_fractile: cfg.size_fractile,
            exceed_fraction: cfg.exceed_fraction,
            max_attempts: cfg.max_attempts,
            time_bins: cfg.time_bins,
            ratio_clamp: (cfg.ratio_clamp_lo, cfg.ratio_clamp_hi),
            converge: (cfg.converge_lo, cfg.converge_hi),
            min_duration_days: cfg.min_duration_days,
            min_mag_gap: cfg.min_mag_gap,
            min_attempt: Duration::from_secs_f64(cfg.min_attempt_secs.max(0.0)),
            seed_est_generations: cfg.seed_est_generations,
            seed_est_mag_step: cfg.seed_est_mag_step,
            num_threads: 0,
            seed: None,
        }
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// What one ranging attempt measured and proposed.
#[derive(Debug, Clone, Serialize)]
pub struct RangingAttempt {
    pub attempt: u32,
    /// Range the trial ensemble ran with.
    pub range: CatalogRange,
    pub completed: u64,
    /// Catalog size at the size fractile, within the surviving duration.
    pub size_at_fractile: u64,
    /// Bins a large enough share of catalogs survived through. `None`
    /// for the seed-estimate method, which does not simulate.
    pub survival_bins: Option<usize>,
    pub survival_tend: f64,
    /// Largest-magnitude fractile among catalogs that survived.
    pub high_mag: Option<f64>,
    /// Clamped `target / size`.
    pub ratio: f64,
    pub elapsed_ms: u64,
}

/// Result of a ranging phase.
#[derive(Debug, Clone, Serialize)]
pub struct RangingOutcome {
    pub method: RangingMethod,
    /// Range written back into the initializer.
    pub range: CatalogRange,
    pub initial_range: CatalogRange,
    pub attempts: Vec<RangingAttempt>,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_config() {
        let cfg = RangingConfig {
            method: RangingMethodName::SeedEstimate,
            max_attempts: 3,
            min_attempt_secs: 1.5,
            ..RangingConfig::default()
        };
        let options = RangingOptions::from_config(&cfg);
        assert_eq!(options.method, RangingMethod::SeedEstimate);
        assert_eq!(options.max_attempts, 3);
        assert_eq!(options.min_attempt, Duration::from_millis(1500));
        assert_eq!(options.ratio_clamp, (0.1, 10.0));
        assert_eq!(RangingMethod::None.to_string(), "none");
    }
}
