//! Configuration presets.
//!
//! - Quick: small ensembles for smoke runs and interactive checks
//! - Standard: the defaults
//! - Thorough: large ensembles and a generous ranging budget

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::forecast::ForecastConfig;

/// Available configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetName {
    Quick,
    Standard,
    Thorough,
}

impl PresetName {
    /// All available preset names.
    pub const ALL: &'static [PresetName] =
        &[PresetName::Quick, PresetName::Standard, PresetName::Thorough];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Quick => "quick",
            PresetName::Standard => "standard",
            PresetName::Thorough => "thorough",
        }
    }

    /// Parse a preset name, accepting a few aliases.
    pub fn parse(s: &str) -> Option<PresetName> {
        match s.to_lowercase().as_str() {
            "quick" | "fast" | "smoke" => Some(PresetName::Quick),
            "standard" | "default" => Some(PresetName::Standard),
            "thorough" | "full" | "production" => Some(PresetName::Thorough),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PresetName::Quick => "1,000 catalogs, 200 per ranging attempt, 60 s budget",
            PresetName::Standard => "10,000 catalogs, 500 per ranging attempt, 10 min budget",
            PresetName::Thorough => "100,000 catalogs, 2,000 per ranging attempt, 1 h budget",
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PresetName {
    type Err = PresetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresetName::parse(s).ok_or_else(|| PresetError::UnknownPreset(s.to_string()))
    }
}

/// Errors related to preset operations.
#[derive(Debug, Clone)]
pub enum PresetError {
    UnknownPreset(String),
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetError::UnknownPreset(name) => write!(
                f,
                "Unknown preset '{}'. Available: {}",
                name,
                PresetName::ALL
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl std::error::Error for PresetError {}

/// Apply a preset's ensemble sizes and budgets, leaving the model alone.
pub fn apply_preset(config: &mut ForecastConfig, name: PresetName) {
    let (num_catalogs, min_sim, ranging_catalogs, max_attempts, time_limit) = match name {
        PresetName::Quick => (1_000, 100, 200, 6, 60.0),
        PresetName::Standard => (10_000, 1_000, 500, 8, 600.0),
        PresetName::Thorough => (100_000, 10_000, 2_000, 12, 3_600.0),
    };
    config.ensemble.num_catalogs = num_catalogs;
    config.ensemble.min_sim_catalogs = min_sim;
    config.ensemble.time_limit_secs = time_limit;
    config.ranging.num_catalogs = ranging_catalogs;
    config.ranging.max_attempts = max_attempts;
}

/// The default configuration with a preset applied.
pub fn get_preset(name: PresetName) -> ForecastConfig {
    let mut config = ForecastConfig::default();
    apply_preset(&mut config, name);
    config
}
