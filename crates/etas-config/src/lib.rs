//! ETAS forecast configuration loading and validation.
//!
//! This crate provides:
//! - Typed structs for the forecast configuration file (JSON or TOML)
//! - Config resolution (CLI → env → XDG → system → defaults)
//! - Semantic validation
//! - Presets and config snapshots

pub mod forecast;
pub mod preset;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use forecast::{
    BinConfig, EnsembleConfig, ForecastConfig, ModelConfig, RangingConfig, RangingMethodName,
    SeedRupture,
};
pub use preset::{apply_preset, get_preset, PresetError, PresetName};
pub use resolve::{resolve_config, ConfigPath, ConfigSource};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
