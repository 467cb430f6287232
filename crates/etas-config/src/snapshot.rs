//! Configuration snapshots for reproducibility.
//!
//! A snapshot records the exact configuration a run used: a hash of its
//! canonical JSON, where it came from, and the values most often compared
//! between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::forecast::{ForecastConfig, RangingMethodName};
use crate::resolve::ConfigPath;

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// SHA-256 of the canonical JSON form of the resolved configuration.
    pub config_hash: String,

    /// SHA-256 of the file text as read, if a file was used.
    #[serde(default)]
    pub file_hash: Option<String>,

    /// Path the configuration was loaded from.
    #[serde(default)]
    pub config_path: Option<String>,

    /// Source of the configuration.
    pub config_source: String,

    /// Preset applied on top of the file, if any.
    #[serde(default)]
    pub preset: Option<String>,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Key values for quick comparison between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    #[serde(default)]
    pub a: Option<f64>,
    #[serde(default)]
    pub branch_ratio: Option<f64>,
    pub p: f64,
    pub c: f64,
    pub b: f64,
    pub alpha: f64,
    pub seed_count: usize,
    pub num_catalogs: u64,
    pub ranging_method: RangingMethodName,
    pub target_size: u64,
    pub time_bins: usize,
    pub mag_bins: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ConfigSummary {
    fn from_config(config: &ForecastConfig) -> Self {
        ConfigSummary {
            a: config.model.a,
            branch_ratio: config.model.branch_ratio,
            p: config.model.p,
            c: config.model.c,
            b: config.model.b,
            alpha: config.model.alpha,
            seed_count: config.model.seeds.len(),
            num_catalogs: config.ensemble.num_catalogs,
            ranging_method: config.ranging.method,
            target_size: config.ranging.target_size,
            time_bins: config.bins.time_values.len().saturating_sub(1),
            mag_bins: config.bins.mag_values.len(),
            seed: config.ensemble.seed,
        }
    }
}

impl ConfigSnapshot {
    /// Snapshot a resolved configuration.
    pub fn new(
        config: &ForecastConfig,
        location: &ConfigPath,
        raw: Option<&str>,
        preset: Option<&str>,
    ) -> Self {
        let canonical = serde_json::to_string(config).unwrap_or_default();
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: config.schema_version.clone(),
            config_hash: hash_content(&canonical),
            file_hash: raw.map(hash_content),
            config_path: location.path.as_ref().map(|p| p.display().to_string()),
            config_source: location.source.to_string(),
            preset: preset.map(str::to_string),
            summary: ConfigSummary::from_config(config),
        }
    }

    /// Snapshot of the built-in defaults.
    pub fn defaults_only() -> Self {
        Self::new(&ForecastConfig::default(), &ConfigPath::default(), None, None)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// True when both snapshots describe the same resolved configuration.
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.config_hash == other.config_hash
    }

    /// First 12 hex characters of the config hash.
    pub fn short_id(&self) -> &str {
        &self.config_hash[..12.min(self.config_hash.len())]
    }
}

/// Hash content with SHA-256 and return the hex string.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_snapshot() {
        let snapshot = ConfigSnapshot::defaults_only();
        assert_eq!(snapshot.schema_version, crate::CONFIG_SCHEMA_VERSION);
        assert!(snapshot.file_hash.is_none());
        assert_eq!(snapshot.config_source, "builtin default");
        assert_eq!(snapshot.summary.branch_ratio, Some(0.5));
    }

    #[test]
    fn test_snapshot_short_id() {
        assert_eq!(ConfigSnapshot::defaults_only().short_id().len(), 12);
    }

    #[test]
    fn test_changed_value_changes_hash() {
        let base = ConfigSnapshot::defaults_only();
        let mut cfg = ForecastConfig::default();
        cfg.model.p = 1.2;
        let changed = ConfigSnapshot::new(&cfg, &ConfigPath::default(), None, None);
        assert!(!base.matches(&changed));
        assert!(base.matches(&ConfigSnapshot::defaults_only()));
    }

    #[test]
    fn test_hash_content() {
        let hash = hash_content("test");
        assert_eq!(hash, hash_content("test"));
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = ConfigSnapshot::defaults_only();
        let json = snapshot.to_json().unwrap();
        let restored = ConfigSnapshot::from_json(&json).unwrap();
        assert!(snapshot.matches(&restored));
    }
}
