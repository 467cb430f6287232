//! Versioning of the JSON documents the CLI emits.

/// Schema version stamped into every JSON report.
pub const SCHEMA_VERSION: &str = "1.0.0";
