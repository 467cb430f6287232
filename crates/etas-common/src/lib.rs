//! ETAS shared types and errors.
//!
//! This crate provides the data model shared across the workspace:
//! - Catalog parameters and simulation ranges
//! - Ruptures and generation bounds
//! - The unified error type
//! - Output formats

pub mod error;
pub mod output;
pub mod params;
pub mod rupture;
pub mod schema;

pub use error::{format_error_human, Error, ErrorCategory, ErrorReport, Result, SuggestedAction};
pub use output::OutputFormat;
pub use params::{CatalogParams, CatalogRange, MagAdjust};
pub use rupture::{GenerationInfo, Rupture};
pub use schema::SCHEMA_VERSION;
