//! Catalog consumers and ensemble accumulators.
//!
//! An [`Accumulator`] hands out one [`CatalogConsumer`] per worker. A
//! consumer streams a finished catalog into a partial accumulator pulled
//! from a lock-free pool and pushes it back when the catalog ends. Once all
//! workers are joined, `end_accumulation` merges the partials and the
//! accumulator answers queries.
//!
//! Lifecycle of one ensemble:
//!
//! ```text
//! begin_accumulation(capacity)
//!   make_consumer → open → { begin_catalog … end_catalog }* → close   (per worker)
//! end_accumulation
//! queries
//! ```

pub mod pool;
pub mod scanner;
pub mod seed_est;
pub mod sim_ranging;
pub(crate) mod slots;
pub mod stacked_poisson;
pub mod time_mag;

pub use pool::PartialPool;
pub use scanner::CatalogScanner;
pub use seed_est::SeedEstAccumulator;
pub use sim_ranging::{SelectBy, SimRangingAccumulator, NO_MAG_NEG};
pub use stacked_poisson::{PoissonCache, StackedPoisson};
pub use time_mag::TimeMagAccumulator;

use etas_common::{Error, GenerationInfo, Result, Rupture};

use crate::engine::CatalogView;

/// The catalog being scanned.
#[derive(Clone, Copy)]
pub struct ScanContext<'a> {
    pub view: &'a dyn CatalogView,
    /// Position of the catalog in the ensemble.
    pub catalog_index: u64,
}

/// Streaming receiver for finished catalogs.
///
/// A consumer is opened once per worker and reused for every catalog that
/// worker scans. At most one catalog is in progress at a time; calling
/// `begin_catalog` while closed or mid-catalog is an error.
pub trait CatalogConsumer {
    fn open(&mut self) -> Result<()>;

    /// Close the consumer. A catalog still in progress is discarded.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    fn begin_catalog(&mut self, ctx: &ScanContext<'_>) -> Result<()>;

    fn end_catalog(&mut self, ctx: &ScanContext<'_>) -> Result<()>;

    fn begin_seed_generation(&mut self, _ctx: &ScanContext<'_>, _info: &GenerationInfo) -> Result<()> {
        Ok(())
    }

    fn end_seed_generation(&mut self, _ctx: &ScanContext<'_>) -> Result<()> {
        Ok(())
    }

    fn next_seed_rupture(&mut self, _ctx: &ScanContext<'_>, _rupture: &Rupture) -> Result<()> {
        Ok(())
    }

    fn begin_generation(
        &mut self,
        _ctx: &ScanContext<'_>,
        _generation: usize,
        _info: &GenerationInfo,
    ) -> Result<()> {
        Ok(())
    }

    fn end_generation(&mut self, _ctx: &ScanContext<'_>, _generation: usize) -> Result<()> {
        Ok(())
    }

    fn next_rupture(&mut self, _ctx: &ScanContext<'_>, _rupture: &Rupture) -> Result<()> {
        Ok(())
    }
}

/// Ensemble-wide statistics fed by per-worker consumers.
pub trait Accumulator: Send + Sync {
    /// A new, closed consumer. Safe to call from several workers at once.
    fn make_consumer(&self) -> Box<dyn CatalogConsumer + Send + '_>;

    /// Reset and size for `capacity` catalogs.
    fn begin_accumulation(&mut self, capacity: usize) -> Result<()>;

    /// Grow to `capacity` catalogs, keeping what has been accumulated.
    /// No consumer may be open.
    fn increase_capacity(&mut self, capacity: usize) -> Result<()>;

    /// Merge partial results. No consumer may be open.
    fn end_accumulation(&mut self) -> Result<()>;

    /// Fractile of the catalog size distribution, where supported.
    fn catalog_size_fractile(&self, _fractile: f64) -> Option<f64> {
        None
    }
}

/// Read-only forecast surface of a merged accumulator.
pub trait ForecastQuery {
    /// Cumulative count fractiles, `[row][mag]`.
    fn get_fractile_array(&self, fractile: f64) -> Vec<Vec<u64>>;

    /// Probability of more than `xcount` events, `[row][mag]`. Only
    /// `xcount == 0` (at least one event) is supported.
    fn get_prob_occur_array(&self, xcount: u32) -> Result<Vec<Vec<f64>>>;
}

pub(crate) fn check_xcount(xcount: u32) -> Result<()> {
    if xcount == 0 {
        Ok(())
    } else {
        Err(Error::invalid(
            "xcount",
            format!("only 0 is supported, got {xcount}"),
        ))
    }
}

/// Validate bin boundaries or thresholds: finite, strictly increasing, at
/// least `min_len` values.
pub(crate) fn check_increasing(field: &str, values: &[f64], min_len: usize) -> Result<()> {
    if values.len() < min_len {
        return Err(Error::invalid(
            field,
            format!("needs at least {min_len} values, got {}", values.len()),
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::invalid(field, "values must be finite"));
    }
    if values.windows(2).any(|w| w[1] <= w[0]) {
        return Err(Error::invalid(field, "values must be strictly increasing"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increasing_check() {
        assert!(check_increasing("t", &[0.0, 1.0, 2.0], 2).is_ok());
        assert!(check_increasing("t", &[0.0], 2).is_err());
        assert!(check_increasing("t", &[0.0, 0.0], 2).is_err());
        assert!(check_increasing("t", &[0.0, f64::NAN], 2).is_err());
    }

    #[test]
    fn only_zero_xcount() {
        assert!(check_xcount(0).is_ok());
        assert_eq!(check_xcount(2).unwrap_err().code(), 11);
    }
}
