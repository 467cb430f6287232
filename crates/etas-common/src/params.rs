//! Catalog parameters and simulation ranges.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How each generation's minimum magnitude is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagAdjust {
    /// Every generation uses [mag_min_sim, mag_max_sim].
    #[default]
    Fixed,
    /// Raise a generation's minimum magnitude (up to `mag_min_hi`) so its
    /// expected size stays at or below `gen_size_target`.
    GenSize,
}

impl std::fmt::Display for MagAdjust {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MagAdjust::Fixed => write!(f, "fixed"),
            MagAdjust::GenSize => write!(f, "gen_size"),
        }
    }
}

/// Time and magnitude bounds of a simulation, plus the magnitude
/// adjustment policy. This is the part of [`CatalogParams`] that ranging
/// rewrites between attempts.
///
/// After construction `mag_min_lo <= mag_min_sim <= mag_min_hi` and
/// `mag_max_lo <= mag_max_sim <= mag_max_hi` always hold; [`Self::validate`]
/// checks them and the setters clamp into the bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogRange {
    /// Simulation start time, in days.
    pub tbegin: f64,
    /// Simulation end time, in days.
    pub tend: f64,
    pub mag_min_sim: f64,
    pub mag_max_sim: f64,
    pub mag_min_lo: f64,
    pub mag_min_hi: f64,
    pub mag_max_lo: f64,
    pub mag_max_hi: f64,
    /// Target number of ruptures per generation under [`MagAdjust::GenSize`].
    pub gen_size_target: u64,
    /// Magnitudes are sampled up to `mag_max_sim + mag_excess`; a rupture
    /// above `mag_max_sim` ends the catalog at its time.
    pub mag_excess: f64,
    pub mag_adjust: MagAdjust,
}

impl Default for CatalogRange {
    fn default() -> Self {
        Self {
            tbegin: 0.0,
            tend: 365.0,
            mag_min_sim: 3.0,
            mag_max_sim: 9.5,
            mag_min_lo: 2.0,
            mag_min_hi: 5.0,
            mag_max_lo: 8.0,
            mag_max_hi: 9.5,
            gen_size_target: 100_000,
            mag_excess: 0.0,
            mag_adjust: MagAdjust::Fixed,
        }
    }
}

impl CatalogRange {
    /// Simulated duration in days.
    pub fn duration(&self) -> f64 {
        self.tend - self.tbegin
    }

    /// Check ordering and finiteness of every bound.
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("tbegin", self.tbegin),
            ("tend", self.tend),
            ("mag_min_sim", self.mag_min_sim),
            ("mag_max_sim", self.mag_max_sim),
            ("mag_min_lo", self.mag_min_lo),
            ("mag_min_hi", self.mag_min_hi),
            ("mag_max_lo", self.mag_max_lo),
            ("mag_max_hi", self.mag_max_hi),
            ("mag_excess", self.mag_excess),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(Error::invalid(field, format!("must be finite, got {value}")));
            }
        }
        if self.tend <= self.tbegin {
            return Err(Error::invalid(
                "tend",
                format!("must exceed tbegin ({} <= {})", self.tend, self.tbegin),
            ));
        }
        if !(self.mag_min_lo <= self.mag_min_sim && self.mag_min_sim <= self.mag_min_hi) {
            return Err(Error::invalid(
                "mag_min_sim",
                format!(
                    "{} outside [{}, {}]",
                    self.mag_min_sim, self.mag_min_lo, self.mag_min_hi
                ),
            ));
        }
        if !(self.mag_max_lo <= self.mag_max_sim && self.mag_max_sim <= self.mag_max_hi) {
            return Err(Error::invalid(
                "mag_max_sim",
                format!(
                    "{} outside [{}, {}]",
                    self.mag_max_sim, self.mag_max_lo, self.mag_max_hi
                ),
            ));
        }
        if self.mag_max_sim <= self.mag_min_sim {
            return Err(Error::invalid(
                "mag_max_sim",
                format!("must exceed mag_min_sim ({})", self.mag_min_sim),
            ));
        }
        if self.mag_excess < 0.0 {
            return Err(Error::invalid("mag_excess", "must be non-negative"));
        }
        if self.gen_size_target == 0 {
            return Err(Error::invalid("gen_size_target", "must be positive"));
        }
        Ok(())
    }

    /// Set `mag_min_sim`, clamped into [mag_min_lo, mag_min_hi].
    pub fn set_mag_min_clamped(&mut self, mag: f64) {
        self.mag_min_sim = mag.clamp(self.mag_min_lo, self.mag_min_hi);
    }

    /// Set `mag_max_sim`, clamped into [mag_max_lo, mag_max_hi].
    pub fn set_mag_max_clamped(&mut self, mag: f64) {
        self.mag_max_sim = mag.clamp(self.mag_max_lo, self.mag_max_hi);
    }
}

/// Physical ETAS parameters for one realization.
///
/// Built once per ensemble; ranging derives a fresh copy for each attempt
/// through [`CatalogParams::with_range`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogParams {
    /// Productivity, log10.
    pub a: f64,
    /// Omori exponent.
    pub p: f64,
    /// Omori offset, days.
    pub c: f64,
    /// Gutenberg-Richter b-value.
    pub b: f64,
    /// Productivity magnitude scaling.
    pub alpha: f64,
    /// Reference magnitude for productivity and G-R normalization.
    pub mref: f64,
    /// Maximum considered magnitude for the branch ratio.
    pub msup: f64,
    #[serde(flatten)]
    pub range: CatalogRange,
    /// Stop expanding after this many generations.
    pub max_generations: u32,
    /// Stop expanding once the catalog holds this many ruptures.
    pub max_catalog_size: u64,
}

impl Default for CatalogParams {
    fn default() -> Self {
        Self {
            a: -2.5,
            p: 1.08,
            c: 0.01,
            b: 1.0,
            alpha: 1.0,
            mref: 3.0,
            msup: 9.5,
            range: CatalogRange::default(),
            max_generations: 100,
            max_catalog_size: 5_000_000,
        }
    }
}

impl CatalogParams {
    /// Copy of these parameters with a different simulation range.
    pub fn with_range(&self, range: &CatalogRange) -> Self {
        Self {
            range: range.clone(),
            ..self.clone()
        }
    }

    pub fn tbegin(&self) -> f64 {
        self.range.tbegin
    }

    pub fn tend(&self) -> f64 {
        self.range.tend
    }

    /// Validate physical parameters and the range.
    pub fn validate(&self) -> Result<()> {
        if !self.a.is_finite() {
            return Err(Error::invalid("a", "must be finite"));
        }
        if !(self.p > 0.0 && self.p.is_finite()) {
            return Err(Error::invalid("p", format!("must be positive, got {}", self.p)));
        }
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(Error::invalid("c", format!("must be positive, got {}", self.c)));
        }
        if !(self.b > 0.0 && self.b.is_finite()) {
            return Err(Error::invalid("b", format!("must be positive, got {}", self.b)));
        }
        if !self.alpha.is_finite() {
            return Err(Error::invalid("alpha", "must be finite"));
        }
        if !(self.mref < self.msup) {
            return Err(Error::invalid(
                "msup",
                format!("must exceed mref ({} <= {})", self.msup, self.mref),
            ));
        }
        if self.max_generations == 0 {
            return Err(Error::invalid("max_generations", "must be positive"));
        }
        if self.max_catalog_size == 0 {
            return Err(Error::invalid("max_catalog_size", "must be positive"));
        }
        self.range.validate()
    }
}
