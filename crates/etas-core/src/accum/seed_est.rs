//! Analytic catalog-size estimate from the seed generation alone.
//!
//! For each catalog and each candidate minimum magnitude `m_j`, the seeds'
//! direct productivity in [tbegin, tend] above `m_j` is multiplied by the
//! cascade over `g` generations of the branch ratio de-rated to
//! [m_j, mag_max_sim]. Each result is the mean of one Poisson component,
//! stacked into a `[generations][mags]` grid of mixtures.

use std::sync::Arc;

use etas_common::{Error, Result, Rupture};
use etas_math::{cascade_multiplier, derated_branch_ratio, gr_rate, omori_rate_shifted};

use super::pool::{merged_catalogs, Partial, PartialPool, PooledConsumer};
use super::slots::SlotTable;
use super::stacked_poisson::{PoissonCache, StackedPoisson};
use super::{check_increasing, check_xcount, Accumulator, CatalogConsumer, ForecastQuery, ScanContext};

#[derive(Debug)]
pub(crate) struct SeedEstShared {
    mag_values: Vec<f64>,
    generations: usize,
    slots: SlotTable,
}

#[derive(Debug)]
pub(crate) struct SeedEstPartial {
    /// `[generation][mag]` mixtures.
    bins: Vec<StackedPoisson>,
    /// Direct-children mean per candidate magnitude for the current catalog.
    base: Vec<f64>,
    catalogs: u64,
}

impl Partial for SeedEstPartial {
    type Shared = SeedEstShared;

    fn new(shared: &SeedEstShared) -> Self {
        let mags = shared.mag_values.len();
        Self {
            bins: vec![StackedPoisson::new(); shared.generations * mags],
            base: vec![0.0; mags],
            catalogs: 0,
        }
    }

    fn begin_catalog(&mut self, _shared: &SeedEstShared, _ctx: &ScanContext<'_>) -> Result<()> {
        self.abandon_catalog();
        Ok(())
    }

    fn next_seed_rupture(&mut self, shared: &SeedEstShared, ctx: &ScanContext<'_>, rupture: &Rupture) {
        let params = ctx.view.params();
        let range = &params.range;
        let time = omori_rate_shifted(params.p, params.c, rupture.t_day, range.tbegin, range.tend);
        for (j, &mag) in shared.mag_values.iter().enumerate() {
            let band = gr_rate(params.b, params.mref, mag, range.mag_max_sim.max(mag));
            self.base[j] += rupture.k_prod * time * band;
        }
    }

    fn end_catalog(&mut self, shared: &SeedEstShared, ctx: &ScanContext<'_>) -> Result<()> {
        let params = ctx.view.params();
        let range = &params.range;
        let mags = shared.mag_values.len();
        let mut means = vec![0.0; shared.generations * mags];
        for (j, &mag) in shared.mag_values.iter().enumerate() {
            let n = derated_branch_ratio(
                params.a,
                params.p,
                params.c,
                params.b,
                params.alpha,
                params.mref,
                mag,
                range.mag_max_sim.max(mag),
                range.duration(),
            );
            for g in 0..shared.generations {
                let mean = self.base[j] * cascade_multiplier(n, g as u32 + 1);
                if mean.is_nan() {
                    return Err(Error::Numerical(format!(
                        "seed estimate mean is NaN at mag {mag}, generation {}",
                        g + 1
                    )));
                }
                means[g * mags + j] = mean;
            }
        }
        shared.slots.claim()?;
        for (bin, mean) in self.bins.iter_mut().zip(means) {
            bin.add_mean(mean);
        }
        self.catalogs += 1;
        Ok(())
    }

    fn abandon_catalog(&mut self) {
        self.base.fill(0.0);
    }

    fn catalogs(&self) -> u64 {
        self.catalogs
    }
}

/// Stacked Poisson estimate of catalog size by generation count and
/// minimum magnitude.
///
/// Row `g` sums generations `1..=g + 1` of aftershocks; column `j` counts
/// ruptures at or above `mag_values[j]`.
#[derive(Debug)]
pub struct SeedEstAccumulator {
    shared: SeedEstShared,
    pool: PartialPool<SeedEstPartial>,
    total: Vec<StackedPoisson>,
    cache: Arc<PoissonCache>,
}

impl SeedEstAccumulator {
    pub fn new(mag_values: Vec<f64>, generations: u32, cache: Arc<PoissonCache>) -> Result<Self> {
        check_increasing("mag_values", &mag_values, 1)?;
        if generations == 0 {
            return Err(Error::invalid("generations", "must be positive"));
        }
        let generations = generations as usize;
        Ok(Self {
            total: vec![StackedPoisson::new(); generations * mag_values.len()],
            shared: SeedEstShared {
                mag_values,
                generations,
                slots: SlotTable::new(0, 0),
            },
            pool: PartialPool::new(),
            cache,
        })
    }

    /// Candidate magnitudes `m_lo, m_lo + step, …` up to `m_hi`.
    pub fn candidate_mags(m_lo: f64, m_hi: f64, step: f64) -> Vec<f64> {
        let n = ((m_hi - m_lo) / step + 1e-9).floor().max(0.0) as usize;
        (0..=n).map(|i| m_lo + step * i as f64).collect()
    }

    pub fn mag_values(&self) -> &[f64] {
        &self.shared.mag_values
    }

    pub fn generations(&self) -> usize {
        self.shared.generations
    }

    pub fn get_size(&self) -> u64 {
        self.shared.slots.filled() as u64
    }

    fn bin(&self, generation: usize, mag_bin: usize) -> &StackedPoisson {
        &self.total[generation * self.shared.mag_values.len() + mag_bin]
    }

    /// Size fractile summed over `generation + 1` generations above
    /// `mag_values[mag_bin]`.
    pub fn get_fractile(&self, generation: usize, mag_bin: usize, fractile: f64) -> u64 {
        self.bin(generation, mag_bin).fractile(fractile, &self.cache)
    }

    pub fn get_prob_occur(&self, generation: usize, mag_bin: usize) -> f64 {
        self.bin(generation, mag_bin).prob_occur(&self.cache)
    }
}

impl Accumulator for SeedEstAccumulator {
    fn make_consumer(&self) -> Box<dyn CatalogConsumer + Send + '_> {
        Box::new(PooledConsumer::new(&self.pool, &self.shared))
    }

    fn begin_accumulation(&mut self, capacity: usize) -> Result<()> {
        self.pool.ensure_quiescent("begin_accumulation")?;
        self.pool.drain();
        self.shared.slots = SlotTable::new(0, capacity);
        for bin in &mut self.total {
            bin.clear();
        }
        Ok(())
    }

    fn increase_capacity(&mut self, capacity: usize) -> Result<()> {
        self.pool.ensure_quiescent("increase_capacity")?;
        self.shared.slots.grow(capacity);
        Ok(())
    }

    fn end_accumulation(&mut self) -> Result<()> {
        self.pool.ensure_quiescent("end_accumulation")?;
        let partials = self.pool.drain();
        let merged = merged_catalogs(&partials);
        let filled = self.get_size();
        if merged != filled {
            return Err(Error::ConsumerState(format!(
                "partials completed {merged} catalogs but {filled} slots were filled"
            )));
        }
        for partial in &partials {
            for (total, bin) in self.total.iter_mut().zip(&partial.bins) {
                total.merge(bin);
            }
        }
        for bin in &mut self.total {
            bin.cumulate();
        }
        Ok(())
    }
}

impl ForecastQuery for SeedEstAccumulator {
    fn get_fractile_array(&self, fractile: f64) -> Vec<Vec<u64>> {
        let mags = self.shared.mag_values.len();
        (0..self.shared.generations)
            .map(|g| (0..mags).map(|j| self.get_fractile(g, j, fractile)).collect())
            .collect()
    }

    fn get_prob_occur_array(&self, xcount: u32) -> Result<Vec<Vec<f64>>> {
        check_xcount(xcount)?;
        let mags = self.shared.mag_values.len();
        Ok((0..self.shared.generations)
            .map(|g| (0..mags).map(|j| self.get_prob_occur(g, j)).collect())
            .collect())
    }
}
