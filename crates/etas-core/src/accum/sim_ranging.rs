//! Accumulator for simulation ranging.
//!
//! For each of T cumulative time bins it records, per catalog, the number
//! of ruptures and the largest magnitude since the first boundary, plus the
//! bin in which the catalog stopped being complete.

use etas_common::{Error, Result, Rupture};

use super::pool::{merged_catalogs, Partial, PartialPool, PooledConsumer};
use super::slots::{fractile_index, SlotTable, SortedCache};
use super::{check_increasing, Accumulator, CatalogConsumer, ScanContext};
use crate::engine::CatalogView;

/// Maximum magnitude reported for a bin without ruptures.
pub const NO_MAG_NEG: f64 = -10.0;

/// Which catalogs a magnitude fractile is taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectBy {
    /// Every catalog.
    Total,
    /// Only catalogs still complete at the end of the bin.
    Completed,
}

/// Boundaries and slot storage shared by every consumer.
#[derive(Debug)]
pub(crate) struct SimRangingShared {
    time_values: Vec<f64>,
    table: SlotTable,
}

impl SimRangingShared {
    fn bins(&self) -> usize {
        self.time_values.len() - 1
    }

    fn count_col(&self, bin: usize) -> usize {
        bin
    }

    fn mag_col(&self, bin: usize) -> usize {
        self.bins() + bin
    }

    fn stop_col(&self) -> usize {
        2 * self.bins()
    }

    fn size_col(&self) -> usize {
        2 * self.bins() + 1
    }

    /// Bin containing `t`, if `t` lies in [first, last) boundary.
    fn bin_of(&self, t: f64) -> Option<usize> {
        if t < self.time_values[0] {
            return None;
        }
        let ends = &self.time_values[1..];
        let i = ends.partition_point(|&end| end <= t);
        (i < ends.len()).then_some(i)
    }

    /// First bin the catalog does not fully cover, or T if it is complete.
    fn stop_bin(&self, view: &dyn CatalogView) -> usize {
        let stop = view.stop_time();
        if stop >= view.params().tend() {
            return self.bins();
        }
        self.time_values[1..].partition_point(|&end| end <= stop)
    }
}

#[derive(Debug)]
pub(crate) struct SimRangingPartial {
    counts: Vec<u64>,
    max_mag: Vec<f64>,
    size: u64,
    catalogs: u64,
}

impl Partial for SimRangingPartial {
    type Shared = SimRangingShared;

    fn new(shared: &SimRangingShared) -> Self {
        Self {
            counts: vec![0; shared.bins()],
            max_mag: vec![NO_MAG_NEG; shared.bins()],
            size: 0,
            catalogs: 0,
        }
    }

    fn begin_catalog(&mut self, _shared: &SimRangingShared, _ctx: &ScanContext<'_>) -> Result<()> {
        self.abandon_catalog();
        Ok(())
    }

    fn next_rupture(&mut self, shared: &SimRangingShared, ctx: &ScanContext<'_>, rupture: &Rupture) {
        self.size += 1;
        if rupture.t_day > ctx.view.stop_time() {
            return;
        }
        if let Some(bin) = shared.bin_of(rupture.t_day) {
            self.counts[bin] += 1;
            if rupture.mag > self.max_mag[bin] {
                self.max_mag[bin] = rupture.mag;
            }
        }
    }

    fn end_catalog(&mut self, shared: &SimRangingShared, ctx: &ScanContext<'_>) -> Result<()> {
        for i in 1..self.counts.len() {
            self.counts[i] += self.counts[i - 1];
            self.max_mag[i] = self.max_mag[i].max(self.max_mag[i - 1]);
        }
        let slot = shared.table.claim()?;
        for bin in 0..shared.bins() {
            shared.table.set(shared.count_col(bin), slot, self.counts[bin]);
            shared.table.set_f64(shared.mag_col(bin), slot, self.max_mag[bin]);
        }
        shared.table.set(shared.stop_col(), slot, shared.stop_bin(ctx.view) as u64);
        shared.table.set(shared.size_col(), slot, self.size);
        self.catalogs += 1;
        Ok(())
    }

    fn abandon_catalog(&mut self) {
        self.counts.fill(0);
        self.max_mag.fill(NO_MAG_NEG);
        self.size = 0;
    }

    fn catalogs(&self) -> u64 {
        self.catalogs
    }
}

/// Per-catalog cumulative counts and maximum magnitudes over time bins.
///
/// Bin `i` covers `[time_values[0], time_values[i + 1])`; seeds are not
/// counted and neither is anything after a catalog's stop time.
#[derive(Debug)]
pub struct SimRangingAccumulator {
    shared: SimRangingShared,
    pool: PartialPool<SimRangingPartial>,
    count_cache: SortedCache<u64>,
    mag_cache: SortedCache<f64>,
    size_cache: SortedCache<u64>,
    /// `stopped_before[n]`: catalogs whose stop bin is below `n`.
    stopped_before: Vec<u64>,
}

impl SimRangingAccumulator {
    /// Accumulator over the bins delimited by `time_values`.
    pub fn new(time_values: Vec<f64>) -> Result<Self> {
        check_increasing("time_values", &time_values, 2)?;
        let bins = time_values.len() - 1;
        Ok(Self {
            shared: SimRangingShared {
                table: SlotTable::new(2 * bins + 2, 0),
                time_values,
            },
            pool: PartialPool::new(),
            count_cache: SortedCache::new(bins),
            mag_cache: SortedCache::new(bins),
            size_cache: SortedCache::new(1),
            stopped_before: vec![0; bins + 1],
        })
    }

    /// `n + 1` equally spaced boundaries from `t0` to `t1`.
    pub fn uniform_bins(t0: f64, t1: f64, n: usize) -> Vec<f64> {
        (0..=n)
            .map(|i| t0 + (t1 - t0) * i as f64 / n as f64)
            .collect()
    }

    pub fn time_values(&self) -> &[f64] {
        &self.shared.time_values
    }

    /// Number of time bins.
    pub fn bins(&self) -> usize {
        self.shared.bins()
    }

    /// End time of bin `bin`.
    pub fn bin_end(&self, bin: usize) -> f64 {
        self.shared.time_values[bin + 1]
    }

    /// Catalogs accumulated.
    pub fn get_size(&self) -> u64 {
        self.shared.table.filled() as u64
    }

    /// Count at `fractile` of the cumulative rupture counts in `bin`.
    ///
    /// Panics if `bin` is out of range.
    pub fn get_bin_fractile(&self, bin: usize, fractile: f64) -> u64 {
        assert!(bin < self.bins(), "bin {bin} out of range");
        let sorted = self.count_cache.get_or_init(bin, || {
            let mut values = self.shared.table.column(self.shared.count_col(bin));
            values.sort_unstable();
            values
        });
        fractile_index(sorted.len(), fractile).map_or(0, |i| sorted[i])
    }

    /// Largest `n` in `0..=T` such that at most `stop_fraction` of the
    /// catalogs stopped within bins `0..n`.
    pub fn get_survival_bins(&self, stop_fraction: f64) -> usize {
        let allowed = stop_fraction * self.get_size() as f64;
        self.stopped_before
            .iter()
            .rposition(|&stopped| stopped as f64 <= allowed)
            .unwrap_or(0)
    }

    /// Catalogs that stopped within bins `0..n`.
    pub fn stopped_before(&self, n: usize) -> u64 {
        self.stopped_before[n]
    }

    /// Magnitude at `fractile` of the per-catalog maxima in `bin`.
    pub fn get_high_mag_fractile(&self, bin: usize, fractile: f64, select: SelectBy) -> f64 {
        assert!(bin < self.bins(), "bin {bin} out of range");
        match select {
            SelectBy::Total => {
                let sorted = self.mag_cache.get_or_init(bin, || {
                    let mut values = self.shared.table.column_f64(self.shared.mag_col(bin));
                    values.sort_unstable_by(f64::total_cmp);
                    values
                });
                fractile_index(sorted.len(), fractile).map_or(NO_MAG_NEG, |i| sorted[i])
            }
            SelectBy::Completed => self.get_high_mag_fractile_conditioned(bin, bin, fractile),
        }
    }

    /// Magnitude fractile in `bin` over catalogs still complete at the end
    /// of `sel_bin`.
    pub fn get_high_mag_fractile_conditioned(&self, bin: usize, sel_bin: usize, fractile: f64) -> f64 {
        assert!(bin < self.bins() && sel_bin < self.bins(), "bin out of range");
        let table = &self.shared.table;
        let mut values: Vec<f64> = (0..table.filled())
            .filter(|&s| table.get(self.shared.stop_col(), s) as usize > sel_bin)
            .map(|s| table.get_f64(self.shared.mag_col(bin), s))
            .collect();
        values.sort_unstable_by(f64::total_cmp);
        fractile_index(values.len(), fractile).map_or(NO_MAG_NEG, |i| values[i])
    }

    fn reset_caches(&mut self) {
        self.count_cache.clear();
        self.mag_cache.clear();
        self.size_cache.clear();
    }

    fn compute_survival(&mut self) {
        let bins = self.bins();
        let mut stopped_in = vec![0u64; bins + 1];
        for stop in self.shared.table.column(self.shared.stop_col()) {
            stopped_in[(stop as usize).min(bins)] += 1;
        }
        let mut running = 0;
        for n in 0..=bins {
            self.stopped_before[n] = running;
            running += stopped_in[n];
        }
    }
}

impl Accumulator for SimRangingAccumulator {
    fn make_consumer(&self) -> Box<dyn CatalogConsumer + Send + '_> {
        Box::new(PooledConsumer::new(&self.pool, &self.shared))
    }

    fn begin_accumulation(&mut self, capacity: usize) -> Result<()> {
        self.pool.ensure_quiescent("begin_accumulation")?;
        self.pool.drain();
        let bins = self.bins();
        self.shared.table = SlotTable::new(2 * bins + 2, capacity);
        self.stopped_before.fill(0);
        self.reset_caches();
        Ok(())
    }

    fn increase_capacity(&mut self, capacity: usize) -> Result<()> {
        self.pool.ensure_quiescent("increase_capacity")?;
        self.shared.table.grow(capacity);
        self.reset_caches();
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
        self.compute_survival();
        self.reset_caches();
        Ok(())
    }

    fn catalog_size_fractile(&self, fractile: f64) -> Option<f64> {
        let sorted = self.size_cache.get_or_init(0, || {
            let mut values = self.shared.table.column(self.shared.size_col());
            values.sort_unstable();
            values
        });
        fractile_index(sorted.len(), fractile).map(|i| sorted[i] as f64)
    }
}
