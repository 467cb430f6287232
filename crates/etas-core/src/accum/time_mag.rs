//! Forecast accumulator over time bins and magnitude thresholds.

use etas_common::{Error, Result, Rupture};

use super::pool::{merged_catalogs, Partial, PartialPool, PooledConsumer};
use super::slots::{fractile_index, SlotTable, SortedCache};
use super::{check_increasing, check_xcount, Accumulator, CatalogConsumer, ForecastQuery, ScanContext};

#[derive(Debug)]
pub(crate) struct TimeMagShared {
    time_values: Vec<f64>,
    mag_values: Vec<f64>,
    table: SlotTable,
}

impl TimeMagShared {
    fn time_bins(&self) -> usize {
        self.time_values.len() - 1
    }

    fn mag_bins(&self) -> usize {
        self.mag_values.len()
    }

    fn col(&self, time_bin: usize, mag_bin: usize) -> usize {
        time_bin * self.mag_bins() + mag_bin
    }
}

#[derive(Debug)]
pub(crate) struct TimeMagPartial {
    /// `[time][mag]`, per bin until `end_catalog` makes it cumulative.
    counts: Vec<u64>,
    catalogs: u64,
}

impl Partial for TimeMagPartial {
    type Shared = TimeMagShared;

    fn new(shared: &TimeMagShared) -> Self {
        Self {
            counts: vec![0; shared.time_bins() * shared.mag_bins()],
            catalogs: 0,
        }
    }

    fn begin_catalog(&mut self, _shared: &TimeMagShared, _ctx: &ScanContext<'_>) -> Result<()> {
        self.abandon_catalog();
        Ok(())
    }

    fn next_rupture(&mut self, shared: &TimeMagShared, ctx: &ScanContext<'_>, rupture: &Rupture) {
        let t = rupture.t_day;
        if t > ctx.view.stop_time() || t < shared.time_values[0] {
            return;
        }
        let ends = &shared.time_values[1..];
        let time_bin = ends.partition_point(|&end| end <= t);
        if time_bin == ends.len() {
            return;
        }
        let above = shared.mag_values.partition_point(|&m| m <= rupture.mag);
        for mag_bin in 0..above {
            self.counts[shared.col(time_bin, mag_bin)] += 1;
        }
    }

    fn end_catalog(&mut self, shared: &TimeMagShared, _ctx: &ScanContext<'_>) -> Result<()> {
        let mags = shared.mag_bins();
        for i in mags..self.counts.len() {
            self.counts[i] += self.counts[i - mags];
        }
        let slot = shared.table.claim()?;
        for (col, &count) in self.counts.iter().enumerate() {
            shared.table.set(col, slot, count);
        }
        self.catalogs += 1;
        Ok(())
    }

    fn abandon_catalog(&mut self) {
        self.counts.fill(0);
    }

    fn catalogs(&self) -> u64 {
        self.catalogs
    }
}

/// Cumulative rupture counts per catalog over `[time][mag]` bins.
///
/// Time bin `i` covers `[time_values[0], time_values[i + 1])`; magnitude
/// column `j` counts ruptures with `mag >= mag_values[j]`.
#[derive(Debug)]
pub struct TimeMagAccumulator {
    shared: TimeMagShared,
    pool: PartialPool<TimeMagPartial>,
    cache: SortedCache<u64>,
}

impl TimeMagAccumulator {
    pub fn new(time_values: Vec<f64>, mag_values: Vec<f64>) -> Result<Self> {
        check_increasing("time_values", &time_values, 2)?;
        check_increasing("mag_values", &mag_values, 1)?;
        let columns = (time_values.len() - 1) * mag_values.len();
        Ok(Self {
            shared: TimeMagShared {
                time_values,
                mag_values,
                table: SlotTable::new(columns, 0),
            },
            pool: PartialPool::new(),
            cache: SortedCache::new(columns),
        })
    }

    pub fn time_values(&self) -> &[f64] {
        &self.shared.time_values
    }

    pub fn mag_values(&self) -> &[f64] {
        &self.shared.mag_values
    }

    pub fn get_size(&self) -> u64 {
        self.shared.table.filled() as u64
    }

    fn sorted(&self, col: usize) -> &[u64] {
        self.cache.get_or_init(col, || {
            let mut values = self.shared.table.column(col);
            values.sort_unstable();
            values
        })
    }

    /// Count at `fractile` for one `[time][mag]` cell.
    pub fn get_fractile(&self, time_bin: usize, mag_bin: usize, fractile: f64) -> u64 {
        let sorted = self.sorted(self.shared.col(time_bin, mag_bin));
        fractile_index(sorted.len(), fractile).map_or(0, |i| sorted[i])
    }

    /// Fraction of catalogs with at least one rupture in the cell.
    pub fn get_prob_occur(&self, time_bin: usize, mag_bin: usize) -> f64 {
        let sorted = self.sorted(self.shared.col(time_bin, mag_bin));
        if sorted.is_empty() {
            return 0.0;
        }
        let zeros = sorted.partition_point(|&c| c == 0);
        (sorted.len() - zeros) as f64 / sorted.len() as f64
    }
}

impl Accumulator for TimeMagAccumulator {
    fn make_consumer(&self) -> Box<dyn CatalogConsumer + Send + '_> {
        Box::new(PooledConsumer::new(&self.pool, &self.shared))
    }

    fn begin_accumulation(&mut self, capacity: usize) -> Result<()> {
        self.pool.ensure_quiescent("begin_accumulation")?;
        self.pool.drain();
        let columns = self.shared.time_bins() * self.shared.mag_bins();
        self.shared.table = SlotTable::new(columns, capacity);
        self.cache.clear();
        Ok(())
    }

    fn increase_capacity(&mut self, capacity: usize) -> Result<()> {
        self.pool.ensure_quiescent("increase_capacity")?;
        self.shared.table.grow(capacity);
        self.cache.clear();
        Ok(())
    }

    fn end_accumulation(&mut self) -> Result<()> {
        self.pool.ensure_quiescent("end_accumulation")?;
        let merged = merged_catalogs(&self.pool.drain());
        let filled = self.get_size();
        if merged != filled {
            return Err(Error::ConsumerState(format!(
                "partials completed {merged} catalogs but {filled} slots were filled"
            )));
        }
        self.cache.clear();
        Ok(())
    }
}

impl ForecastQuery for TimeMagAccumulator {
    fn get_fractile_array(&self, fractile: f64) -> Vec<Vec<u64>> {
        (0..self.shared.time_bins())
            .map(|i| {
                (0..self.shared.mag_bins())
                    .map(|j| self.get_fractile(i, j, fractile))
                    .collect()
            })
            .collect()
    }

    fn get_prob_occur_array(&self, xcount: u32) -> Result<Vec<Vec<f64>>> {
        check_xcount(xcount)?;
        Ok((0..self.shared.time_bins())
            .map(|i| {
                (0..self.shared.mag_bins())
                    .map(|j| self.get_prob_occur(i, j))
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CatalogStorage, CatalogView};
    use etas_common::{CatalogParams, GenerationInfo};

    fn scan_children(acc: &TimeMagAccumulator, catalogs: &[Vec<(f64, f64)>]) {
        let mut consumer = acc.make_consumer();
        consumer.open().unwrap();
        for (index, children) in catalogs.iter().enumerate() {
            let mut view = CatalogStorage::new(&CatalogParams::default());
            view.begin_generation(GenerationInfo::new(3.0, 9.5));
            view.push_rupture(Rupture::seed(0.0, 7.0, 1.0)).unwrap();
            view.begin_generation(GenerationInfo::new(3.0, 9.5));
            let seed = *view.rupture(0, 0);
            for &(t, m) in children {
                view.push_rupture(Rupture::child(t, m, 0.1, 0, &seed)).unwrap();
            }
            let ctx = ScanContext {
                view: &view,
                catalog_index: index as u64,
            };
            consumer.begin_catalog(&ctx).unwrap();
            for i in 0..view.generation_size(1) {
                consumer.next_rupture(&ctx, view.rupture(1, i)).unwrap();
            }
            consumer.end_catalog(&ctx).unwrap();
        }
        consumer.close().unwrap();
    }

    #[test]
    fn counts_are_cumulative_in_time_and_magnitude() {
        let mut acc = TimeMagAccumulator::new(vec![0.0, 1.0, 10.0], vec![3.0, 5.0]).unwrap();
        acc.begin_accumulation(2).unwrap();
        scan_children(
            &acc,
            &[vec![(0.5, 3.2), (0.7, 5.1), (4.0, 4.0)], vec![(20.0, 6.0)]],
        );
        acc.end_accumulation().unwrap();

        let max = acc.get_fractile_array(1.0);
        assert_eq!(max, vec![vec![2, 1], vec![3, 1]]);
        let min = acc.get_fractile_array(0.0);
        assert_eq!(min, vec![vec![0, 0], vec![0, 0]]);

        let prob = acc.get_prob_occur_array(0).unwrap();
        assert_eq!(prob, vec![vec![0.5, 0.5], vec![0.5, 0.5]]);
        assert!(acc.get_prob_occur_array(1).is_err());
    }

    #[test]
    fn unsupported_capability_defaults_to_none() {
        let acc = TimeMagAccumulator::new(vec![0.0, 1.0], vec![3.0]).unwrap();
        assert_eq!(acc.catalog_size_fractile(0.5), None);
    }

    #[test]
    fn rejects_empty_magnitudes() {
        assert!(TimeMagAccumulator::new(vec![0.0, 1.0], vec![]).is_err());
    }
}
