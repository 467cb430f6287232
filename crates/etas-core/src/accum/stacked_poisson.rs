//! Mixtures of Poisson distributions, one component per catalog.
//!
//! Means are snapped to a logarithmic grid and stored as integer weights
//! per grid point. Adding a catalog and merging two bins are therefore
//! exact integer additions, independent of order, and every bin shares the
//! same small set of distinct means, whose CDF tables are cached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use etas_math::{poisson_cdf, poisson_upper_bound};

/// Means below this are treated as zero.
pub const MEAN_FLOOR: f64 = 1e-4;

/// Ratio between adjacent grid means.
pub const GRID_STEP: f64 = 1.01;

/// Largest support cached as a table; larger means call the incomplete
/// gamma directly.
const TABLE_LIMIT: u64 = 4_096;

/// Tail mass ignored when bounding the support.
const TAIL: f64 = 1e-12;

fn grid_key(mean: f64) -> Option<u32> {
    if !(mean >= MEAN_FLOOR) || !mean.is_finite() {
        return None;
    }
    let key = ((mean / MEAN_FLOOR).ln() / GRID_STEP.ln()).round();
    Some(key.min(u32::MAX as f64) as u32)
}

/// The mean a grid key stands for.
pub fn grid_mean(key: u32) -> f64 {
    MEAN_FLOOR * GRID_STEP.powf(key as f64)
}

/// Shared CDF tables keyed by grid point.
#[derive(Debug, Default)]
pub struct PoissonCache {
    tables: Mutex<HashMap<u32, Arc<Vec<f64>>>>,
}

impl PoissonCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, key: u32) -> Option<Arc<Vec<f64>>> {
        let mean = grid_mean(key);
        let upper = poisson_upper_bound(mean, TAIL);
        if upper > TABLE_LIMIT {
            return None;
        }
        let mut tables = match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let table = tables.entry(key).or_insert_with(|| {
            let mut cdf: Vec<f64> = (0..=upper).map(|k| poisson_cdf(k, mean)).collect();
            // Force a monotone table that reaches 1.
            for i in 1..cdf.len() {
                cdf[i] = cdf[i].max(cdf[i - 1]);
            }
            if let Some(last) = cdf.last_mut() {
                *last = 1.0;
            }
            Arc::new(cdf)
        });
        Some(Arc::clone(table))
    }

    /// `P(N <= k)` for the grid mean of `key`.
    pub fn cdf(&self, key: u32, k: u64) -> f64 {
        match self.table(key) {
            Some(table) => table.get(k as usize).copied().unwrap_or(1.0),
            None => poisson_cdf(k, grid_mean(key)),
        }
    }

    /// Number of cached tables.
    pub fn len(&self) -> usize {
        self.tables.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One bin of a stacked Poisson accumulator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackedPoisson {
    weights: HashMap<u32, u64>,
    zero_weight: u64,
    /// Grid points sorted by mean, built by [`Self::cumulate`].
    cumulated: Option<Vec<(u32, u64)>>,
}

impl StackedPoisson {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one catalog's Poisson component.
    pub fn add_mean(&mut self, mean: f64) {
        match grid_key(mean) {
            Some(key) => *self.weights.entry(key).or_insert(0) += 1,
            None => self.zero_weight += 1,
        }
        self.cumulated = None;
    }

    pub fn merge(&mut self, other: &StackedPoisson) {
        for (&key, &weight) in &other.weights {
            *self.weights.entry(key).or_insert(0) += weight;
        }
        self.zero_weight += other.zero_weight;
        self.cumulated = None;
    }

    pub fn clear(&mut self) {
        self.weights.clear();
        self.zero_weight = 0;
        self.cumulated = None;
    }

    /// Number of components.
    pub fn total_weight(&self) -> u64 {
        self.zero_weight + self.weights.values().sum::<u64>()
    }

    /// Freeze for queries.
    pub fn cumulate(&mut self) {
        let mut points: Vec<(u32, u64)> = self.weights.iter().map(|(&k, &w)| (k, w)).collect();
        points.sort_unstable_by_key(|&(k, _)| k);
        self.cumulated = Some(points);
    }

    fn points(&self) -> Vec<(u32, u64)> {
        match &self.cumulated {
            Some(points) => points.clone(),
            None => {
                let mut points: Vec<(u32, u64)> =
                    self.weights.iter().map(|(&k, &w)| (k, w)).collect();
                points.sort_unstable_by_key(|&(k, _)| k);
                points
            }
        }
    }

    fn cdf_with(&self, points: &[(u32, u64)], k: u64, cache: &PoissonCache) -> f64 {
        let total = self.total_weight();
        if total == 0 {
            return 1.0;
        }
        let mut mass = self.zero_weight as f64;
        for &(key, weight) in points {
            mass += weight as f64 * cache.cdf(key, k);
        }
        (mass / total as f64).min(1.0)
    }

    /// Mixture `P(N <= k)`.
    pub fn cdf(&self, k: u64, cache: &PoissonCache) -> f64 {
        self.cdf_with(&self.points(), k, cache)
    }

    /// Mixture `P(N >= 1)`.
    pub fn prob_occur(&self, cache: &PoissonCache) -> f64 {
        if self.total_weight() == 0 {
            return 0.0;
        }
        1.0 - self.cdf(0, cache)
    }

    /// Smallest `k` with mixture `P(N <= k) >= fractile`.
    pub fn fractile(&self, fractile: f64, cache: &PoissonCache) -> u64 {
        if self.total_weight() == 0 || !(fractile > 0.0) {
            return 0;
        }
        let points = self.points();
        let mut hi = points
            .last()
            .map(|&(key, _)| poisson_upper_bound(grid_mean(key), TAIL))
            .unwrap_or(0);
        if self.cdf_with(&points, 0, cache) >= fractile {
            return 0;
        }
        if self.cdf_with(&points, hi, cache) < fractile {
            return hi;
        }
        // invariant: cdf(lo) < fractile <= cdf(hi)
        let mut lo = 0u64;
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.cdf_with(&points, mid, cache) >= fractile {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        hi
    }
}
