//! Generation-by-generation expansion of a seeded catalog.

use etas_common::{CatalogParams, Error, GenerationInfo, MagAdjust, Result, Rupture};
use etas_math::{expected_children, gr_ratio_inverse, productivity};

use super::catalog::{CatalogStorage, CatalogView};
use crate::random::RandomStream;

/// Scalar model values copied out of [`CatalogParams`] once per catalog.
#[derive(Debug, Clone, Copy)]
struct Kernel {
    a: f64,
    p: f64,
    c: f64,
    b: f64,
    alpha: f64,
    mref: f64,
    tbegin: f64,
    mag_min_sim: f64,
    mag_min_hi: f64,
    mag_max_sim: f64,
    mag_top: f64,
    gen_size_target: f64,
    adjust: MagAdjust,
    max_generations: usize,
    max_size: u64,
}

impl Kernel {
    fn new(params: &CatalogParams) -> Self {
        let range = &params.range;
        Self {
            a: params.a,
            p: params.p,
            c: params.c,
            b: params.b,
            alpha: params.alpha,
            mref: params.mref,
            tbegin: range.tbegin,
            mag_min_sim: range.mag_min_sim,
            mag_min_hi: range.mag_min_hi,
            mag_max_sim: range.mag_max_sim,
            mag_top: range.mag_max_sim + range.mag_excess,
            gen_size_target: range.gen_size_target as f64,
            adjust: range.mag_adjust,
            max_generations: params.max_generations as usize,
            max_size: params.max_catalog_size,
        }
    }

    fn expected(&self, parent: &Rupture, t_stop: f64, m1: f64) -> f64 {
        let lo = parent.t_day.max(self.tbegin);
        if t_stop <= lo {
            return 0.0;
        }
        expected_children(
            parent.k_prod,
            self.p,
            self.c,
            self.b,
            self.mref,
            parent.t_day,
            lo,
            t_stop,
            m1,
            self.mag_top,
        )
    }

    /// Minimum magnitude for the children of `parents`.
    fn generation_mag_min(&self, parents: &[Rupture], t_stop: f64) -> Result<f64> {
        if self.adjust == MagAdjust::Fixed {
            return Ok(self.mag_min_sim);
        }
        let mut total = 0.0;
        for parent in parents {
            total += self.expected(parent, t_stop, self.mag_min_sim);
        }
        if !total.is_finite() {
            return Err(Error::Numerical(format!(
                "expected generation size is {total}"
            )));
        }
        if total <= self.gen_size_target {
            return Ok(self.mag_min_sim);
        }
        let mag = gr_ratio_inverse(self.b, self.mag_min_sim, self.mag_top, self.gen_size_target / total);
        if mag.is_nan() {
            return Ok(self.mag_min_sim);
        }
        Ok(mag.clamp(self.mag_min_sim, self.mag_min_hi.max(self.mag_min_sim)))
    }
}

/// Expands a seeded [`CatalogStorage`] until the branching process dies out
/// or a cap is reached.
///
/// Holds no per-catalog state, so one instance serves a worker for the
/// whole run.
#[derive(Debug, Default, Clone)]
pub struct CatalogGenerator {
    _private: (),
}

impl CatalogGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate every generation after the seeds already in `storage`.
    ///
    /// Expansion stops on an empty generation, after `max_generations`
    /// generations (seeds included) or once `max_catalog_size` ruptures
    /// exist. When it stops early, the stop time is lowered to the first
    /// moment the catalog may be missing events.
    pub fn generate_all_generations(
        &mut self,
        storage: &mut CatalogStorage,
        rng: &mut RandomStream,
    ) -> Result<()> {
        if storage.generation_count() == 0 {
            return Ok(());
        }
        let kernel = Kernel::new(storage.params());
        let mut t_stop = storage.stop_time();
        let mut size = storage.total_size();
        let mut parent_gen = 0;

        loop {
            let parents = storage.generation(parent_gen);
            if parents.is_empty() {
                break;
            }
            if storage.generation_count() >= kernel.max_generations || size >= kernel.max_size {
                t_stop = t_stop.min(earliest_time(parents));
                break;
            }

            let mag_min = kernel.generation_mag_min(parents, t_stop)?;
            storage.begin_generation(GenerationInfo::new(mag_min, kernel.mag_top));
            let (parents, children) = storage.split_for_expansion(parent_gen);

            for (i, parent) in parents.iter().enumerate() {
                if size >= kernel.max_size {
                    // Later parents and every new child are unexpanded.
                    let pending = parents[i..]
                        .iter()
                        .map(|r| r.t_day.max(kernel.tbegin))
                        .fold(f64::INFINITY, f64::min);
                    t_stop = t_stop.min(pending).min(earliest_time(children));
                    break;
                }
                let lo = parent.t_day.max(kernel.tbegin);
                if t_stop <= lo {
                    continue;
                }
                let mean = kernel.expected(parent, t_stop, mag_min);
                if !mean.is_finite() {
                    return Err(Error::Numerical(format!(
                        "expected children {mean} for parent at t={} m={}",
                        parent.t_day, parent.mag
                    )));
                }
                let count = rng.poisson(mean);
                for _ in 0..count {
                    let dt = rng.omori_sample(kernel.p, kernel.c, lo - parent.t_day, t_stop - parent.t_day);
                    let t = parent.t_day + dt;
                    let mag = rng.gr_sample(kernel.b, mag_min, kernel.mag_top);
                    let k = productivity(kernel.a, kernel.alpha, kernel.mref, mag);
                    children.push(Rupture::child(t, mag, k, i as u32, parent));
                    if mag > kernel.mag_max_sim {
                        t_stop = t_stop.min(t);
                    }
                }
                size += count;
            }
            if size >= kernel.max_size && !children.is_empty() {
                t_stop = t_stop.min(earliest_time(children));
                storage.set_stop_time(t_stop.max(kernel.tbegin));
                return Ok(());
            }
            parent_gen += 1;
        }

        storage.set_stop_time(t_stop.max(kernel.tbegin));
        Ok(())
    }
}

fn earliest_time(ruptures: &[Rupture]) -> f64 {
    ruptures.iter().map(|r| r.t_day).fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use etas_common::CatalogRange;
    use etas_math::{inverse_branch_ratio, LN_10};

    fn params(n: f64) -> CatalogParams {
        let mut params = CatalogParams {
            p: 1.1,
            c: 0.01,
            b: 1.0,
            alpha: 1.0,
            mref: 3.0,
            msup: 9.5,
            range: CatalogRange {
                tbegin: 0.0,
                tend: 365.0,
                mag_min_sim: 3.0,
                mag_max_sim: 9.5,
                ..CatalogRange::default()
            },
            ..CatalogParams::default()
        };
        params.a = inverse_branch_ratio(n, params.p, params.c, params.b, params.alpha, 3.0, 9.5, 365.0);
        params
    }

    fn seeded(params: &CatalogParams, mag: f64) -> CatalogStorage {
        let mut storage = CatalogStorage::new(params);
        storage.begin_generation(GenerationInfo::new(3.0, 9.5));
        let k = productivity(params.a, params.alpha, params.mref, mag);
        storage.push_rupture(Rupture::seed(0.0, mag, k)).unwrap();
        storage
    }

    #[test]
    fn children_respect_time_and_magnitude_bounds() {
        let params = params(0.5);
        let mut rng = RandomStream::new(5);
        for i in 0..50 {
            rng.reseed_for_catalog(i);
            let mut storage = seeded(&params, 6.0);
            CatalogGenerator::new()
                .generate_all_generations(&mut storage, &mut rng)
                .unwrap();
            for g in 1..storage.generation_count() {
                let info = storage.generation_info(g);
                for j in 0..storage.generation_size(g) {
                    let r = storage.rupture(g, j);
                    assert!(r.t_day >= 0.0 && r.t_day <= 365.0);
                    assert!(r.mag >= info.gen_mag_min && r.mag <= info.gen_mag_max);
                    let parent = storage.rupture(g - 1, r.parent.unwrap() as usize);
                    assert!(r.t_day >= parent.t_day);
                }
            }
            assert_eq!(storage.stop_time(), 365.0);
        }
    }

    #[test]
    fn direct_child_count_matches_expectation() {
        let params = params(0.5);
        let mut rng = RandomStream::new(17);
        let catalogs = 400;
        let mut total = 0usize;
        for i in 0..catalogs {
            rng.reseed_for_catalog(i);
            let mut storage = seeded(&params, 6.0);
            CatalogGenerator::new()
                .generate_all_generations(&mut storage, &mut rng)
                .unwrap();
            total += storage.generation_size(1);
        }
        let k = productivity(params.a, params.alpha, params.mref, 6.0);
        let expected = expected_children(k, 1.1, 0.01, 1.0, 3.0, 0.0, 0.0, 365.0, 3.0, 9.5);
        let observed = total as f64 / catalogs as f64;
        assert!(
            (observed - expected).abs() < 0.1 * expected,
            "{observed} vs {expected}"
        );
    }

    #[test]
    fn generation_cap_lowers_stop_time() {
        let mut params = params(0.9);
        params.max_generations = 2;
        let mut rng = RandomStream::new(1);
        let mut storage = seeded(&params, 7.0);
        CatalogGenerator::new()
            .generate_all_generations(&mut storage, &mut rng)
            .unwrap();
        assert_eq!(storage.generation_count(), 2);
        let first_child = earliest_time(storage.generation(1));
        assert_eq!(storage.stop_time(), first_child.max(0.0));
    }

    #[test]
    fn size_cap_stops_expansion() {
        let mut params = params(0.9);
        params.max_catalog_size = 50;
        let mut rng = RandomStream::new(2);
        let mut storage = seeded(&params, 7.5);
        CatalogGenerator::new()
            .generate_all_generations(&mut storage, &mut rng)
            .unwrap();
        assert!(storage.stop_time() < 365.0);
        assert!(storage.stop_time() >= 0.0);
    }

    #[test]
    fn gen_size_adjustment_raises_magnitude() {
        let mut params = params(0.5);
        params.range.mag_adjust = MagAdjust::GenSize;
        params.range.gen_size_target = 10;
        params.range.mag_min_hi = 5.0;
        let kernel = Kernel::new(&params);
        let k = productivity(params.a, params.alpha, params.mref, 7.0);
        let parents = [Rupture::seed(0.0, 7.0, k)];
        let mag = kernel.generation_mag_min(&parents, 365.0).unwrap();
        assert!(mag > 3.0 && mag <= 5.0);
        let expected = kernel.expected(&parents[0], 365.0, 3.0);
        if mag < 5.0 {
            // The adjusted band holds the target: E · 10^-(b Δm) == target.
            let scaled = expected * (-(mag - 3.0) * LN_10).exp();
            assert!((scaled - 10.0).abs() < 0.5, "{scaled}");
        }
    }

    #[test]
    fn excess_magnitude_truncates_catalog() {
        let mut params = params(0.5);
        params.range.mag_max_sim = 5.0;
        params.range.mag_max_lo = 4.0;
        params.range.mag_excess = 2.0;
        let mut rng = RandomStream::new(4);
        let mut truncated = 0;
        for i in 0..100 {
            rng.reseed_for_catalog(i);
            let mut storage = seeded(&params, 7.0);
            CatalogGenerator::new()
                .generate_all_generations(&mut storage, &mut rng)
                .unwrap();
            if storage.stop_time() < 365.0 {
                truncated += 1;
                let stop = storage.stop_time();
                let big = (1..storage.generation_count())
                    .flat_map(|g| storage.generation(g).iter())
                    .any(|r| r.mag > 5.0 && r.t_day == stop);
                assert!(big);
            }
        }
        assert!(truncated > 0);
    }
}
