//! Seed sources: the initializer shared by all workers and the per-worker
//! seeder that writes generation 0 of each catalog.

use std::collections::BTreeMap;

use etas_common::{CatalogParams, CatalogRange, Error, GenerationInfo, Result, Rupture};
use etas_math::{branch_ratio, productivity};
use serde_json::Value;

use super::catalog::CatalogStorage;
use crate::random::RandomStream;

/// Writes the seed generation of a catalog. One per worker.
pub trait Seeder {
    fn open(&mut self) -> Result<()>;

    /// Reset `storage` for a new catalog and fill generation 0.
    fn seed_catalog(&mut self, storage: &mut CatalogStorage, rng: &mut RandomStream) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Source of seeds and of the simulation range.
///
/// `make_seeder` is called concurrently from every worker.
pub trait Initializer: Send + Sync {
    fn begin_initialization(&mut self) -> Result<()>;

    fn end_initialization(&mut self) -> Result<()>;

    fn make_seeder(&self) -> Box<dyn Seeder + Send>;

    fn has_mainshock_mag(&self) -> bool;

    /// Magnitude of the largest seed.
    fn get_mainshock_mag(&self) -> Option<f64>;

    /// Range the next ensemble will use.
    fn get_range(&self) -> CatalogRange;

    /// Range as originally configured, before any ranging.
    fn get_initial_range(&self) -> CatalogRange;

    fn set_range(&mut self, range: &CatalogRange) -> Result<()>;

    fn get_b_value(&self) -> f64;

    /// Parameters worth showing next to a forecast.
    fn get_display_params(&self, map: &mut BTreeMap<String, Value>);
}

/// Fixed parameters and a fixed list of seed ruptures.
#[derive(Debug, Clone)]
pub struct FixedInitializer {
    params: CatalogParams,
    initial_range: CatalogRange,
    /// `(t_day, mag)` per seed.
    seeds: Vec<(f64, f64)>,
    tint: f64,
    active: bool,
}

impl FixedInitializer {
    pub fn new(params: CatalogParams, seeds: Vec<(f64, f64)>) -> Self {
        Self {
            initial_range: params.range.clone(),
            params,
            seeds,
            tint: 365.0,
            active: false,
        }
    }

    /// One mainshock of magnitude `mag` at `t_day`.
    pub fn single_mainshock(params: CatalogParams, t_day: f64, mag: f64) -> Self {
        Self::new(params, vec![(t_day, mag)])
    }

    /// Branch-ratio window reported by `get_display_params`.
    pub fn with_tint(mut self, tint: f64) -> Self {
        self.tint = tint;
        self
    }

    pub fn params(&self) -> &CatalogParams {
        &self.params
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Initializer for FixedInitializer {
    fn begin_initialization(&mut self) -> Result<()> {
        self.params.validate()?;
        if self.seeds.is_empty() {
            return Err(Error::invalid("seeds", "at least one seed rupture is required"));
        }
        self.active = true;
        Ok(())
    }

    fn end_initialization(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn make_seeder(&self) -> Box<dyn Seeder + Send> {
        let seeds = self
            .seeds
            .iter()
            .map(|&(t, m)| {
                let k = productivity(self.params.a, self.params.alpha, self.params.mref, m);
                Rupture::seed(t, m, k)
            })
            .collect();
        Box::new(FixedSeeder {
            params: self.params.clone(),
            seeds,
            open: false,
        })
    }

    fn has_mainshock_mag(&self) -> bool {
        !self.seeds.is_empty()
    }

    fn get_mainshock_mag(&self) -> Option<f64> {
        self.seeds.iter().map(|&(_, m)| m).reduce(f64::max)
    }

    fn get_range(&self) -> CatalogRange {
        self.params.range.clone()
    }

    fn get_initial_range(&self) -> CatalogRange {
        self.initial_range.clone()
    }

    fn set_range(&mut self, range: &CatalogRange) -> Result<()> {
        range.validate()?;
        self.params.range = range.clone();
        Ok(())
    }

    fn get_b_value(&self) -> f64 {
        self.params.b
    }

    fn get_display_params(&self, map: &mut BTreeMap<String, Value>) {
        let p = &self.params;
        map.insert("a".to_string(), Value::from(p.a));
        map.insert("p".to_string(), Value::from(p.p));
        map.insert("c".to_string(), Value::from(p.c));
        map.insert("b".to_string(), Value::from(p.b));
        map.insert("alpha".to_string(), Value::from(p.alpha));
        map.insert("mref".to_string(), Value::from(p.mref));
        map.insert("msup".to_string(), Value::from(p.msup));
        let n = branch_ratio(p.a, p.p, p.c, p.b, p.alpha, p.mref, p.msup, self.tint);
        map.insert("branch_ratio".to_string(), Value::from(n));
        if let Some(mag) = self.get_mainshock_mag() {
            map.insert("mainshock_mag".to_string(), Value::from(mag));
        }
        map.insert("seed_count".to_string(), Value::from(self.seeds.len()));
    }
}

struct FixedSeeder {
    params: CatalogParams,
    seeds: Vec<Rupture>,
    open: bool,
}

impl Seeder for FixedSeeder {
    fn open(&mut self) -> Result<()> {
        if self.open {
            return Err(Error::ConsumerState("seeder is already open".to_string()));
        }
        self.open = true;
        Ok(())
    }

    fn seed_catalog(&mut self, storage: &mut CatalogStorage, _rng: &mut RandomStream) -> Result<()> {
        if !self.open {
            return Err(Error::ConsumerState("seeder used while closed".to_string()));
        }
        storage.clear(&self.params);
        let range = &self.params.range;
        storage.begin_generation(GenerationInfo::new(range.mag_min_sim, range.mag_max_sim));
        for seed in &self.seeds {
            storage.push_rupture(*seed)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CatalogView;

    #[test]
    fn seeder_writes_generation_zero() {
        let init = FixedInitializer::new(CatalogParams::default(), vec![(0.0, 6.0), (1.0, 5.0)]);
        let mut seeder = init.make_seeder();
        let mut storage = CatalogStorage::new(init.params());
        let mut rng = RandomStream::new(0);
        assert!(seeder.seed_catalog(&mut storage, &mut rng).is_err());

        seeder.open().unwrap();
        seeder.seed_catalog(&mut storage, &mut rng).unwrap();
        assert_eq!(storage.generation_count(), 1);
        assert_eq!(storage.generation_size(0), 2);
        let main = storage.rupture(0, 0);
        assert!(main.is_seed());
        let p = init.params();
        assert_eq!(main.k_prod, productivity(p.a, p.alpha, p.mref, 6.0));
        seeder.close().unwrap();
    }

    #[test]
    fn mainshock_is_largest_seed() {
        let init = FixedInitializer::new(CatalogParams::default(), vec![(0.0, 5.0), (2.0, 6.5)]);
        assert!(init.has_mainshock_mag());
        assert_eq!(init.get_mainshock_mag(), Some(6.5));
    }

    #[test]
    fn set_range_validates() {
        let mut init = FixedInitializer::single_mainshock(CatalogParams::default(), 0.0, 6.0);
        let mut range = init.get_range();
        range.mag_min_sim = 4.0;
        init.set_range(&range).unwrap();
        assert_eq!(init.get_range().mag_min_sim, 4.0);
        assert_eq!(init.get_initial_range().mag_min_sim, 3.0);

        range.mag_min_sim = 100.0;
        assert!(init.set_range(&range).is_err());
        assert_eq!(init.get_range().mag_min_sim, 4.0);
    }

    #[test]
    fn begin_rejects_missing_seeds() {
        let mut init = FixedInitializer::new(CatalogParams::default(), Vec::new());
        assert!(init.begin_initialization().is_err());
    }

    #[test]
    fn display_params_include_branch_ratio() {
        let init = FixedInitializer::single_mainshock(CatalogParams::default(), 0.0, 6.0);
        let mut map = BTreeMap::new();
        init.get_display_params(&mut map);
        assert!(map["branch_ratio"].as_f64().unwrap() > 0.0);
        assert_eq!(map["mainshock_mag"], Value::from(6.0));
    }
}
