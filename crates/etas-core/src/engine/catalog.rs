//! Catalog storage and the read-only view consumers scan.

use etas_common::{CatalogParams, Error, GenerationInfo, Result, Rupture};

/// Read-only access to one finished catalog.
///
/// Generation 0 holds the seeds; generation `g + 1` holds the direct
/// children of generation `g`.
pub trait CatalogView {
    /// Parameters the catalog was generated with.
    fn params(&self) -> &CatalogParams;

    fn generation_count(&self) -> usize;

    fn generation_size(&self, generation: usize) -> usize;

    fn generation_info(&self, generation: usize) -> GenerationInfo;

    /// Panics if `generation` or `index` is out of range.
    fn rupture(&self, generation: usize, index: usize) -> &Rupture;

    /// Time after which the catalog is incomplete. Equal to `tend` unless
    /// expansion was cut short or a rupture exceeded `mag_max_sim`.
    fn stop_time(&self) -> f64;

    /// Ruptures across all generations, seeds included.
    fn total_size(&self) -> u64 {
        (0..self.generation_count())
            .map(|g| self.generation_size(g) as u64)
            .sum()
    }
}

/// Reusable generation buffers for one worker.
///
/// `clear` keeps every allocated buffer, so after the first few catalogs a
/// worker generates without allocating.
#[derive(Debug, Clone)]
pub struct CatalogStorage {
    params: CatalogParams,
    generations: Vec<Vec<Rupture>>,
    infos: Vec<GenerationInfo>,
    active: usize,
    stop_time: f64,
}

impl CatalogStorage {
    pub fn new(params: &CatalogParams) -> Self {
        Self {
            params: params.clone(),
            generations: Vec::new(),
            infos: Vec::new(),
            active: 0,
            stop_time: params.tend(),
        }
    }

    /// Forget the current catalog and adopt `params` for the next one.
    pub fn clear(&mut self, params: &CatalogParams) {
        self.params.clone_from(params);
        for generation in &mut self.generations[..self.active] {
            generation.clear();
        }
        self.infos.clear();
        self.active = 0;
        self.stop_time = params.tend();
    }

    /// Open a new, empty generation and return its index.
    pub fn begin_generation(&mut self, info: GenerationInfo) -> usize {
        if self.generations.len() == self.active {
            self.generations.push(Vec::new());
        }
        self.generations[self.active].clear();
        self.infos.push(info);
        self.active += 1;
        self.active - 1
    }

    /// Append a rupture to the newest generation.
    pub fn push_rupture(&mut self, rupture: Rupture) -> Result<()> {
        match self.active.checked_sub(1) {
            Some(last) => {
                self.generations[last].push(rupture);
                Ok(())
            }
            None => Err(Error::invalid(
                "generation",
                "rupture added before any generation was begun",
            )),
        }
    }

    pub fn generation(&self, generation: usize) -> &[Rupture] {
        &self.generations[..self.active][generation]
    }

    pub fn set_stop_time(&mut self, t: f64) {
        self.stop_time = t;
    }

    /// The parents in `parent_gen` alongside the buffer of the generation
    /// right after it, which must be the newest one.
    pub(crate) fn split_for_expansion(
        &mut self,
        parent_gen: usize,
    ) -> (&[Rupture], &mut Vec<Rupture>) {
        debug_assert_eq!(parent_gen + 2, self.active);
        let (head, tail) = self.generations.split_at_mut(parent_gen + 1);
        (&head[parent_gen], &mut tail[0])
    }
}

impl CatalogView for CatalogStorage {
    fn params(&self) -> &CatalogParams {
        &self.params
    }

    fn generation_count(&self) -> usize {
        self.active
    }

    fn generation_size(&self, generation: usize) -> usize {
        self.generation(generation).len()
    }

    fn generation_info(&self, generation: usize) -> GenerationInfo {
        self.infos[generation]
    }

    fn rupture(&self, generation: usize, index: usize) -> &Rupture {
        &self.generation(generation)[index]
    }

    fn stop_time(&self) -> f64 {
        self.stop_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_before_begin_is_rejected() {
        let mut storage = CatalogStorage::new(&CatalogParams::default());
        assert!(storage.push_rupture(Rupture::seed(0.0, 6.0, 1.0)).is_err());
    }

    #[test]
    fn clear_keeps_buffers_and_resets_state() {
        let params = CatalogParams::default();
        let mut storage = CatalogStorage::new(&params);
        storage.begin_generation(GenerationInfo::new(3.0, 9.5));
        storage.push_rupture(Rupture::seed(0.0, 6.0, 1.0)).unwrap();
        storage.begin_generation(GenerationInfo::new(3.0, 9.5));
        storage.push_rupture(Rupture::seed(1.0, 4.0, 1.0)).unwrap();
        storage.set_stop_time(2.0);
        assert_eq!(storage.total_size(), 2);

        storage.clear(&params);
        assert_eq!(storage.generation_count(), 0);
        assert_eq!(storage.total_size(), 0);
        assert_eq!(storage.stop_time(), params.tend());

        assert_eq!(storage.begin_generation(GenerationInfo::new(3.0, 9.5)), 0);
        assert_eq!(storage.generation_size(0), 0);
    }

    #[test]
    fn split_gives_parents_and_children() {
        let mut storage = CatalogStorage::new(&CatalogParams::default());
        storage.begin_generation(GenerationInfo::new(3.0, 9.5));
        storage.push_rupture(Rupture::seed(0.0, 6.0, 1.0)).unwrap();
        storage.begin_generation(GenerationInfo::new(3.0, 9.5));
        let (parents, children) = storage.split_for_expansion(0);
        children.push(Rupture::child(0.5, 3.5, 0.1, 0, &parents[0]));
        assert_eq!(storage.generation_size(1), 1);
        assert_eq!(storage.rupture(1, 0).parent, Some(0));
    }
}
