//! Single-catalog ETAS engine.
//!
//! A [`Seeder`] writes the seed generation into a worker's
//! [`CatalogStorage`], then [`CatalogGenerator`] expands it one generation
//! at a time. Consumers only ever see the result through [`CatalogView`].

pub mod catalog;
pub mod generator;
pub mod seed;

pub use catalog::{CatalogStorage, CatalogView};
pub use generator::CatalogGenerator;
pub use seed::{FixedInitializer, Initializer, Seeder};
