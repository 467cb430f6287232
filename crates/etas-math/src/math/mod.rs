//! Core math modules.

pub mod branching;
pub mod gamma;
pub mod gutenberg;
pub mod omori;
pub mod poisson;
pub mod stable;
