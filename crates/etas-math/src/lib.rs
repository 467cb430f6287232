//! ETAS rate integrals and distribution kernels.

pub mod math;

pub use math::branching::*;
pub use math::gamma::{gamma_p, gamma_q};
pub use math::gutenberg::*;
pub use math::omori::*;
pub use math::poisson::*;
pub use math::stable::*;
