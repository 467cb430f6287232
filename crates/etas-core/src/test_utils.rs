//! Test utilities for etas-core.
//!
//! This module provides:
//! - Common assertions
//! - Fixed-parameter initializers for small ensembles
//! - A one-call ensemble runner

use etas_common::{CatalogParams, Result};
use etas_math::inverse_branch_ratio;

use crate::accum::Accumulator;
use crate::engine::FixedInitializer;
use crate::ensemble::{EnsembleGenerator, EnsembleOptions, EnsembleResult};

/// Assert that two floating point numbers are approximately equal.
#[macro_export]
macro_rules! assert_approx_eq {
    ($a:expr, $b:expr) => {
        $crate::assert_approx_eq!($a, $b, 1e-6_f64)
    };
    ($a:expr, $b:expr, $epsilon:expr) => {{
        let a: f64 = $a;
        let b: f64 = $b;
        let eps: f64 = $epsilon;
        let diff = (a - b).abs();
        if diff > eps {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{}`\n right: `{}`\n  diff: `{}` > `{}`",
                a, b, diff, eps
            );
        }
    }};
}

/// Model parameters used across tests: p 1.1, c 0.01, b 1, alpha 1, and
/// productivity chosen for branch ratio `n` over [3, 9.5] and 365 days.
pub fn scenario_params(n: f64, tbegin: f64, tend: f64) -> CatalogParams {
    let mut params = CatalogParams {
        p: 1.1,
        c: 0.01,
        b: 1.0,
        alpha: 1.0,
        mref: 3.0,
        msup: 9.5,
        ..CatalogParams::default()
    };
    params.a = inverse_branch_ratio(n, params.p, params.c, params.b, params.alpha, params.mref, params.msup, 365.0);
    params.range.tbegin = tbegin;
    params.range.tend = tend;
    params
}

/// One mainshock at t = 0.
pub fn mainshock(mag: f64, n: f64, tbegin: f64, tend: f64) -> FixedInitializer {
    FixedInitializer::single_mainshock(scenario_params(n, tbegin, tend), 0.0, mag)
}

/// Run `num_catalogs` catalogs with a fixed seed.
pub fn run_ensemble(
    init: &mut FixedInitializer,
    num_catalogs: u64,
    threads: usize,
    seed: u64,
    accumulators: &mut [&mut dyn Accumulator],
) -> Result<EnsembleResult> {
    let options = EnsembleOptions::new(num_catalogs)
        .with_threads(threads)
        .with_seed(Some(seed));
    EnsembleGenerator::new(options).run(init, accumulators, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Initializer;
    use etas_math::branch_ratio;

    #[test]
    fn test_scenario_params_branch_ratio() {
        let p = scenario_params(0.5, 1.0, 367.0);
        assert_approx_eq!(
            branch_ratio(p.a, p.p, p.c, p.b, p.alpha, p.mref, p.msup, 365.0),
            0.5,
            1e-9
        );
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_mainshock_initializer() {
        let init = mainshock(6.0, 0.5, 0.0, 30.0);
        assert_eq!(init.get_mainshock_mag(), Some(6.0));
        assert_eq!(init.get_range().tend, 30.0);
    }
}
