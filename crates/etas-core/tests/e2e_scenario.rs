//! End-to-end ensemble scenario: one M6 mainshock, 10,000 catalogs,
//! 366 one-day bins starting at t = 1.

use etas_core::accum::SimRangingAccumulator;
use etas_core::ensemble::EnsembleOutcome;
use etas_core::test_utils::{mainshock, run_ensemble};

const PERCENTILES: [f64; 7] = [0.0, 0.05, 0.25, 0.50, 0.75, 0.95, 1.0];

#[test]
fn mainshock_year_ensemble() {
    let mut init = mainshock(6.0, 0.5, 1.0, 367.0);
    let time_values: Vec<f64> = (0..=366).map(|d| 1.0 + d as f64).collect();
    let mut acc = SimRangingAccumulator::new(time_values).unwrap();

    let result = run_ensemble(&mut init, 10_000, 0, 20_240_101, &mut [&mut acc]).unwrap();
    assert_eq!(result.outcome, EnsembleOutcome::Completed);
    assert_eq!(acc.get_size(), 10_000);
    assert_eq!(acc.bins(), 366);

    assert!(acc.get_bin_fractile(0, 1.0) >= acc.get_bin_fractile(0, 0.0));

    for &f in &PERCENTILES {
        let mut prev = 0;
        for bin in 0..acc.bins() {
            let value = acc.get_bin_fractile(bin, f);
            assert!(
                value >= prev,
                "fractile {f} decreased at bin {bin}: {prev} -> {value}"
            );
            prev = value;
        }
    }

    for bin in [0, 30, 365] {
        let mut prev = 0;
        for &f in &PERCENTILES {
            let value = acc.get_bin_fractile(bin, f);
            assert!(value >= prev, "bin {bin} not monotone in fractile at {f}");
            prev = value;
        }
    }

    // A year of aftershocks of an M6 at n = 0.5 is essentially never empty.
    assert!(acc.get_bin_fractile(365, 0.5) > 0);
}
