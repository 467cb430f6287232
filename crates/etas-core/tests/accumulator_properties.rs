//! Accumulator invariants exercised through the public scan protocol.

use etas_common::{CatalogParams, Error, GenerationInfo, Rupture};
use etas_core::accum::{
    Accumulator, CatalogScanner, ForecastQuery, SimRangingAccumulator, TimeMagAccumulator,
};
use etas_core::engine::{CatalogStorage, CatalogView};
use proptest::prelude::*;

/// One M6 seed at t = 0 plus first-generation children, stopping at `stop`.
fn catalog(children: &[(f64, f64)], stop: f64) -> CatalogStorage {
    let mut params = CatalogParams::default();
    params.range.tend = 200.0;
    let mut storage = CatalogStorage::new(&params);
    storage.begin_generation(GenerationInfo::new(3.0, 9.5));
    storage.push_rupture(Rupture::seed(0.0, 6.0, 1.0)).unwrap();
    storage.begin_generation(GenerationInfo::new(3.0, 9.5));
    let seed = *storage.rupture(0, 0);
    for &(t, m) in children {
        storage.push_rupture(Rupture::child(t, m, 0.1, 0, &seed)).unwrap();
    }
    storage.set_stop_time(stop);
    storage
}

/// Stream `catalogs` into `acc`, numbering them from `first_index`.
fn scan_catalogs(acc: &dyn Accumulator, catalogs: &[CatalogStorage], first_index: u64) -> Result<(), Error> {
    let mut scanner = CatalogScanner::new(&[acc]);
    scanner.open()?;
    let mut outcome = Ok(());
    for (i, view) in catalogs.iter().enumerate() {
        outcome = scanner.scan(view, first_index + i as u64);
        if outcome.is_err() {
            break;
        }
    }
    scanner.close()?;
    outcome
}

fn scan_all(acc: &mut dyn Accumulator, catalogs: &[CatalogStorage]) -> Result<(), Error> {
    let result = scan_catalogs(acc, catalogs, 0);
    acc.end_accumulation()?;
    result
}

mod capacity {
    use super::*;

    #[test]
    fn scanning_past_capacity_fails_deterministically() {
        let mut acc = TimeMagAccumulator::new(vec![0.0, 10.0], vec![3.0]).unwrap();
        acc.begin_accumulation(2).unwrap();
        let catalogs: Vec<_> = (0..3).map(|_| catalog(&[(1.0, 4.0)], 200.0)).collect();

        match scan_all(&mut acc, &catalogs) {
            Err(Error::CapacityExceeded {
                capacity,
                attempted,
            }) => {
                assert_eq!(capacity, 2);
                assert_eq!(attempted, 3);
            }
            other => panic!("expected capacity error, got {other:?}"),
        }
        // The two accepted catalogs are intact.
        assert_eq!(acc.get_size(), 2);
        assert_eq!(acc.get_fractile(0, 0, 1.0), 1);
    }

    #[test]
    fn increase_capacity_keeps_existing_catalogs() {
        let mut acc = SimRangingAccumulator::new(vec![0.0, 5.0, 10.0]).unwrap();
        acc.begin_accumulation(1).unwrap();
        scan_catalogs(&acc, &[catalog(&[(1.0, 4.0), (6.0, 3.5)], 200.0)], 0).unwrap();
        assert!(matches!(
            scan_catalogs(&acc, &[catalog(&[(2.0, 3.0)], 200.0)], 1),
            Err(Error::CapacityExceeded { .. })
        ));

        acc.increase_capacity(3).unwrap();
        scan_catalogs(&acc, &[catalog(&[(2.0, 3.0)], 200.0)], 1).unwrap();
        acc.end_accumulation().unwrap();

        assert_eq!(acc.get_size(), 2);
        assert_eq!(acc.get_bin_fractile(1, 1.0), 2);
        assert_eq!(acc.get_bin_fractile(1, 0.0), 1);
    }
}

mod protocol {
    use super::*;
    use etas_core::accum::ScanContext;

    #[test]
    fn begin_on_closed_consumer_is_rejected() {
        let acc = TimeMagAccumulator::new(vec![0.0, 10.0], vec![3.0]).unwrap();
        let view = catalog(&[], 200.0);
        let ctx = ScanContext {
            view: &view,
            catalog_index: 0,
        };
        let mut consumer = acc.make_consumer();
        assert!(matches!(
            consumer.begin_catalog(&ctx),
            Err(Error::ConsumerState(_))
        ));
        consumer.open().unwrap();
        consumer.begin_catalog(&ctx).unwrap();
        assert!(matches!(
            consumer.begin_catalog(&ctx),
            Err(Error::ConsumerState(_))
        ));
    }

    #[test]
    fn reopening_an_open_consumer_is_rejected() {
        let acc = TimeMagAccumulator::new(vec![0.0, 10.0], vec![3.0]).unwrap();
        let mut consumer = acc.make_consumer();
        consumer.open().unwrap();
        assert!(matches!(consumer.open(), Err(Error::ConsumerState(_))));
        consumer.close().unwrap();
        assert!(!consumer.is_open());
    }

    #[test]
    fn unsupported_exceedance_count_is_rejected() {
        let mut acc = TimeMagAccumulator::new(vec![0.0, 10.0], vec![3.0]).unwrap();
        acc.begin_accumulation(0).unwrap();
        acc.end_accumulation().unwrap();
        assert!(acc.get_prob_occur_array(0).is_ok());
        assert!(matches!(
            acc.get_prob_occur_array(1),
            Err(Error::InvalidParameter { .. })
        ));
    }
}

mod survival {
    use super::*;

    #[test]
    fn one_stop_per_bin_survives_ten_bins_at_ten_percent() {
        let time_values: Vec<f64> = (0..=100).map(f64::from).collect();
        let mut acc = SimRangingAccumulator::new(time_values).unwrap();
        acc.begin_accumulation(100).unwrap();
        let catalogs: Vec<_> = (0..100)
            .map(|k| catalog(&[(0.25, 3.0)], k as f64 + 0.5))
            .collect();
        scan_all(&mut acc, &catalogs).unwrap();

        assert_eq!(acc.get_size(), 100);
        assert_eq!(acc.get_survival_bins(0.10), 10);
        assert_eq!(acc.get_survival_bins(0.0), 0);
        assert_eq!(acc.get_survival_bins(1.0), 100);
    }

    #[test]
    fn complete_catalogs_survive_every_bin() {
        let mut acc = SimRangingAccumulator::new(vec![0.0, 1.0, 2.0]).unwrap();
        acc.begin_accumulation(3).unwrap();
        let catalogs: Vec<_> = (0..3).map(|_| catalog(&[(0.5, 3.0)], 200.0)).collect();
        scan_all(&mut acc, &catalogs).unwrap();
        assert_eq!(acc.get_survival_bins(0.0), 2);
    }
}

fn children_strategy() -> impl Strategy<Value = Vec<Vec<(f64, f64)>>> {
    prop::collection::vec(
        prop::collection::vec((0.0f64..50.0, 3.0f64..7.0), 0..40),
        1..25,
    )
}

proptest! {
    #[test]
    fn bin_fractiles_are_monotone(catalogs in children_strategy(), f1 in 0.0f64..=1.0, f2 in 0.0f64..=1.0) {
        let (lo, hi) = if f1 <= f2 { (f1, f2) } else { (f2, f1) };
        let views: Vec<_> = catalogs.iter().map(|c| catalog(c, 200.0)).collect();
        let mut acc = SimRangingAccumulator::new(vec![0.0, 1.0, 5.0, 20.0, 50.0]).unwrap();
        acc.begin_accumulation(views.len()).unwrap();
        scan_all(&mut acc, &views).unwrap();

        let totals: Vec<u64> = catalogs.iter().map(|c| c.len() as u64).collect();
        for bin in 0..acc.bins() {
            prop_assert!(acc.get_bin_fractile(bin, lo) <= acc.get_bin_fractile(bin, hi));
            if bin > 0 {
                prop_assert!(acc.get_bin_fractile(bin - 1, hi) <= acc.get_bin_fractile(bin, hi));
            }
        }
        let last = acc.bins() - 1;
        prop_assert_eq!(acc.get_bin_fractile(last, 0.0), *totals.iter().min().unwrap());
        prop_assert_eq!(acc.get_bin_fractile(last, 1.0), *totals.iter().max().unwrap());
    }

    #[test]
    fn forecast_cells_are_cumulative(catalogs in children_strategy()) {
        let views: Vec<_> = catalogs.iter().map(|c| catalog(c, 200.0)).collect();
        let mut acc = TimeMagAccumulator::new(vec![0.0, 2.0, 10.0, 50.0], vec![3.0, 4.5, 6.0]).unwrap();
        acc.begin_accumulation(views.len()).unwrap();
        scan_all(&mut acc, &views).unwrap();

        for f in [0.0, 0.5, 1.0] {
            let table = acc.get_fractile_array(f);
            for t in 0..table.len() {
                for m in 0..table[t].len() {
                    if t > 0 {
                        prop_assert!(table[t - 1][m] <= table[t][m]);
                    }
                    if m > 0 {
                        prop_assert!(table[t][m - 1] >= table[t][m]);
                    }
                }
            }
        }
        let probs = acc.get_prob_occur_array(0).unwrap();
        for row in probs {
            for p in row {
                prop_assert!((0.0..=1.0).contains(&p));
            }
        }
    }
}
