//! Criterion benchmarks for the catalog hot paths.
//!
//! Covers the Omori and G-R kernels used per rupture, the branch-ratio
//! inversion used at config load, and a small end-to-end ensemble at one
//! and several workers.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use etas_common::CatalogParams;
use etas_core::accum::{SimRangingAccumulator, TimeMagAccumulator};
use etas_core::engine::FixedInitializer;
use etas_core::ensemble::{EnsembleGenerator, EnsembleOptions};
use etas_math::{
    gr_sample_inverse, inverse_branch_ratio, omori_inverse, omori_rate, poisson_quantile,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn params(tend: f64) -> CatalogParams {
    let mut params = CatalogParams {
        p: 1.1,
        c: 0.01,
        b: 1.0,
        alpha: 1.0,
        mref: 3.0,
        msup: 9.5,
        ..CatalogParams::default()
    };
    params.a = inverse_branch_ratio(0.5, params.p, params.c, params.b, params.alpha, params.mref, params.msup, 365.0);
    params.range.tend = tend;
    params
}

// ── Kernels ──────────────────────────────────────────────────────────

fn bench_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernels");

    for p in [0.9, 1.0, 1.1] {
        group.bench_with_input(BenchmarkId::new("omori_rate", p), &p, |b, &p| {
            b.iter(|| omori_rate(black_box(p), black_box(0.01), black_box(0.5), black_box(365.0)))
        });
        group.bench_with_input(BenchmarkId::new("omori_inverse", p), &p, |b, &p| {
            b.iter(|| omori_inverse(black_box(p), black_box(0.01), black_box(0.5), black_box(3.0)))
        });
    }

    group.bench_function("gr_sample_inverse", |b| {
        b.iter(|| gr_sample_inverse(black_box(1.0), black_box(3.0), black_box(9.5), black_box(0.37)))
    });
    group.bench_function("poisson_quantile", |b| {
        b.iter(|| poisson_quantile(black_box(0.6), black_box(42.0)))
    });
    group.bench_function("inverse_branch_ratio", |b| {
        b.iter(|| {
            inverse_branch_ratio(
                black_box(0.5),
                1.1,
                0.01,
                1.0,
                1.0,
                3.0,
                9.5,
                365.0,
            )
        })
    });

    group.finish();
}

// ── Ensemble ─────────────────────────────────────────────────────────

fn bench_ensemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("ensemble/m6_30d");
    group.sample_size(10);

    for threads in [1usize, 4] {
        group.bench_with_input(BenchmarkId::new("catalogs_200", threads), &threads, |b, &threads| {
            b.iter(|| {
                let mut init = FixedInitializer::single_mainshock(params(30.0), 0.0, 6.0);
                let mut ranging =
                    SimRangingAccumulator::new(SimRangingAccumulator::uniform_bins(0.0, 30.0, 30))
                        .unwrap();
                let mut forecast =
                    TimeMagAccumulator::new(vec![0.0, 1.0, 7.0, 30.0], vec![3.0, 4.0, 5.0, 6.0])
                        .unwrap();
                let options = EnsembleOptions::new(200)
                    .with_threads(threads)
                    .with_seed(Some(7));
                let result = EnsembleGenerator::new(options)
                    .run(&mut init, &mut [&mut ranging, &mut forecast], None)
                    .unwrap();
                black_box(result.completed)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_kernels, bench_ensemble);
criterion_main!(benches);
