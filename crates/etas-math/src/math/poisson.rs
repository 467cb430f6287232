//! Poisson distribution helpers for stacked catalog-size distributions.

use super::gamma::{gamma_p, gamma_q};
use super::stable::log_factorial;

/// Smallest tail probability `poisson_upper_bound` resolves.
pub const MIN_TAIL: f64 = 1.0e-15;

/// `ln P(N = k)` for N ~ Poisson(mean).
pub fn poisson_log_pmf(k: u64, mean: f64) -> f64 {
    if mean.is_nan() || mean < 0.0 {
        return f64::NAN;
    }
    if mean == 0.0 {
        return if k == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    k as f64 * mean.ln() - mean - log_factorial(k)
}

/// `P(N = k)`.
pub fn poisson_pmf(k: u64, mean: f64) -> f64 {
    poisson_log_pmf(k, mean).exp()
}

/// `P(N <= k)` = Q(k + 1, mean).
pub fn poisson_cdf(k: u64, mean: f64) -> f64 {
    if mean.is_nan() || mean < 0.0 {
        return f64::NAN;
    }
    if mean == 0.0 {
        return 1.0;
    }
    gamma_q(k as f64 + 1.0, mean)
}

/// `P(N > k)` = P(k + 1, mean), accurate deep in the upper tail.
pub fn poisson_survival(k: u64, mean: f64) -> f64 {
    if mean.is_nan() || mean < 0.0 {
        return f64::NAN;
    }
    if mean == 0.0 {
        return 0.0;
    }
    gamma_p(k as f64 + 1.0, mean)
}

/// Smallest `k` with `P(N > k) <= tail`.
pub fn poisson_upper_bound(mean: f64, tail: f64) -> u64 {
    if mean.is_nan() || mean <= 0.0 {
        return 0;
    }
    let tail = tail.max(MIN_TAIL);
    let mut hi = (mean + 10.0 * mean.sqrt() + 10.0).ceil() as u64;
    while poisson_survival(hi, mean) > tail {
        hi = hi.saturating_mul(2);
    }
    let mut lo = 0u64;
    if poisson_survival(lo, mean) <= tail {
        return 0;
    }
    // invariant: survival(lo) > tail >= survival(hi)
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if poisson_survival(mid, mean) > tail {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    hi
}

/// Smallest `k` with `P(N <= k) >= fraction`.
pub fn poisson_quantile(fraction: f64, mean: f64) -> u64 {
    if mean.is_nan() || mean <= 0.0 || fraction.is_nan() || fraction <= 0.0 {
        return 0;
    }
    let hi_bound = poisson_upper_bound(mean, 1.0 - fraction.min(1.0));
    if poisson_cdf(0, mean) >= fraction {
        return 0;
    }
    let (mut lo, mut hi) = (0u64, hi_bound);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if poisson_cdf(mid, mean) >= fraction {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn pmf_sums_to_cdf() {
        let mean = 3.7;
        let mut acc = 0.0;
        for k in 0..=12 {
            acc += poisson_pmf(k, mean);
            assert!(approx_eq(acc, poisson_cdf(k, mean), 1e-12), "k={k}");
        }
    }

    #[test]
    fn cdf_and_survival_complement() {
        for (k, mean) in [(0u64, 0.5), (10, 10.0), (500, 480.0)] {
            let s = poisson_cdf(k, mean) + poisson_survival(k, mean);
            assert!(approx_eq(s, 1.0, 1e-12));
        }
    }

    #[test]
    fn zero_mean_is_point_mass() {
        assert_eq!(poisson_log_pmf(0, 0.0), 0.0);
        assert_eq!(poisson_log_pmf(3, 0.0), f64::NEG_INFINITY);
        assert_eq!(poisson_cdf(0, 0.0), 1.0);
        assert_eq!(poisson_quantile(0.99, 0.0), 0);
    }

    #[test]
    fn quantile_brackets_fraction() {
        for mean in [0.3, 4.0, 75.0, 2500.0] {
            for f in [0.05, 0.5, 0.95] {
                let k = poisson_quantile(f, mean);
                assert!(poisson_cdf(k, mean) >= f, "mean={mean} f={f} k={k}");
                if k > 0 {
                    assert!(poisson_cdf(k - 1, mean) < f);
                }
            }
        }
    }

    #[test]
    fn median_near_mean_for_large_mean() {
        let k = poisson_quantile(0.5, 10_000.0);
        assert!((9_990..=10_010).contains(&k), "k={k}");
    }

    #[test]
    fn upper_bound_meets_tail() {
        let mean = 42.0;
        let hi = poisson_upper_bound(mean, 1e-9);
        assert!(poisson_survival(hi, mean) <= 1e-9);
        assert!(poisson_survival(hi - 1, mean) > 1e-9);
    }
}
