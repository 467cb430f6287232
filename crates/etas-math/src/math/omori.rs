//! Omori-law rate integrals.
//!
//! The modified Omori law gives the aftershock rate a time `t` after the
//! parent as `(t + c)^(-p)`. Every integral here is written so that it stays
//! accurate when the window is tiny relative to `t + c` and when `p` sits on
//! one of the analytic singularities (p = 1 for the single integral, p = 1
//! and p = 2 for the double integral).
//!
//! # Single integral
//!
//! ```text
//! ∫_{t1}^{t2} (t + c)^(-p) dt = u1^(1-p) · L · φ((1-p)L)
//! u1 = t1 + c,  L = ln1p((t2 - t1) / u1),  φ(x) = expm1(x) / x
//! ```
//!
//! # Double integral
//!
//! For a source spread uniformly over [s1, s2] and a target window
//! [t1, t2] with s2 <= t1, the double integral is a single integral over
//! the lag `τ = t - s` against the trapezoid-shaped overlap weight. The two
//! ramps reduce to `∫_0^r y (1 ± y)^(-p) dy`, evaluated by power series for
//! small `r` and by a difference of φ terms otherwise.

use serde::{Deserialize, Serialize};

use super::stable::{expm1_ratio, log1p_ratio};

/// Switch points between the closed forms and their approximations.
///
/// These are tuned constants, not load-bearing values; the property tests
/// check the results against direct quadrature for any setting in the
/// documented ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OmoriTolerance {
    /// Relative window width `(t2 - t1) / (t1 + c)` below which the
    /// midpoint rule is used. The midpoint error is about
    /// `p(p+1)/24 · r²`, so 1e-8 keeps it under 1e-15.
    pub midpoint_rel: f64,
    /// Relative ramp width below which the double-integral ramps use a
    /// power series instead of the closed form.
    pub series_rel: f64,
}

impl Default for OmoriTolerance {
    fn default() -> Self {
        Self {
            midpoint_rel: 1.0e-8,
            series_rel: 0.1,
        }
    }
}

const SERIES_MAX_TERMS: usize = 80;
const SERIES_EPS: f64 = 1.0e-17;

/// Omori density `(t + c)^(-p)`.
pub fn omori_density(p: f64, c: f64, t: f64) -> f64 {
    if p.is_nan() || c.is_nan() || t.is_nan() || c <= 0.0 || t + c <= 0.0 {
        return f64::NAN;
    }
    (t + c).powf(-p)
}

/// Expected count factor `∫_{t1}^{t2} (t + c)^(-p) dt`.
///
/// Returns 0 for an empty or reversed window, and NaN for `c <= 0` or a
/// window starting at or before `-c`. `t2 = +inf` is allowed and is finite
/// only for `p > 1`.
pub fn omori_rate(p: f64, c: f64, t1: f64, t2: f64) -> f64 {
    omori_rate_with(&OmoriTolerance::default(), p, c, t1, t2)
}

/// [`omori_rate`] with explicit switch tolerances.
pub fn omori_rate_with(tol: &OmoriTolerance, p: f64, c: f64, t1: f64, t2: f64) -> f64 {
    if p.is_nan() || c.is_nan() || t1.is_nan() || t2.is_nan() {
        return f64::NAN;
    }
    let u1 = t1 + c;
    if c <= 0.0 || u1 <= 0.0 {
        return f64::NAN;
    }
    if t2 <= t1 {
        return 0.0;
    }
    if t2.is_infinite() {
        return if p > 1.0 {
            u1.powf(1.0 - p) / (p - 1.0)
        } else {
            f64::INFINITY
        };
    }

    let width = t2 - t1;
    let r = width / u1;
    if r < tol.midpoint_rel {
        return width * (0.5 * (t1 + t2) + c).powf(-p);
    }

    let l = r.ln_1p();
    u1.powf(1.0 - p) * l * expm1_ratio((1.0 - p) * l)
}

/// Omori integral for a parent at time `t0`, over the absolute window
/// [t1, t2] clipped to t >= t0.
pub fn omori_rate_shifted(p: f64, c: f64, t0: f64, t1: f64, t2: f64) -> f64 {
    let lo = t1.max(t0);
    if t2 <= lo {
        return 0.0;
    }
    omori_rate(p, c, lo - t0, t2 - t0)
}

/// Solve `omori_rate(p, c, t1, t2) == rate` for `t2`.
///
/// Returns `+inf` when `p > 1` and `rate` is at least the whole remaining
/// integral from `t1` to infinity.
pub fn omori_inverse(p: f64, c: f64, t1: f64, rate: f64) -> f64 {
    if p.is_nan() || c.is_nan() || t1.is_nan() || rate.is_nan() {
        return f64::NAN;
    }
    let u1 = t1 + c;
    if c <= 0.0 || u1 <= 0.0 || rate < 0.0 {
        return f64::NAN;
    }
    if rate == 0.0 {
        return t1;
    }
    let scale = u1.powf(p - 1.0);
    let y = rate * (1.0 - p) * scale;
    if y <= -1.0 {
        return f64::INFINITY;
    }
    // L = ln1p(y) / (1 - p), written so that p = 1 gives L = rate.
    let l = rate * scale * log1p_ratio(y);
    t1 + u1 * l.exp_m1()
}

/// Double integral `∫_{s1}^{s2} ∫_{t1}^{t2} (t - s + c)^(-p) dt ds`.
///
/// Requires `s1 <= s2 <= t1 <= t2`; returns NaN otherwise.
pub fn omori_double_rate(p: f64, c: f64, s1: f64, s2: f64, t1: f64, t2: f64) -> f64 {
    omori_double_rate_with(&OmoriTolerance::default(), p, c, s1, s2, t1, t2)
}

/// [`omori_double_rate`] with explicit switch tolerances.
pub fn omori_double_rate_with(
    tol: &OmoriTolerance,
    p: f64,
    c: f64,
    s1: f64,
    s2: f64,
    t1: f64,
    t2: f64,
) -> f64 {
    if [p, c, s1, s2, t1, t2].iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    if c <= 0.0 || !(s1 <= s2 && s2 <= t1 && t1 <= t2) {
        return f64::NAN;
    }
    let ds = s2 - s1;
    let dt = t2 - t1;
    if ds == 0.0 || dt == 0.0 {
        return 0.0;
    }
    let short = ds.min(dt);
    let long = ds.max(dt);

    // Lag range is [lag_lo, lag_hi]; weight ramps up over the first `short`,
    // stays at `short`, then ramps down over the last `short`.
    let lag_lo = t1 - s2;
    let lag_hi = t2 - s1;

    let lo_base = lag_lo + c;
    let rising = lo_base.powf(2.0 - p) * ramp_up(tol, p, short / lo_base);

    let flat = if long > short {
        short * omori_rate_with(tol, p, c, lag_lo + short, lag_lo + long)
    } else {
        0.0
    };

    let hi_base = lag_hi + c;
    let falling = hi_base.powf(2.0 - p) * ramp_down(tol, p, short / hi_base);

    rising + flat + falling
}

/// `∫_0^r y (1 + y)^(-p) dy`.
fn ramp_up(tol: &OmoriTolerance, p: f64, r: f64) -> f64 {
    if r < tol.series_rel {
        // (1+y)^(-p) = Σ C(-p, k) y^k
        let mut coeff = 1.0;
        let mut power = r * r;
        let mut sum = 0.0;
        for k in 0..SERIES_MAX_TERMS {
            let term = coeff * power / (k as f64 + 2.0);
            sum += term;
            if term.abs() <= SERIES_EPS * sum.abs() {
                break;
            }
            coeff *= (-p - k as f64) / (k as f64 + 1.0);
            power *= r;
        }
        return sum;
    }
    let l = r.ln_1p();
    l * (expm1_ratio((2.0 - p) * l) - expm1_ratio((1.0 - p) * l))
}

/// `∫_0^r y (1 - y)^(-p) dy`, for 0 <= r < 1.
fn ramp_down(tol: &OmoriTolerance, p: f64, r: f64) -> f64 {
    if r < tol.series_rel {
        // (1-y)^(-p) = Σ C(p+k-1, k) y^k
        let mut coeff = 1.0;
        let mut power = r * r;
        let mut sum = 0.0;
        for k in 0..SERIES_MAX_TERMS {
            let term = coeff * power / (k as f64 + 2.0);
            sum += term;
            if term.abs() <= SERIES_EPS * sum.abs() {
                break;
            }
            coeff *= (p + k as f64) / (k as f64 + 1.0);
            power *= r;
        }
        return sum;
    }
    let l = -(-r).ln_1p();
    l * (expm1_ratio((p - 1.0) * l) - expm1_ratio((p - 2.0) * l))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel_eq(a: f64, b: f64, rel: f64) -> bool {
        if a == b {
            return true;
        }
        (a - b).abs() <= rel * a.abs().max(b.abs())
    }

    fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, n: usize) -> f64 {
        let n = if n % 2 == 1 { n + 1 } else { n };
        let h = (b - a) / n as f64;
        let mut sum = f(a) + f(b);
        for i in 1..n {
            let x = a + h * i as f64;
            sum += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
        }
        sum * h / 3.0
    }

    #[test]
    fn p_equal_one_is_logarithm() {
        let v = omori_rate(1.0, 0.01, 0.0, 10.0);
        let expected = (10.01f64 / 0.01).ln();
        assert!(rel_eq(v, expected, 1e-14), "v={v} expected={expected}");
    }

    #[test]
    fn closed_form_for_p_two() {
        // ∫ (t+c)^-2 = 1/(t1+c) - 1/(t2+c)
        let v = omori_rate(2.0, 0.5, 1.0, 3.0);
        let expected = 1.0 / 1.5 - 1.0 / 3.5;
        assert!(rel_eq(v, expected, 1e-14));
    }

    #[test]
    fn continuous_through_p_one() {
        let below = omori_rate(1.0 - 1e-12, 0.02, 0.5, 100.0);
        let at = omori_rate(1.0, 0.02, 0.5, 100.0);
        let above = omori_rate(1.0 + 1e-12, 0.02, 0.5, 100.0);
        assert!(rel_eq(below, at, 1e-10));
        assert!(rel_eq(above, at, 1e-10));
    }

    #[test]
    fn midpoint_branch_matches_closed_form_at_switch() {
        let c = 0.01;
        let t1 = 1.0;
        let width = (t1 + c) * 0.5e-8;
        let mid = omori_rate(1.2, c, t1, t1 + width);
        let forced = omori_rate_with(
            &OmoriTolerance {
                midpoint_rel: 0.0,
                series_rel: 0.1,
            },
            1.2,
            c,
            t1,
            t1 + width,
        );
        assert!(rel_eq(mid, forced, 1e-12), "mid={mid} forced={forced}");
    }

    #[test]
    fn infinite_window() {
        let v = omori_rate(1.5, 0.1, 0.0, f64::INFINITY);
        assert!(rel_eq(v, 0.1f64.powf(-0.5) / 0.5, 1e-14));
        assert_eq!(omori_rate(0.9, 0.1, 0.0, f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn empty_and_invalid_windows() {
        assert_eq!(omori_rate(1.1, 0.01, 5.0, 5.0), 0.0);
        assert_eq!(omori_rate(1.1, 0.01, 5.0, 4.0), 0.0);
        assert!(omori_rate(1.1, 0.0, 1.0, 2.0).is_nan());
        assert!(omori_rate(1.1, 0.01, -1.0, 2.0).is_nan());
    }

    #[test]
    fn shifted_clips_to_parent_time() {
        let a = omori_rate_shifted(1.1, 0.01, 2.0, 0.0, 5.0);
        let b = omori_rate(1.1, 0.01, 0.0, 3.0);
        assert!(rel_eq(a, b, 1e-15));
        assert_eq!(omori_rate_shifted(1.1, 0.01, 6.0, 0.0, 5.0), 0.0);
    }

    #[test]
    fn inverse_round_trips() {
        for p in [0.7, 1.0, 1.08, 1.5, 2.0, 2.4] {
            for (t1, t2) in [(0.0, 1.0), (0.3, 0.3001), (5.0, 365.0)] {
                let rate = omori_rate(p, 0.01, t1, t2);
                let back = omori_inverse(p, 0.01, t1, rate);
                assert!(rel_eq(back, t2, 1e-9), "p={p} t1={t1} t2={t2} back={back}");
            }
        }
    }

    #[test]
    fn inverse_beyond_total_is_infinite() {
        let total = omori_rate(1.5, 0.1, 0.0, f64::INFINITY);
        assert_eq!(omori_inverse(1.5, 0.1, 0.0, total * 1.01), f64::INFINITY);
    }

    #[test]
    fn double_rate_matches_nested_quadrature() {
        let c = 0.05;
        for p in [0.8, 1.0, 1.3, 2.0, 2.5] {
            for (s1, s2, t1, t2) in [
                (0.0, 1.0, 1.0, 2.0),
                (0.0, 0.5, 3.0, 10.0),
                (0.0, 4.0, 4.5, 5.0),
                (1.0, 1.001, 2.0, 2.002),
            ] {
                let got = omori_double_rate(p, c, s1, s2, t1, t2);
                let reference = simpson(
                    |s| omori_rate(p, c, t1 - s, t2 - s),
                    s1,
                    s2,
                    20_000,
                );
                assert!(
                    rel_eq(got, reference, 1e-8),
                    "p={p} ({s1},{s2},{t1},{t2}) got={got} ref={reference}"
                );
            }
        }
    }

    #[test]
    fn double_rate_rejects_overlap() {
        assert!(omori_double_rate(1.1, 0.01, 0.0, 2.0, 1.0, 3.0).is_nan());
        assert_eq!(omori_double_rate(1.1, 0.01, 0.0, 0.0, 1.0, 3.0), 0.0);
    }

    #[test]
    fn ramp_series_and_closed_form_agree() {
        let tol = OmoriTolerance::default();
        for p in [0.5, 1.0, 1.5, 2.0, 3.0] {
            let r = tol.series_rel;
            let series_up = ramp_up(&OmoriTolerance { series_rel: 1.0, ..tol }, p, r * 0.999);
            let closed_up = ramp_up(&OmoriTolerance { series_rel: 0.0, ..tol }, p, r * 0.999);
            assert!(rel_eq(series_up, closed_up, 1e-13), "p={p}");
            let series_dn = ramp_down(&OmoriTolerance { series_rel: 1.0, ..tol }, p, r * 0.999);
            let closed_dn = ramp_down(&OmoriTolerance { series_rel: 0.0, ..tol }, p, r * 0.999);
            assert!(rel_eq(series_dn, closed_dn, 1e-13), "p={p}");
        }
    }
}
