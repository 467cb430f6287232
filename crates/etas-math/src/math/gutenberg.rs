//! Gutenberg-Richter magnitude integrals.
//!
//! Rates are normalized so that `gr_rate(b, mref, mref, inf) == 1`: the
//! expected number of events with magnitude above `m` per event above
//! `mref` is `10^(-b(m - mref))`.

use super::stable::{expm1_ratio, LN_10};

#[inline]
fn beta(b: f64) -> f64 {
    b * LN_10
}

/// G-R probability density at `m`, normalized at `mref`.
pub fn gr_density(b: f64, mref: f64, m: f64) -> f64 {
    if b <= 0.0 || b.is_nan() || mref.is_nan() || m.is_nan() {
        return f64::NAN;
    }
    beta(b) * (-beta(b) * (m - mref)).exp()
}

/// `10^(-b(m1-mref)) - 10^(-b(m2-mref))`, the expected count in [m1, m2].
///
/// `m2 = +inf` gives the plain tail rate. Reversed bounds give 0.
pub fn gr_rate(b: f64, mref: f64, m1: f64, m2: f64) -> f64 {
    if b <= 0.0 || b.is_nan() || mref.is_nan() || m1.is_nan() || m2.is_nan() {
        return f64::NAN;
    }
    if m2 <= m1 {
        return 0.0;
    }
    let head = (-beta(b) * (m1 - mref)).exp();
    if m2.is_infinite() {
        return head;
    }
    head * -(-beta(b) * (m2 - m1)).exp_m1()
}

/// Solve `gr_rate(b, mref, m1, m2) == rate` for the upper bound `m2`.
///
/// Returns `+inf` when `rate` is at least the whole tail above `m1`.
pub fn gr_inverse_upper(b: f64, mref: f64, m1: f64, rate: f64) -> f64 {
    if b <= 0.0 || b.is_nan() || mref.is_nan() || m1.is_nan() || rate.is_nan() || rate < 0.0 {
        return f64::NAN;
    }
    let q = rate * (beta(b) * (m1 - mref)).exp();
    if q >= 1.0 {
        return f64::INFINITY;
    }
    m1 - (-q).ln_1p() / beta(b)
}

/// Solve `gr_rate(b, mref, m1, m2) == rate` for the lower bound `m1`.
pub fn gr_inverse_lower(b: f64, mref: f64, m2: f64, rate: f64) -> f64 {
    if b <= 0.0 || b.is_nan() || mref.is_nan() || m2.is_nan() || rate.is_nan() || rate < 0.0 {
        return f64::NAN;
    }
    let tail = if m2.is_infinite() {
        0.0
    } else {
        (-beta(b) * (m2 - mref)).exp()
    };
    mref - (rate + tail).log10() / b
}

/// The `m` such that `gr_rate(m, m2) == ratio * gr_rate(m0, m2)`.
///
/// A ratio below 1 moves `m` up from `m0`, above 1 moves it down. The
/// result does not depend on the reference magnitude.
pub fn gr_ratio_inverse(b: f64, m0: f64, m2: f64, ratio: f64) -> f64 {
    if b <= 0.0 || b.is_nan() || m0.is_nan() || m2.is_nan() || ratio.is_nan() || ratio <= 0.0 {
        return f64::NAN;
    }
    if m2.is_infinite() {
        return m0 - ratio.ln() / beta(b);
    }
    let span = beta(b) * (m2 - m0);
    let width = -(-span).exp_m1();
    m0 - (ratio * width + (-span).exp()).ln() / beta(b)
}

/// `∫_{m1}^{m2} b·ln10 · 10^((alpha - b)(m - mref)) dm`.
///
/// This is the expected productivity-weighted count per parent; it stays
/// finite and smooth through `alpha == b`, where it reduces to
/// `b·ln10·(m2 - m1)`.
pub fn gr_alpha_integral(b: f64, alpha: f64, mref: f64, m1: f64, m2: f64) -> f64 {
    if b <= 0.0 || [b, alpha, mref, m1, m2].iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    if m2 <= m1 {
        return 0.0;
    }
    let v = (alpha - b) * LN_10;
    let width = m2 - m1;
    if width.is_infinite() {
        return if v < 0.0 {
            beta(b) * (v * (m1 - mref)).exp() / -v
        } else {
            f64::INFINITY
        };
    }
    beta(b) * (v * (m1 - mref)).exp() * width * expm1_ratio(v * width)
}

/// Inverse-CDF magnitude sample on [m1, m2] for a uniform `u` in (0, 1).
pub fn gr_sample_inverse(b: f64, m1: f64, m2: f64, u: f64) -> f64 {
    let beta = beta(b);
    let width = if m2.is_infinite() {
        1.0
    } else {
        -(-beta * (m2 - m1)).exp_m1()
    };
    m1 - (-u * width).ln_1p() / beta
}
