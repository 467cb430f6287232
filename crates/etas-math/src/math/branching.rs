//! Productivity and branch-ratio relations.
//!
//! A parent of magnitude `m` has productivity `k = 10^(a + alpha(m - mref))`
//! and produces on average `k · ∫(t+c)^-p dt · gr_rate(m1, m2)` direct
//! children in a time window and magnitude band.

use super::gutenberg::{gr_alpha_integral, gr_rate};
use super::omori::{omori_rate, omori_rate_shifted};
use super::stable::expm1_ratio;

/// Productivity `10^(a + alpha(m - mref))`.
pub fn productivity(a: f64, alpha: f64, mref: f64, m: f64) -> f64 {
    10f64.powf(a + alpha * (m - mref))
}

/// Expected number of direct children per parent over [0, tint], with
/// parent and child magnitudes on [mref, msup].
#[allow(clippy::too_many_arguments)]
pub fn branch_ratio(
    a: f64,
    p: f64,
    c: f64,
    b: f64,
    alpha: f64,
    mref: f64,
    msup: f64,
    tint: f64,
) -> f64 {
    derated_branch_ratio(a, p, c, b, alpha, mref, mref, msup, tint)
}

/// Productivity `a` that yields branch ratio `n`.
#[allow(clippy::too_many_arguments)]
pub fn inverse_branch_ratio(
    n: f64,
    p: f64,
    c: f64,
    b: f64,
    alpha: f64,
    mref: f64,
    msup: f64,
    tint: f64,
) -> f64 {
    if n.is_nan() || n <= 0.0 {
        return f64::NAN;
    }
    let unit = gr_alpha_integral(b, alpha, mref, mref, msup) * omori_rate(p, c, 0.0, tint);
    n.log10() - unit.log10()
}

/// Branch ratio restricted to parents and children with magnitude in
/// [m1, m2].
///
/// With the parent magnitude drawn from the G-R law truncated to [m1, m2],
/// this is the expected number of its children that also land in [m1, m2].
#[allow(clippy::too_many_arguments)]
pub fn derated_branch_ratio(
    a: f64,
    p: f64,
    c: f64,
    b: f64,
    alpha: f64,
    mref: f64,
    m1: f64,
    m2: f64,
    tint: f64,
) -> f64 {
    10f64.powf(a) * gr_alpha_integral(b, alpha, mref, m1, m2) * omori_rate(p, c, 0.0, tint)
}

/// Expected direct children of one parent with productivity `k` at
/// `t_parent`, in the window [t1, t2] and magnitude band [m1, m2].
#[allow(clippy::too_many_arguments)]
pub fn expected_children(
    k: f64,
    p: f64,
    c: f64,
    b: f64,
    mref: f64,
    t_parent: f64,
    t1: f64,
    t2: f64,
    m1: f64,
    m2: f64,
) -> f64 {
    k * omori_rate_shifted(p, c, t_parent, t1, t2) * gr_rate(b, mref, m1, m2)
}

/// `Σ_{j<g} n^j`: total expected events over `g` generations per event in
/// the first, for branch ratio `n`.
///
/// Written as `g · φ(g·ln n) / φ(ln n)` so it is exact at `n == 1`.
pub fn cascade_multiplier(n: f64, g: u32) -> f64 {
    if n.is_nan() || n < 0.0 {
        return f64::NAN;
    }
    if g == 0 {
        return 0.0;
    }
    if n == 0.0 {
        return 1.0;
    }
    let eps = n.ln();
    let g = g as f64;
    g * expm1_ratio(g * eps) / expm1_ratio(eps)
}
