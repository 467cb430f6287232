//! Numerically stable primitives shared by the rate integrals.

use std::f64::consts::PI;

const LOG_SQRT_2PI: f64 = 0.918_938_533_204_672_8; // 0.5 * ln(2*pi)
const LANCZOS_G: f64 = 7.0;
#[allow(clippy::excessive_precision)] // These are published numerical constants
const LANCZOS_COEFFS: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

/// Below this magnitude the ratio helpers switch to their Taylor series.
/// The first omitted term is O(x^4), far under 1e-15 relative.
pub const TAYLOR_CUTOFF: f64 = 1.0e-5;

/// ln(10).
pub const LN_10: f64 = std::f64::consts::LN_10;

/// expm1(x) / x, continuous through x = 0.
///
/// This is the factor that turns `(u^q - 1) / q` into a form with no
/// singularity at q = 0, which is how the Omori integral stays regular at
/// p = 1 and the magnitude integral at alpha = b.
pub fn expm1_ratio(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x.abs() < TAYLOR_CUTOFF {
        return 1.0 + x * (0.5 + x * (1.0 / 6.0 + x / 24.0));
    }
    x.exp_m1() / x
}

/// ln1p(y) / y, continuous through y = 0.
pub fn log1p_ratio(y: f64) -> f64 {
    if y.is_nan() {
        return f64::NAN;
    }
    if y.abs() < TAYLOR_CUTOFF {
        return 1.0 + y * (-0.5 + y * (1.0 / 3.0 - y * 0.25));
    }
    y.ln_1p() / y
}

/// Natural log of the Gamma function (log |Gamma(z)|).
///
/// Uses a Lanczos approximation with reflection for z < 0.5.
pub fn log_gamma(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    if z == f64::INFINITY {
        return f64::INFINITY;
    }
    if z == f64::NEG_INFINITY {
        return f64::NAN;
    }
    if z <= 0.0 {
        let z_round = z.round();
        if (z - z_round).abs() < 1e-15 {
            return f64::NAN;
        }
    }
    if z < 0.5 {
        let sin_pi = (PI * z).sin();
        if sin_pi == 0.0 {
            return f64::NAN;
        }
        return PI.ln() - sin_pi.abs().ln() - log_gamma(1.0 - z);
    }

    let z_minus = z - 1.0;
    let mut x = LANCZOS_COEFFS[0];
    for (i, coeff) in LANCZOS_COEFFS.iter().enumerate().skip(1) {
        x += coeff / (z_minus + i as f64);
    }
    let t = z_minus + LANCZOS_G + 0.5;
    LOG_SQRT_2PI + (z_minus + 0.5) * t.ln() - t + x.ln()
}

/// log(n!) using the Gamma function.
pub fn log_factorial(n: u64) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    log_gamma((n as f64) + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        (a - b).abs() <= tol
    }

    #[test]
    fn expm1_ratio_at_zero_is_one() {
        assert_eq!(expm1_ratio(0.0), 1.0);
    }

    #[test]
    fn expm1_ratio_is_continuous_across_cutoff() {
        let below = expm1_ratio(TAYLOR_CUTOFF * 0.999_999);
        let above = expm1_ratio(TAYLOR_CUTOFF * 1.000_001);
        assert!(approx_eq(below, above, 1e-14));
        let below = expm1_ratio(-TAYLOR_CUTOFF * 0.999_999);
        let above = expm1_ratio(-TAYLOR_CUTOFF * 1.000_001);
        assert!(approx_eq(below, above, 1e-14));
    }

    #[test]
    fn expm1_ratio_matches_direct_form() {
        for x in [-20.0, -1.0, -0.01, 0.3, 2.0, 15.0] {
            let direct = (f64::exp(x) - 1.0) / x;
            assert!(approx_eq(expm1_ratio(x), direct, 1e-12 * direct.abs()));
        }
    }

    #[test]
    fn log1p_ratio_small_and_large() {
        assert_eq!(log1p_ratio(0.0), 1.0);
        assert!(approx_eq(log1p_ratio(1.0), 2.0f64.ln(), 1e-15));
        assert!(approx_eq(
            log1p_ratio(-0.5),
            0.5f64.ln() / -0.5,
            1e-15
        ));
        let below = log1p_ratio(TAYLOR_CUTOFF * 0.999_999);
        let above = log1p_ratio(TAYLOR_CUTOFF * 1.000_001);
        assert!(approx_eq(below, above, 1e-14));
    }

    #[test]
    fn log_gamma_known_values() {
        assert!(approx_eq(log_gamma(1.0), 0.0, 1e-12));
        assert!(approx_eq(log_gamma(0.5), 0.5 * PI.ln(), 1e-10));
        assert!(approx_eq(log_gamma(5.0), 24.0f64.ln(), 1e-10));
    }

    #[test]
    fn log_factorial_small() {
        assert_eq!(log_factorial(0), 0.0);
        assert_eq!(log_factorial(1), 0.0);
        assert!(approx_eq(log_factorial(5), 120.0f64.ln(), 1e-12));
    }

    #[test]
    fn log_gamma_negative_integer_is_nan() {
        assert!(log_gamma(-2.0).is_nan());
    }
}
