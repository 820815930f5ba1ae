/// Floor applied to rates and densities before logarithms and divisions.
pub const EPS: f64 = 1e-15;

/// Gaussian PDF at `x` with the given mean and standard deviation.
#[inline]
pub fn gaussian_pdf(x: f64, mean: f64, sigma: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    let z = (x - mean) / sigma;
    INV_SQRT_2PI / sigma * (-0.5 * z * z).exp()
}

/// Floors `rate` at [`EPS`] while letting NaN pass through unchanged.
///
/// `f64::max` would quietly turn NaN into the floor, which must not happen:
/// a missing-position rate has to stay missing all the way to the output.
#[inline]
pub fn clamp_rate(rate: f64) -> f64 {
    if rate < EPS { EPS } else { rate }
}

/// ln Γ(x) via the Lanczos approximation (g = 7, 9 terms).
///
/// Accurate to ~15 significant digits over the positive reals, which covers
/// the `ln(k!)` terms of the Poisson log-pmf for any spike count.
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 8] = [
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];
    const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

    if x < 0.5 {
        // Reflection: Γ(x)Γ(1−x) = π / sin(πx)
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut acc = 0.999_999_999_999_809_93_f64;
    for (i, &c) in COEFFS.iter().enumerate() {
        acc += c / (x + (i + 1) as f64);
    }
    let t = x + 7.5;
    LN_SQRT_2PI + (x + 0.5) * t.ln() - t + acc.ln()
}

/// `x * ln(y)` with the convention that the result is 0 when `x` is 0.
#[inline]
pub fn xlogy(x: f64, y: f64) -> f64 {
    if x == 0.0 { 0.0 } else { x * y.ln() }
}

/// Poisson log-pmf `ln P(k | rate) = k ln(rate) − rate − ln(k!)`.
///
/// NaN rates propagate to a NaN result even for `k = 0`.
#[inline]
pub fn poisson_log_pmf(count: f64, rate: f64) -> f64 {
    count * rate.ln() - rate - ln_gamma(count + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn ln_gamma_matches_factorials() {
        // Γ(n+1) = n!
        let factorials = [1.0_f64, 1.0, 2.0, 6.0, 24.0, 120.0, 720.0, 5040.0];
        for (n, f) in factorials.iter().enumerate() {
            assert_abs_diff_eq!(ln_gamma(n as f64 + 1.0), f.ln(), epsilon = 1e-12);
        }
        assert_abs_diff_eq!(ln_gamma(0.5), std::f64::consts::PI.sqrt().ln(), epsilon = 1e-12);
    }

    #[test]
    fn poisson_log_pmf_matches_direct_computation() {
        // P(3 | 2.5) = 2.5^3 e^{-2.5} / 3!
        let expected = (2.5_f64.powi(3) * (-2.5_f64).exp() / 6.0).ln();
        assert_abs_diff_eq!(poisson_log_pmf(3.0, 2.5), expected, epsilon = 1e-12);
    }

    #[test]
    fn nan_rate_stays_nan_through_clamp_and_pmf() {
        assert!(clamp_rate(f64::NAN).is_nan());
        assert!(poisson_log_pmf(0.0, f64::NAN).is_nan());
        assert_eq!(clamp_rate(0.0), EPS);
        assert_eq!(clamp_rate(-1.0), EPS);
        assert_eq!(clamp_rate(2.0), 2.0);
    }

    #[test]
    fn gaussian_pdf_peak_and_symmetry() {
        assert_abs_diff_eq!(
            gaussian_pdf(0.0, 0.0, 1.0),
            0.398_942_280_401_432_7,
            epsilon = 1e-15
        );
        assert_abs_diff_eq!(
            gaussian_pdf(1.0, 3.0, 2.0),
            gaussian_pdf(5.0, 3.0, 2.0),
            epsilon = 1e-15
        );
    }

    #[test]
    fn xlogy_zero_convention() {
        assert_eq!(xlogy(0.0, 0.0), 0.0);
        assert_eq!(xlogy(0.0, f64::NAN), 0.0);
        assert_abs_diff_eq!(xlogy(2.0, 3.0), 2.0 * 3.0_f64.ln(), epsilon = 1e-15);
    }
}
