//! Statistical quantiles used by confidence regions and drift thresholds.
//!
//! Closed-form rational approximations rather than a stats dependency: the
//! standard-normal quantile uses the Acklam approximation (relative error
//! below 1.15e-9 everywhere), and chi-squared quantiles come from it — exact
//! for one degree of freedom, Wilson–Hilferty for the rest.

/// Inverse CDF of the standard normal distribution.
///
/// Acklam's rational approximation with one Halley refinement step.
pub fn normal_quantile(p: f64) -> f64 {
    assert!(p > 0.0 && p < 1.0, "quantile needs p in (0,1), got {}", p);

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    let x = if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    // one Halley step against the exact CDF via erfc
    let e = 0.5 * erfc(-x / std::f64::consts::SQRT_2) - p;
    let u = e * (2.0 * std::f64::consts::PI).sqrt() * (x * x / 2.0).exp();
    x - u / (1.0 + x * u / 2.0)
}

/// Complementary error function (Numerical Recipes rational approximation,
/// |error| < 1.2e-7).
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let ans = t
        * (-z * z - 1.26551223
            + t * (1.00002368
                + t * (0.37409196
                    + t * (0.09678418
                        + t * (-0.18628806
                            + t * (0.27886807
                                + t * (-1.13520398
                                    + t * (1.48851587
                                        + t * (-0.82215223 + t * 0.17087277)))))))))
        .exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Inverse CDF of the chi-squared distribution with `k` degrees of freedom.
///
/// k = 1 reduces to the squared normal quantile; larger k uses the
/// Wilson–Hilferty cube approximation.
pub fn chi2_quantile(p: f64, k: usize) -> f64 {
    assert!(k >= 1, "chi2 needs at least one degree of freedom");
    if k == 1 {
        let z = normal_quantile((1.0 + p) / 2.0);
        return z * z;
    }
    let kf = k as f64;
    let z = normal_quantile(p);
    let h = 2.0 / (9.0 * kf);
    kf * (1.0 - h + z * h.sqrt()).powi(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normal_quantile_hits_known_points() {
        assert_relative_eq!(normal_quantile(0.5), 0.0, epsilon = 1e-9);
        assert_relative_eq!(normal_quantile(0.975), 1.959964, epsilon = 1e-5);
        assert_relative_eq!(normal_quantile(0.841344746), 1.0, epsilon = 1e-6);
        assert_relative_eq!(
            normal_quantile(0.02275013),
            -2.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn normal_quantile_is_antisymmetric() {
        for p in [0.01, 0.1, 0.3] {
            assert_relative_eq!(
                normal_quantile(p),
                -normal_quantile(1.0 - p),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn chi2_one_dof_matches_squared_normal() {
        // 95% chi2(1) quantile is the famous 3.841
        assert_relative_eq!(chi2_quantile(0.95, 1), 3.841459, epsilon = 1e-4);
        assert_relative_eq!(chi2_quantile(0.6827, 1), 1.0, epsilon = 1e-2);
    }

    #[test]
    fn chi2_wilson_hilferty_is_close_for_moderate_dof() {
        // chi2(0.95, 10) = 18.307
        assert_relative_eq!(chi2_quantile(0.95, 10), 18.307, epsilon = 0.05);
        // chi2(0.95, 31) = 44.985
        assert_relative_eq!(chi2_quantile(0.95, 31), 44.985, epsilon = 0.1);
    }

    #[test]
    fn erfc_limits() {
        assert_relative_eq!(erfc(0.0), 1.0, epsilon = 1e-7);
        assert!(erfc(5.0) < 1e-10);
        assert_relative_eq!(erfc(-5.0), 2.0, epsilon = 1e-10);
    }
}
