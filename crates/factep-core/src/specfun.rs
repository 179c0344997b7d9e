//! Special functions used by the potential families.
//!
//! The normal c.d.f. and its logarithm follow the rational Chebyshev
//! approximations of Cody, *Rational Chebyshev approximation to the error
//! function*, split at the usual two break points. All routines are plain
//! `f64` functions; none of them allocate.

use special::Gamma;

/// log(2 pi)
pub const LN_2PI: f64 = 1.837877066409345339081937709125;
/// sqrt(pi)
pub const SQRT_PI: f64 = 1.772453850905516027298167483341;

const ERF_CODY_LIMIT1: f64 = 0.6629;
const ERF_CODY_LIMIT2: f64 = 5.6569;

/// log N(z | 0, 1)
#[inline]
pub fn log_pdf_normal(z: f64) -> f64 {
    -0.5 * (LN_2PI + z * z)
}

/// Phi(z), c.d.f. of N(0,1).
pub fn cdf_normal(z: f64) -> f64 {
    if z.abs() < ERF_CODY_LIMIT1 {
        // Phi(z) ~ (1 + y R_3(y^2))/2, y = z/sqrt(2)
        0.5 * (1.0 + (z / std::f64::consts::SQRT_2) * erf_rational_r3(0.5 * z * z))
    } else if z < 0.0 {
        // Phi(z) ~ N(z) Q(-z)/(-z)
        log_pdf_normal(z).exp() * erf_rational_q(-z) / (-z)
    } else {
        1.0 - log_pdf_normal(z).exp() * erf_rational_q(z) / z
    }
}

/// log Phi(z), stable far into the left tail.
pub fn log_cdf_normal(z: f64) -> f64 {
    if z.abs() < ERF_CODY_LIMIT1 {
        ((z / std::f64::consts::SQRT_2) * erf_rational_r3(0.5 * z * z)).ln_1p()
            - std::f64::consts::LN_2
    } else if z < 0.0 {
        log_pdf_normal(z) - (-z).ln() + erf_rational_q(-z).ln()
    } else {
        (-log_pdf_normal(z).exp() * erf_rational_q(z) / z).ln_1p()
    }
}

/// (d/dz) log Phi(z) = N(z)/Phi(z). The reflection f(-z) is the hazard
/// function of the standard normal.
pub fn deriv_log_cdf_normal(z: f64) -> f64 {
    if z.abs() < ERF_CODY_LIMIT1 {
        2.0 * log_pdf_normal(z).exp()
            / (1.0 + (z / std::f64::consts::SQRT_2) * erf_rational_r3(0.5 * z * z))
    } else if z < 0.0 {
        -z / erf_rational_q(-z)
    } else {
        let temp = log_pdf_normal(z).exp();
        temp / (1.0 - temp * erf_rational_q(z) / z)
    }
}

/// log Gamma(z), z > 0.
#[inline]
pub fn ln_gamma(z: f64) -> f64 {
    z.ln_gamma().0
}

/// log sum_k exp(a[k]), guarded against overflow. Empty input gives 0.
pub fn logsumexp(a: &[f64]) -> f64 {
    let Some((&first, rest)) = a.split_first() else {
        return 0.0;
    };
    let mut mx = first;
    let mut sum = 1.0;
    for &v in rest {
        if v <= mx {
            sum += (v - mx).exp();
        } else {
            sum = sum * (mx - v).exp() + 1.0;
            mx = v;
        }
    }
    mx + sum.ln()
}

/// Q(x) for x >= ERF_CODY_LIMIT1, defined by 1 - Phi(x) ~ N(x) x^{-1} Q(x).
/// Q(x) -> 1 as x -> infinity.
fn erf_rational_q(x: f64) -> f64 {
    debug_assert!(x > 0.0);
    if x >= ERF_CODY_LIMIT2 {
        // Q(x) = 1 + sqrt(pi) y R_1(y), y = 2/x^2.
        // Coefficient ordering: 4,3,2,1,0,5 for the numerator (q_5 = 1);
        // the p_j enter negated.
        let p = [
            3.05326634961232344e-1,
            3.60344899949804439e-1,
            1.25781726111229246e-1,
            1.60837851487422766e-2,
            6.58749161529837803e-4,
            1.63153871373020978e-2,
        ];
        let q = [
            2.56852019228982242,
            1.87295284992346047,
            5.27905102951428412e-1,
            6.05183413124413191e-2,
            2.33520497626869185e-3,
        ];
        let y = 2.0 / x / x;
        let mut res = y * p[5];
        let mut den = y;
        for i in 0..4 {
            res = (res + p[i]) * y;
            den = (den + q[i]) * y;
        }
        1.0 - SQRT_PI * y * (res + p[4]) / (den + q[4])
    } else {
        // Q(x) = sqrt(pi) y R_2(y), y = x/sqrt(2).
        // Coefficient ordering: 7,6,5,4,3,2,1,0,8 (q_8 = 1).
        let p = [
            5.64188496988670089e-1,
            8.88314979438837594,
            6.61191906371416295e1,
            2.98635138197400131e2,
            8.81952221241769090e2,
            1.71204761263407058e3,
            2.05107837782607147e3,
            1.23033935479799725e3,
            2.15311535474403846e-8,
        ];
        let q = [
            1.57449261107098347e1,
            1.17693950891312499e2,
            5.37181101862009858e2,
            1.62138957456669019e3,
            3.29079923573345963e3,
            4.36261909014324716e3,
            3.43936767414372164e3,
            1.23033935480374942e3,
        ];
        let y = x / std::f64::consts::SQRT_2;
        let mut res = y * p[8];
        let mut den = y;
        for i in 0..7 {
            res = (res + p[i]) * y;
            den = (den + q[i]) * y;
        }
        SQRT_PI * y * (res + p[7]) / (den + q[7])
    }
}

/// R_3(y), y = x^2/2, for 0 <= x < ERF_CODY_LIMIT1:
/// Phi(x) ~ (1 + (x/sqrt(2)) R_3(x^2/2))/2.
fn erf_rational_r3(y: f64) -> f64 {
    debug_assert!(y >= 0.0);
    let p = [
        3.16112374387056560,
        1.13864154151050156e2,
        3.77485237685302021e2,
        3.20937758913846947e3,
        1.85777706184603153e-1,
    ];
    let q = [
        2.36012909523441209e1,
        2.44024637934444173e2,
        1.28261652607737228e3,
        2.84423683343917062e3,
    ];
    let mut nom = y * p[4];
    let mut den = y;
    for i in 0..3 {
        nom = (nom + p[i]) * y;
        den = (den + q[i]) * y;
    }
    (nom + p[3]) / (den + q[3])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdf_normal_at_zero() {
        assert!((cdf_normal(0.0) - 0.5).abs() < 1e-14);
        assert!((log_cdf_normal(0.0) + std::f64::consts::LN_2).abs() < 1e-14);
    }

    #[test]
    fn test_cdf_normal_symmetry() {
        for &z in &[0.1, 0.5, 1.0, 2.0, 3.5, 6.0] {
            let s = cdf_normal(z) + cdf_normal(-z);
            assert!((s - 1.0).abs() < 1e-12, "z={z}: sum={s}");
        }
    }

    #[test]
    fn test_log_cdf_matches_cdf() {
        for &z in &[-4.0, -2.0, -0.5, 0.0, 0.5, 2.0, 4.0] {
            let diff = (log_cdf_normal(z) - cdf_normal(z).ln()).abs();
            assert!(diff < 1e-10, "z={z}: diff={diff}");
        }
    }

    #[test]
    fn test_log_cdf_left_tail_finite() {
        // Direct ln(Phi(z)) underflows near z=-40; the log version must not.
        let v = log_cdf_normal(-40.0);
        assert!(v.is_finite());
        // log Phi(z) ~ -z^2/2 - log(-z) - log(2 pi)/2 in the far tail
        let asymptote = -0.5 * 1600.0 - 40f64.ln() - 0.5 * LN_2PI;
        assert!((v - asymptote).abs() < 1e-2);
    }

    #[test]
    fn test_deriv_log_cdf_is_hazard() {
        for &z in &[-3.0, -1.0, 0.0, 1.0, 3.0] {
            let expect = log_pdf_normal(z).exp() / cdf_normal(z);
            let got = deriv_log_cdf_normal(z);
            assert!((got - expect).abs() / expect < 1e-10, "z={z}");
        }
    }

    #[test]
    fn test_ln_gamma_values() {
        assert!((ln_gamma(1.0)).abs() < 1e-13);
        assert!((ln_gamma(5.0) - 24f64.ln()).abs() < 1e-12);
        assert!((ln_gamma(0.5) - SQRT_PI.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_logsumexp() {
        assert_eq!(logsumexp(&[]), 0.0);
        let v = logsumexp(&[0.0, 0.0]);
        assert!((v - std::f64::consts::LN_2).abs() < 1e-14);
        // Large offsets must not overflow
        let v = logsumexp(&[1000.0, 1000.0 + (2f64).ln()]);
        assert!((v - (1000.0 + (3f64).ln())).abs() < 1e-10);
    }
}
