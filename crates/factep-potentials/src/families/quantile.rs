use crate::potential::{EpPotential, GaussianCavity, Moments};
use factep_core::specfun;
use factep_error::{EpResult, require};

/// Quantile regression potential
///
/// ```text
/// t(s)  = tt(xi (y - s)),
/// tt(r) = exp(-kappa [r]_+ - (1-kappa) [-r]_+)
/// ```
///
/// Parameters: `y`, `xi > 0`, `kappa in (0, 1)`. The Laplace potential is
/// the symmetric special case `kappa = 1/2` and calls into
/// [quantile_moments] directly.
pub struct QuantileRegress {
    y: f64,
    xi: f64,
    kappa: f64,
}

impl QuantileRegress {
    pub fn new(y: f64, xi: f64, kappa: f64) -> EpResult<Self> {
        require!(xi >= 1e-12, InvalidParameter: "quantile scale {} too small", xi);
        require!(
            kappa > 0.0 && kappa < 1.0,
            InvalidParameter: "quantile level {} outside (0, 1)", kappa
        );
        Ok(QuantileRegress { y, xi, kappa })
    }
}

impl Default for QuantileRegress {
    fn default() -> Self {
        QuantileRegress {
            y: 0.0,
            xi: 1.0,
            kappa: 0.5,
        }
    }
}

/// Tilted moment match for the quantile potential, shared with Laplace.
/// The fractional parameter is folded into `xi` by the callers.
///
/// The two half-line integrals are combined on the log scale; `q` is the
/// posterior mass of the right branch.
pub(crate) fn quantile_moments(
    cmu: f64,
    crho: f64,
    xi: f64,
    y: f64,
    kappa: f64,
) -> Option<Moments> {
    if crho < 1e-14 {
        return None;
    }
    let kapc = 1.0 - kappa;
    let hh = y - cmu;
    let hr = xi * hh;
    let rhor = xi * xi * crho;
    let sqrhor = xi * crho.sqrt();
    let argf = kappa * sqrhor - hr / sqrhor;
    let li01 = 0.5 * kappa * (kappa * rhor - 2.0 * hr) + specfun::log_cdf_normal(-argf);
    let li02 = 0.5 * kapc * (kapc * rhor + 2.0 * hr) + specfun::log_cdf_normal(argf - sqrhor);
    let (log_z, q) = if li01 >= li02 {
        let temp = (li02 - li01).exp();
        (li01 + temp.ln_1p(), temp / (1.0 + temp))
    } else {
        let temp = (li01 - li02).exp();
        (li02 + temp.ln_1p(), 1.0 / (1.0 + temp))
    };
    let alpha = xi * (kappa - q);
    let nu = xi
        * xi
        * ((-0.5 * (hh * hh / crho + specfun::LN_2PI) - log_z).exp() / sqrhor - q * (1.0 - q));
    Some(Moments { alpha, nu, log_z })
}

impl EpPotential for QuantileRegress {
    fn num_pars(&self) -> usize {
        3
    }

    fn get_pars(&self, pv: &mut [f64]) {
        pv[0] = self.y;
        pv[1] = self.xi;
        pv[2] = self.kappa;
    }

    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
        require!(
            self.is_valid_pars(pv),
            InvalidParameter: "invalid quantile parameters (xi={}, kappa={})", pv[1], pv[2]
        );
        self.y = pv[0];
        self.xi = pv[1];
        self.kappa = pv[2];
        Ok(())
    }

    fn is_valid_pars(&self, pv: &[f64]) -> bool {
        pv[1] >= 1e-12 && pv[2] > 0.0 && pv[2] < 1.0
    }

    fn is_log_concave(&self) -> bool {
        true
    }

    fn supports_fractional(&self) -> bool {
        true
    }

    fn moments(&self, cavity: &GaussianCavity, eta: f64) -> Option<Moments> {
        if eta < 1e-10 || eta > 1.0 {
            return None;
        }
        quantile_moments(cavity.mean, cavity.var, self.xi * eta, self.y, self.kappa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Direct numerical moments of t(s) N(s | cmu, crho) on a fine grid.
    fn brute_force(cmu: f64, crho: f64, xi: f64, y: f64, kappa: f64) -> (f64, f64, f64) {
        let sd = crho.sqrt();
        let n = 400_001;
        let lo = cmu.min(y) - 12.0 * sd - 12.0 / xi;
        let hi = cmu.max(y) + 12.0 * sd + 12.0 / xi;
        let h = (hi - lo) / (n - 1) as f64;
        let (mut z, mut m1, mut m2) = (0.0, 0.0, 0.0);
        for idx in 0..n {
            let s = lo + idx as f64 * h;
            let r = xi * (y - s);
            let lt = -kappa * r.max(0.0) - (1.0 - kappa) * (-r).max(0.0);
            let w = (lt + specfun::log_pdf_normal((s - cmu) / sd)).exp() / sd;
            z += w;
            m1 += w * s;
            m2 += w * s * s;
        }
        m1 /= z;
        m2 /= z;
        ((z * h).ln(), m1, m2 - m1 * m1)
    }

    #[test]
    fn test_moments_match_numerical_integration() {
        for &(cmu, crho, xi, y, kappa) in &[
            (0.0, 1.0, 1.0, 0.0, 0.5),
            (1.5, 0.5, 2.0, -0.5, 0.3),
            (-2.0, 2.0, 0.7, 1.0, 0.8),
        ] {
            let m = quantile_moments(cmu, crho, xi, y, kappa).unwrap();
            let (log_z, mean, var) = brute_force(cmu, crho, xi, y, kappa);
            assert!((m.log_z - log_z).abs() < 1e-6, "log_z for {:?}", (cmu, crho, xi, y, kappa));
            assert!(((cmu + m.alpha * crho) - mean).abs() < 1e-6);
            assert!(((crho * (1.0 - m.nu * crho)) - var).abs() < 1e-6);
        }
    }

    #[test]
    fn test_symmetric_case_has_zero_shift_at_center() {
        // kappa = 1/2 and y = cmu: the tilted distribution is symmetric.
        let m = quantile_moments(0.0, 1.0, 1.0, 0.0, 0.5).unwrap();
        assert!(m.alpha.abs() < 1e-14);
        assert!(m.nu > 0.0);
    }

    #[test]
    fn test_degenerate_cavity_rejected() {
        assert!(quantile_moments(0.0, 1e-15, 1.0, 0.0, 0.5).is_none());
        let pot = QuantileRegress::default();
        let cav = GaussianCavity { mean: 0.0, var: 1.0 };
        assert!(pot.moments(&cav, 1.5).is_none());
    }

    #[test]
    fn test_parameter_validation() {
        assert!(QuantileRegress::new(0.0, 0.0, 0.5).is_err());
        assert!(QuantileRegress::new(0.0, 1.0, 1.0).is_err());
        let mut pot = QuantileRegress::default();
        assert!(pot.set_pars(&[0.0, 1.0, 0.0]).is_err());
        assert!(pot.set_pars(&[1.0, 2.0, 0.25]).is_ok());
        let mut pv = [0.0; 3];
        pot.get_pars(&mut pv);
        assert_eq!(pv, [1.0, 2.0, 0.25]);
    }
}
