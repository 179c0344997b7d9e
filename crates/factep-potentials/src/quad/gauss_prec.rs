use super::{Interval, QuadratureProvider, newton_solve};
use crate::potential::{
    ArgumentGroup, EpPotential, GammaCavity, GaussianCavity, Moments, PrecisionMoments,
};
use factep_core::specfun;
use factep_error::{EpResult, require};
use std::sync::Arc;

/// Gaussian observation with a free precision variable
///
/// ```text
/// t(s, tau) = N(s | y, tau^-1)
/// ```
///
/// Parameter: `y`. Argument group: bivariate precision.
///
/// Integrating `s` out analytically leaves a one-dimensional integral over
/// the scaled precision `v = rho tau`, with negative log weight
///
/// ```text
/// h(v) = log(1+v)/2 - (a - 1/2) log v - xi/(2 (1+v)) + (c/rho) v + const,
/// xi   = (mu - y)^2 / rho
/// ```
///
/// Moments of `kappa = v/(1+v)` give the Gaussian match, moments of `v`
/// the Gamma match. For `a > 1/2` the integrand mode is interior and the
/// integral is normalized there (the mode is a root of a cubic, found with
/// the bracketed Newton solver); for `a <= 1/2` the mode sits at the
/// origin and no transformation is applied.
pub struct GaussianPrecision {
    y: f64,
    quad: Arc<dyn QuadratureProvider>,
    acc: f64,
    facc: f64,
}

struct TauIntegrand {
    a: f64,
    cdrho: f64,
    xi: f64,
    cnst: f64,
}

impl TauIntegrand {
    fn new(a: f64, cdrho: f64, xi: f64) -> Self {
        TauIntegrand {
            a,
            cdrho,
            xi,
            cnst: 0.5 * xi - a * cdrho.ln() + specfun::ln_gamma(a),
        }
    }

    fn h(&self, v: f64) -> f64 {
        0.5 * v.ln_1p() - (self.a - 0.5) * v.ln() - 0.5 * self.xi / (1.0 + v)
            + self.cdrho * v
            + self.cnst
    }

    fn dh(&self, v: f64) -> f64 {
        let vp1 = 1.0 + v;
        0.5 / vp1 - (self.a - 0.5) / v + 0.5 * self.xi / (vp1 * vp1) + self.cdrho
    }

    fn d2h(&self, v: f64) -> f64 {
        let vp1 = 1.0 + v;
        (self.a - 0.5) / (v * v) - (0.5 + self.xi / vp1) / (vp1 * vp1)
    }
}

impl GaussianPrecision {
    pub fn new(y: f64, quad: Arc<dyn QuadratureProvider>) -> Self {
        GaussianPrecision {
            y,
            quad,
            acc: 1e-9,
            facc: 1e-11,
        }
    }
}

impl EpPotential for GaussianPrecision {
    fn num_pars(&self) -> usize {
        1
    }

    fn get_pars(&self, pv: &mut [f64]) {
        pv[0] = self.y;
    }

    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
        require!(pv[0].is_finite(), InvalidParameter: "observation must be finite");
        self.y = pv[0];
        Ok(())
    }

    fn is_valid_pars(&self, pv: &[f64]) -> bool {
        pv[0].is_finite()
    }

    fn is_log_concave(&self) -> bool {
        false
    }

    fn argument_group(&self) -> ArgumentGroup {
        ArgumentGroup::BivariatePrecision
    }

    fn moments(&self, _cavity: &GaussianCavity, _eta: f64) -> Option<Moments> {
        // Univariate updates are meaningless for this family.
        None
    }

    fn precision_moments(
        &self,
        cavity: &GaussianCavity,
        tau: &GammaCavity,
        eta: f64,
    ) -> Option<PrecisionMoments> {
        if eta != 1.0 {
            return None;
        }
        let (cmu, crho) = (cavity.mean, cavity.var);
        let (ca, cc) = (tau.shape, tau.rate);
        if crho < 1e-14 || ca < 1e-14 || cc < 1e-14 {
            return None;
        }
        let diff = cmu - self.y;
        let integrand = TauIntegrand::new(ca, cc / crho, diff * diff / crho);

        // Mode normalization for an interior mode only.
        let (vstar, sigma) = if ca > 0.5001 {
            // dh < 0 at this left end, dh -> cdrho > 0 at infinity.
            let l = (ca - 0.5) / (integrand.cdrho + integrand.xi + ca + 1.0);
            let mut f = |v: f64| (integrand.dh(v), integrand.d2h(v));
            let vstar = newton_solve(&mut f, l, None, self.acc, self.facc)?;
            let d2 = integrand.d2h(vstar);
            let sigma = if d2 < -1e-10 {
                1.0
            } else {
                1.0 / (d2 + 1e-8).sqrt()
            };
            (vstar, sigma)
        } else {
            (0.0, 1.0)
        };
        let h_star = integrand.h(vstar);

        let domain = Interval {
            lower: super::Bound::Finite(-vstar / sigma),
            upper: super::Bound::Infinite,
        };
        let weighted = |x: f64, g: &dyn Fn(f64) -> f64, norm: f64| {
            let v = vstar + sigma * x;
            if v <= 0.0 {
                0.0
            } else {
                g(v) * (norm - integrand.h(v)).exp()
            }
        };

        let z_til = self
            .quad
            .integrate(&mut |x| weighted(x, &|_| 1.0, h_star), &domain, &[])?;
        if z_til < 1e-12 {
            return None;
        }
        let norm = h_star - z_til.ln();
        let kappa = |v: f64| v / (1.0 + v);
        let e_k = self
            .quad
            .integrate(&mut |x| weighted(x, &kappa, norm), &domain, &[])?;
        let e_k2 = self
            .quad
            .integrate(&mut |x| weighted(x, &|v| kappa(v) * kappa(v), norm), &domain, &[])?;
        let e_v = self
            .quad
            .integrate(&mut |x| weighted(x, &|v| v, norm), &domain, &[])?;
        let e_v2 = self
            .quad
            .integrate(&mut |x| weighted(x, &|v| v * v, norm), &domain, &[])?;

        // Gaussian part: E[s | tau] = mu + (y - mu) kappa,
        // Var[s | tau] = rho (1 - kappa).
        let alpha = -diff * e_k / crho;
        let hrho = crho * (1.0 - e_k) + diff * diff * (e_k2 - e_k * e_k);
        let nu = (1.0 - hrho / crho) / crho;

        // Gamma match on tau = v / rho.
        let tau_mean = e_v / crho;
        let tau_var = (e_v2 - e_v * e_v) / (crho * crho);
        if tau_var <= 0.0 || tau_mean <= 0.0 {
            return None;
        }
        let a_hat = tau_mean * tau_mean / tau_var;
        let c_hat = tau_mean / tau_var;

        let log_z =
            z_til.ln() - h_star + sigma.ln() - 0.5 * (crho.ln() + specfun::LN_2PI);
        Some(PrecisionMoments {
            alpha,
            nu,
            a_hat,
            c_hat,
            log_z,
        })
    }
}
