use crate::potential::{EpPotential, GaussianCavity, Moments};
use factep_core::specfun;
use factep_error::{EpResult, require};

/// Spike-and-slab potential with a Gaussian slab
///
/// ```text
/// t(s) = (1 - p) delta_0(s) + p N(s | 0, v),   c = log(p / (1 - p))
/// ```
///
/// Parameters: `c` (logit of the slab probability), `v > 0`.
pub struct SpikeSlab {
    logit_p: f64,
    v: f64,
}

impl SpikeSlab {
    pub fn new(logit_p: f64, v: f64) -> EpResult<Self> {
        require!(v >= 1e-12, InvalidParameter: "slab variance {} too small", v);
        Ok(SpikeSlab { logit_p, v })
    }
}

impl Default for SpikeSlab {
    fn default() -> Self {
        SpikeSlab {
            logit_p: 0.0,
            v: 1.0,
        }
    }
}

impl EpPotential for SpikeSlab {
    fn num_pars(&self) -> usize {
        2
    }

    fn get_pars(&self, pv: &mut [f64]) {
        pv[0] = self.logit_p;
        pv[1] = self.v;
    }

    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
        require!(self.is_valid_pars(pv), InvalidParameter: "slab variance {} too small", pv[1]);
        self.logit_p = pv[0];
        self.v = pv[1];
        Ok(())
    }

    fn is_valid_pars(&self, pv: &[f64]) -> bool {
        pv[1] >= 1e-12
    }

    fn is_log_concave(&self) -> bool {
        false
    }

    // Two-branch mixture of the point mass and the slab; r2 is the
    // posterior slab responsibility, computed against the unnormalized
    // cavity like the Gaussian mixture.
    fn moments(&self, cavity: &GaussianCavity, eta: f64) -> Option<Moments> {
        if eta != 1.0 || cavity.var < 1e-16 {
            return None;
        }
        let cpi = 1.0 / cavity.var;
        let cbeta = cavity.mean / cavity.var;
        if 1.0 + cpi * self.v < 1e-16 {
            return None;
        }
        let bmsq = cbeta * cbeta;
        let rho2 = self.v / (1.0 + cpi * self.v);
        // log(Z_2 / (1 - p)); Z_1 = 1 - p.
        let t = self.logit_p + 0.5 * (rho2 * bmsq - (cpi * self.v).ln_1p());
        let t_exp = (-t).exp();
        let r2 = 1.0 / (1.0 + t_exp);
        let z2m1 = -rho2 * cpi; // z_2 - 1
        let log_zh = t_exp.ln_1p() + t - self.logit_p.exp().ln_1p();
        let a_til = 1.0 + r2 * z2m1;
        let alpha = -cbeta * a_til;
        let nu = a_til * cpi - bmsq * r2 * (1.0 - r2) * z2m1 * z2m1;
        let log_z = log_zh - 0.5 * (cbeta * cavity.mean + cavity.var.ln() + specfun::LN_2PI);
        Some(Moments { alpha, nu, log_z })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Numerical reference: the spike contributes N(0 | cmu, crho) to Z
    /// and nothing to the moments; the slab part is a Gaussian product.
    fn reference(pot: &SpikeSlab, cmu: f64, crho: f64) -> (f64, f64, f64) {
        let p = 1.0 / (1.0 + (-pot.logit_p).exp());
        let z1 = (1.0 - p) * (specfun::log_pdf_normal(cmu / crho.sqrt())).exp() / crho.sqrt();
        let var_sum = crho + pot.v;
        let z2 = p * (-0.5 * (cmu * cmu / var_sum + var_sum.ln() + specfun::LN_2PI)).exp();
        let z = z1 + z2;
        // Slab posterior moments.
        let post_var = 1.0 / (1.0 / crho + 1.0 / pot.v);
        let post_mean = post_var * (cmu / crho);
        let mean = z2 / z * post_mean;
        let second = z2 / z * (post_var + post_mean * post_mean);
        (z.ln(), mean, second - mean * mean)
    }

    #[test]
    fn test_moments_match_closed_form_mixture() {
        let pot = SpikeSlab::new(0.4, 2.0).unwrap();
        for &(cmu, crho) in &[(0.0, 1.0), (1.2, 0.7), (-2.5, 3.0)] {
            let cav = GaussianCavity { mean: cmu, var: crho };
            let m = pot.moments(&cav, 1.0).unwrap();
            let (log_z, mean, var) = reference(&pot, cmu, crho);
            assert!((m.log_z - log_z).abs() < 1e-10, "log_z at ({cmu}, {crho})");
            assert!(((cmu + m.alpha * crho) - mean).abs() < 1e-10);
            assert!(((crho * (1.0 - m.nu * crho)) - var).abs() < 1e-10);
        }
    }

    #[test]
    fn test_strong_spike_shrinks_hard() {
        // p -> 0: the posterior collapses onto the spike at 0.
        let pot = SpikeSlab::new(-12.0, 1.0).unwrap();
        let cav = GaussianCavity { mean: 1.0, var: 1.0 };
        let m = pot.moments(&cav, 1.0).unwrap();
        let post_mean = cav.mean + m.alpha * cav.var;
        assert!(post_mean.abs() < 1e-3);
    }

    #[test]
    fn test_eta_and_degenerate_cavity_rejected() {
        let pot = SpikeSlab::default();
        assert!(pot.moments(&GaussianCavity { mean: 0.0, var: 1.0 }, 0.5).is_none());
        assert!(pot.moments(&GaussianCavity { mean: 0.0, var: 0.0 }, 1.0).is_none());
    }
}
