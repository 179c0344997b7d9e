use super::quantile::quantile_moments;
use crate::potential::{EpPotential, GaussianCavity, Moments};
use factep_error::{EpResult, require};

/// Laplace (double exponential) potential
/// `t(s) = (tau/2) exp(-tau |y - s|)`, parameters `y`, `tau > 0`.
///
/// Symmetric special case of the quantile potential: `t(s)^eta` equals
/// `(tau/2)^eta` times the quantile kernel with `kappa = 1/2` and
/// `xi = 2 eta tau`.
pub struct Laplace {
    y: f64,
    tau: f64,
}

impl Laplace {
    pub fn new(y: f64, tau: f64) -> EpResult<Self> {
        require!(tau >= 1e-12, InvalidParameter: "Laplace rate {} too small", tau);
        Ok(Laplace { y, tau })
    }
}

impl Default for Laplace {
    fn default() -> Self {
        Laplace { y: 0.0, tau: 1.0 }
    }
}

impl EpPotential for Laplace {
    fn num_pars(&self) -> usize {
        2
    }

    fn get_pars(&self, pv: &mut [f64]) {
        pv[0] = self.y;
        pv[1] = self.tau;
    }

    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
        require!(self.is_valid_pars(pv), InvalidParameter: "Laplace rate {} too small", pv[1]);
        self.y = pv[0];
        self.tau = pv[1];
        Ok(())
    }

    fn is_valid_pars(&self, pv: &[f64]) -> bool {
        pv[1] >= 1e-12
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
        let m = quantile_moments(cavity.mean, cavity.var, 2.0 * eta * self.tau, self.y, 0.5)?;
        Some(Moments {
            log_z: m.log_z + eta * (0.5 * self.tau).ln(),
            ..m
        })
    }
}
