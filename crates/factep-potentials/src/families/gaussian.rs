use crate::potential::{EpPotential, GaussianCavity, Moments};
use factep_core::specfun;
use factep_error::{EpResult, require};

/// Gaussian observation potential `t(s) = N(s | y, ssq)`.
///
/// Parameters: `y` (mean), `ssq` (variance). Everything is closed form,
/// including the natural-parameter path, which is exact for any cavity
/// precision `cpi >= 0` because the tilted distribution is itself Gaussian.
pub struct Gaussian {
    y: f64,
    ssq: f64,
}

impl Gaussian {
    pub fn new(y: f64, ssq: f64) -> EpResult<Self> {
        require!(ssq >= 1e-13, InvalidParameter: "Gaussian variance {} too small", ssq);
        Ok(Gaussian { y, ssq })
    }
}

impl Default for Gaussian {
    fn default() -> Self {
        Gaussian { y: 0.0, ssq: 1.0 }
    }
}

impl EpPotential for Gaussian {
    fn num_pars(&self) -> usize {
        2
    }

    fn get_pars(&self, pv: &mut [f64]) {
        pv[0] = self.y;
        pv[1] = self.ssq;
    }

    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
        require!(self.is_valid_pars(pv), InvalidParameter: "Gaussian variance {} too small", pv[1]);
        self.y = pv[0];
        self.ssq = pv[1];
        Ok(())
    }

    fn is_valid_pars(&self, pv: &[f64]) -> bool {
        pv[1] >= 1e-13
    }

    fn is_log_concave(&self) -> bool {
        true
    }

    fn supports_fractional(&self) -> bool {
        true
    }

    // t(s)^eta = N(s | y, ssq/eta) eta^{-1/2}, so
    // log Z(ssq, eta) = log Z(ssq/eta, 1) - log(eta)/2.
    fn moments(&self, cavity: &GaussianCavity, eta: f64) -> Option<Moments> {
        if cavity.var <= 0.0 || eta > 1.0 || eta <= 0.0 {
            return None;
        }
        let nu = 1.0 / (cavity.var + self.ssq / eta);
        let diff = self.y - cavity.mean;
        let alpha = nu * diff;
        let log_z = -0.5 * (nu * diff * diff - nu.ln() + specfun::LN_2PI + eta.ln());
        Some(Moments { alpha, nu, log_z })
    }

    fn natural_moments(&self, cbeta: f64, cpi: f64) -> Option<(f64, f64, f64)> {
        if cpi < 0.0 {
            return None;
        }
        // Product of Gaussians: natural parameters add.
        let pi_hat = cpi + 1.0 / self.ssq;
        let beta_hat = cbeta + self.y / self.ssq;
        // log Z relative to the normalized cavity; undefined (0) for an
        // improper cavity, where only the matched parameters matter.
        let log_z = if cpi > 0.0 {
            let var = 1.0 / cpi + self.ssq;
            let diff = self.y - cbeta / cpi;
            -0.5 * (diff * diff / var + var.ln() + specfun::LN_2PI)
        } else {
            0.0
        };
        Some((beta_hat, pi_hat, log_z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moments_closed_form() {
        // Cavity N(1, 2), observation N(s | 3, 0.5): the tilted posterior
        // is the Gaussian product with precision 1/2 + 2 and mean pulled
        // toward the observation.
        let pot = Gaussian::new(3.0, 0.5).unwrap();
        let cav = GaussianCavity { mean: 1.0, var: 2.0 };
        let m = pot.moments(&cav, 1.0).unwrap();

        let post_pi = 1.0 / 2.0 + 1.0 / 0.5;
        let post_mean = (1.0 / 2.0 * 1.0 + 3.0 / 0.5) / post_pi;
        let post_var = 1.0 / post_pi;
        assert!((cav.mean + m.alpha * cav.var - post_mean).abs() < 1e-12);
        assert!((cav.var * (1.0 - m.nu * cav.var) - post_var).abs() < 1e-12);

        // log Z = log N(y | mean, var + ssq)
        let z = -0.5 * ((3.0f64 - 1.0).powi(2) / 2.5 + (2.5f64).ln() + specfun::LN_2PI);
        assert!((m.log_z - z).abs() < 1e-12);
    }

    #[test]
    fn test_fractional_tempering() {
        let pot = Gaussian::new(0.0, 1.0).unwrap();
        let cav = GaussianCavity { mean: 0.5, var: 1.0 };
        let full = pot.moments(&cav, 1.0).unwrap();
        let half = pot.moments(&cav, 0.5).unwrap();
        // Tempering widens the effective observation variance.
        assert!(half.nu < full.nu);
        assert!((half.nu - 1.0 / (1.0 + 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_cavity_is_status_not_panic() {
        let pot = Gaussian::default();
        let cav = GaussianCavity { mean: 0.0, var: 0.0 };
        assert!(pot.moments(&cav, 1.0).is_none());
        assert!(pot.moments(&GaussianCavity { mean: 0.0, var: 1.0 }, 1.5).is_none());
    }

    #[test]
    fn test_natural_moments_accept_flat_cavity() {
        let pot = Gaussian::new(2.0, 0.5).unwrap();
        let (beta_hat, pi_hat, _) = pot.natural_moments(0.0, 0.0).unwrap();
        assert!((pi_hat - 2.0).abs() < 1e-12);
        assert!((beta_hat - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_natural_moments_agree_with_moment_path() {
        let pot = Gaussian::new(1.0, 2.0).unwrap();
        let (b1, p1, z1) = pot.natural_moments(0.6, 1.5).unwrap();
        // Default trait implementation goes through moments(); both paths
        // must agree on a proper cavity.
        struct ViaMoments(Gaussian);
        impl EpPotential for ViaMoments {
            fn num_pars(&self) -> usize {
                2
            }
            fn get_pars(&self, pv: &mut [f64]) {
                self.0.get_pars(pv)
            }
            fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
                self.0.set_pars(pv)
            }
            fn is_valid_pars(&self, pv: &[f64]) -> bool {
                self.0.is_valid_pars(pv)
            }
            fn is_log_concave(&self) -> bool {
                true
            }
            fn moments(&self, cavity: &GaussianCavity, eta: f64) -> Option<Moments> {
                self.0.moments(cavity, eta)
            }
        }
        let (b2, p2, z2) = ViaMoments(Gaussian::new(1.0, 2.0).unwrap())
            .natural_moments(0.6, 1.5)
            .unwrap();
        assert!((b1 - b2).abs() < 1e-10);
        assert!((p1 - p2).abs() < 1e-10);
        assert!((z1 - z2).abs() < 1e-10);
    }
}
