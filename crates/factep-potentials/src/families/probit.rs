use crate::potential::{EpPotential, GaussianCavity, Moments};
use crate::quad::{Interval, QuadPotential, proximal_newton};
use factep_core::specfun;
use factep_error::{EpResult, require};

/// Probit / Heaviside classification potential
///
/// ```text
/// t(s) = Phi(y (s + soff))       (hard_step = false)
/// t(s) = I{y (s + soff) >= 0}    (hard_step = true)
/// ```
///
/// `y` must be -1 or +1; parameters are `y` and `soff`, `hard_step` is a
/// type property (the Heaviside registry entry), not a parameter.
///
/// The soft probit also serves as a [QuadPotential], which gives the
/// quadrature stack a family with a known closed form to be checked
/// against.
pub struct Probit {
    y: f64,
    soff: f64,
    hard_step: bool,
    prox_acc: f64,
    prox_facc: f64,
}

impl Probit {
    pub fn new(y: f64, soff: f64, hard_step: bool) -> EpResult<Self> {
        require!(y == 1.0 || y == -1.0, InvalidParameter: "probit target {} must be -1 or +1", y);
        Ok(Probit {
            y,
            soff,
            hard_step,
            prox_acc: 1e-7,
            prox_facc: 1e-7,
        })
    }

    pub fn soft(y: f64, soff: f64) -> EpResult<Self> {
        Probit::new(y, soff, false)
    }

    pub fn hard(y: f64, soff: f64) -> EpResult<Self> {
        Probit::new(y, soff, true)
    }

    pub fn hard_step(&self) -> bool {
        self.hard_step
    }
}

impl Default for Probit {
    fn default() -> Self {
        Probit {
            y: 1.0,
            soff: 0.0,
            hard_step: false,
            prox_acc: 1e-7,
            prox_facc: 1e-7,
        }
    }
}

impl EpPotential for Probit {
    fn num_pars(&self) -> usize {
        2
    }

    fn get_pars(&self, pv: &mut [f64]) {
        pv[0] = self.y;
        pv[1] = self.soff;
    }

    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
        require!(EpPotential::is_valid_pars(self, pv), InvalidParameter: "probit target {} must be -1 or +1", pv[0]);
        self.y = pv[0];
        self.soff = pv[1];
        Ok(())
    }

    fn is_valid_pars(&self, pv: &[f64]) -> bool {
        pv[0] == 1.0 || pv[0] == -1.0
    }

    fn is_log_concave(&self) -> bool {
        true
    }

    // The offset enters log Z and its derivatives through mu + soff; the
    // hard step drops the +1 smoothing of the effective variance.
    fn moments(&self, cavity: &GaussianCavity, eta: f64) -> Option<Moments> {
        if eta != 1.0 {
            return None;
        }
        if cavity.var <= 0.0 || (self.hard_step && cavity.var <= 1e-12) {
            return None;
        }
        let mean_off = cavity.mean + self.soff;
        let varp1 = if self.hard_step {
            cavity.var
        } else {
            cavity.var + 1.0
        };
        let fct = self.y / varp1.sqrt();
        let z = mean_off * fct;
        let log_z = specfun::log_cdf_normal(z);
        let alpha = fct * specfun::deriv_log_cdf_normal(z);
        let nu = alpha * (alpha + mean_off / varp1);
        Some(Moments { alpha, nu, log_z })
    }
}

impl QuadPotential for Probit {
    fn num_pars(&self) -> usize {
        2
    }

    fn get_pars(&self, pv: &mut [f64]) {
        EpPotential::get_pars(self, pv)
    }

    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
        EpPotential::set_pars(self, pv)
    }

    fn is_valid_pars(&self, pv: &[f64]) -> bool {
        EpPotential::is_valid_pars(self, pv)
    }

    fn is_log_concave(&self) -> bool {
        true
    }

    fn has_derivatives(&self) -> bool {
        !self.hard_step
    }

    fn eval(&self, s: f64) -> f64 {
        -specfun::log_cdf_normal(self.y * (s + self.soff))
    }

    fn eval_grad(&self, s: f64) -> (f64, f64, f64) {
        let arg = self.y * (s + self.soff);
        let dl = -self.y * specfun::deriv_log_cdf_normal(arg);
        let ddl = dl * (dl - arg * self.y);
        (self.eval(s), dl, ddl)
    }

    fn interval(&self) -> (Interval, Vec<f64>) {
        (Interval::all(), Vec::new())
    }

    fn proximal(&self, h: f64, rho: f64) -> Option<f64> {
        // Initial bracket from the linearized map: for arguments on the
        // wrong side of the step, the hazard is roughly linear and pulls
        // the minimizer to (h - rho soff)/(1 + rho).
        let c = rho * std::f64::consts::SQRT_2 / specfun::SQRT_PI;
        let arg = self.y * (h + self.soff);
        let mut l = if arg >= 0.0 {
            h
        } else {
            (h - rho * self.soff) / (1.0 + rho)
        };
        let mut r = if arg + c >= 0.0 {
            h + self.y * c
        } else {
            (h - rho * self.soff + self.y * c) / (1.0 + rho)
        };
        if r < l {
            std::mem::swap(&mut l, &mut r);
        }
        proximal_newton(
            self,
            h,
            rho,
            l,
            (r > l).then_some(r),
            self.prox_acc,
            self.prox_facc,
        )
    }
}
