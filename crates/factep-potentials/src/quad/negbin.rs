use super::{Interval, QuadPotential, proximal_newton};
use factep_core::specfun;
use factep_error::{EpResult, require};

/// Negative binomial potential with exponential rate
///
/// ```text
/// t(s) = C (1 - p(s))^r p(s)^y,   p(s) = lam(s) / (r + lam(s)),
/// lam(s) = exp(s),                C = Gamma(r+y) / (Gamma(y+1) Gamma(r))
/// ```
///
/// Parameters: `y` (nonnegative integer), `r > 0`. `l(s)` is the scaled
/// logistic loss `(y + r) log(1 + e^(s - log r)) - y s` up to constants,
/// evaluated in the numerically favorable branch on either side of
/// `log r`.
pub struct NegBinomialExpRate {
    y: f64,
    r: f64,
    log_const: f64,
    acc: f64,
    facc: f64,
}

impl NegBinomialExpRate {
    pub fn new(y: f64, r: f64) -> EpResult<Self> {
        let mut pot = NegBinomialExpRate {
            y: 0.0,
            r: 1.0,
            log_const: 0.0,
            acc: 1e-7,
            facc: 1e-7,
        };
        pot.set_pars(&[y, r])?;
        Ok(pot)
    }

    fn sigma(&self, s: f64) -> f64 {
        let lgr = self.r.ln();
        if s >= lgr {
            1.0 / (1.0 + (lgr - s).exp())
        } else {
            let t = (s - lgr).exp();
            t / (1.0 + t)
        }
    }
}

impl QuadPotential for NegBinomialExpRate {
    fn num_pars(&self) -> usize {
        2
    }

    fn get_pars(&self, pv: &mut [f64]) {
        pv[0] = self.y;
        pv[1] = self.r;
    }

    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
        require!(
            self.is_valid_pars(pv),
            InvalidParameter: "invalid negative binomial parameters (y={}, r={})", pv[0], pv[1]
        );
        self.y = pv[0];
        self.r = pv[1];
        self.log_const = specfun::ln_gamma(self.r + self.y)
            - specfun::ln_gamma(self.y + 1.0)
            - specfun::ln_gamma(self.r)
            + self.r * self.r.ln();
        Ok(())
    }

    fn is_valid_pars(&self, pv: &[f64]) -> bool {
        pv[0] >= 0.0 && pv[0].fract() == 0.0 && pv[0].is_finite() && pv[1] > 1e-12
    }

    fn is_log_concave(&self) -> bool {
        true
    }

    fn eval(&self, s: f64) -> f64 {
        let lgr = self.r.ln();
        if s >= lgr {
            self.r * s + (self.r + self.y) * (lgr - s).exp().ln_1p() - self.log_const
        } else {
            -self.y * s + (self.r + self.y) * (lgr + (s - lgr).exp().ln_1p()) - self.log_const
        }
    }

    fn eval_grad(&self, s: f64) -> (f64, f64, f64) {
        let sig = self.sigma(s);
        let dl = (self.y + self.r) * sig - self.y;
        let ddl = (self.y + self.r) * sig * (1.0 - sig);
        (self.eval(s), dl, ddl)
    }

    fn interval(&self) -> (Interval, Vec<f64>) {
        (Interval::all(), Vec::new())
    }

    /// `l'` runs from `-y` to `r`, so `[h - r rho, h + y rho]` brackets
    /// the stationarity condition.
    fn proximal(&self, h: f64, rho: f64) -> Option<f64> {
        if rho < 1e-16 {
            return None;
        }
        let l = h - self.r * rho;
        let r = h + self.y * rho;
        proximal_newton(self, h, rho, l, (r > l).then_some(r), self.acc, self.facc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::potential::{EpPotential, GaussianCavity};
    use crate::quad::{AdaptiveSimpson, LaplaceQuad};
    use std::sync::Arc;

    #[test]
    fn test_eval_matches_direct_log_likelihood() {
        let pot = NegBinomialExpRate::new(3.0, 2.5).unwrap();
        for &s in &[-2.0_f64, 0.0, 0.5, 3.0] {
            let lam = s.exp();
            let p = lam / (2.5 + lam);
            let log_c = specfun::ln_gamma(2.5 + 3.0)
                - specfun::ln_gamma(4.0)
                - specfun::ln_gamma(2.5);
            let log_t = log_c + 2.5 * (1.0 - p).ln() + 3.0 * p.ln();
            assert!((pot.eval(s) + log_t).abs() < 1e-10, "s={s}");
        }
    }

    #[test]
    fn test_grad_consistent_with_finite_differences() {
        let pot = NegBinomialExpRate::new(2.0, 1.5).unwrap();
        let eps = 1e-6;
        for &s in &[-1.0, 0.4, 2.0] {
            let (_, dl, ddl) = pot.eval_grad(s);
            let num_dl = (pot.eval(s + eps) - pot.eval(s - eps)) / (2.0 * eps);
            let num_ddl = (pot.eval(s + eps) - 2.0 * pot.eval(s) + pot.eval(s - eps)) / (eps * eps);
            assert!((dl - num_dl).abs() < 1e-6);
            assert!((ddl - num_ddl).abs() < 1e-3);
        }
    }

    #[test]
    fn test_moments_match_grid() {
        let quad = Arc::new(AdaptiveSimpson::default());
        let pot = LaplaceQuad::new(NegBinomialExpRate::new(4.0, 2.0).unwrap(), quad).unwrap();
        let cav = GaussianCavity { mean: 0.0, var: 1.0 };
        let m = pot.moments(&cav, 1.0).unwrap();

        let inner = NegBinomialExpRate::new(4.0, 2.0).unwrap();
        let n = 400_001;
        let (lo, hi) = (-26.0, 26.0);
        let h = (hi - lo) / (n - 1) as f64;
        let (mut z, mut m1, mut m2) = (0.0, 0.0, 0.0);
        for idx in 0..n {
            let s = lo + idx as f64 * h;
            let w = (-inner.eval(s) + specfun::log_pdf_normal(s)).exp();
            z += w;
            m1 += w * s;
            m2 += w * s * s;
        }
        m1 /= z;
        m2 /= z;
        let var = m2 - m1 * m1;
        assert!((m.log_z - (z * h).ln()).abs() < 1e-5);
        assert!(((cav.mean + m.alpha * cav.var) - m1).abs() < 1e-5);
        assert!(((cav.var * (1.0 - m.nu * cav.var)) - var).abs() < 1e-5);
    }
}
