use crate::potential::{EpPotential, GaussianCavity, Moments};
use factep_core::specfun;
use factep_error::{EpResult, require};

/// Zero-mean Gaussian mixture potential
///
/// ```text
/// t(s) = sum_l p_l N(s | 0, v_l),   L >= 2, v_l > 0,
/// p_l  = exp(c_l) / sum_k exp(c_k),  c_{L-1} = 0
/// ```
///
/// Parameters: `[L, c_0 .. c_{L-2}, v_0 .. v_{L-1}]` (2L values). The
/// component count `L` is a construction parameter. Spikes are not
/// allowed, every variance must be positive.
///
/// All expectations are accumulated on the log scale; the internal
/// computation runs on the unnormalized cavity `exp(cbeta s - cpi s^2/2)`
/// and is well defined as long as `1 + cpi * max_l v_l` stays positive.
pub struct GaussMixture {
    log_p: Vec<f64>,
    vars: Vec<f64>,
    max_v: f64,
    lse_c: f64,
}

impl GaussMixture {
    /// Default-construct with `num_components` equal-weight unit-variance
    /// components.
    pub fn new(num_components: usize) -> EpResult<Self> {
        require!(num_components >= 2, InvalidParameter: "mixture needs at least 2 components");
        Ok(GaussMixture {
            log_p: vec![0.0; num_components],
            vars: vec![1.0; num_components],
            max_v: 1.0,
            lse_c: (num_components as f64).ln(),
        })
    }

    pub fn num_components(&self) -> usize {
        self.vars.len()
    }

    /// Set the L-1 free mixing weights `c_l` (the last one is pinned to 0).
    pub fn set_c_vals(&mut self, cv: &[f64]) -> EpResult<()> {
        let l = self.vars.len();
        require!(cv.len() == l - 1, InvalidParameter: "need {} mixing weights", l - 1);
        self.log_p[..l - 1].copy_from_slice(cv);
        debug_assert_eq!(self.log_p[l - 1], 0.0);
        self.lse_c = specfun::logsumexp(&self.log_p);
        Ok(())
    }

    pub fn set_variances(&mut self, v: &[f64]) -> EpResult<()> {
        let l = self.vars.len();
        require!(v.len() == l, InvalidParameter: "need {} variances", l);
        let min = v.iter().cloned().fold(f64::INFINITY, f64::min);
        require!(min >= 1e-16, InvalidParameter: "mixture variance {} too small", min);
        self.vars.copy_from_slice(v);
        self.max_v = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Ok(())
    }

    /// Moment match against the unnormalized cavity; `log_z` is relative
    /// to that cavity and is corrected by the caller.
    fn moments_natural(&self, cbeta: f64, cpi: f64) -> Option<(f64, f64, f64)> {
        let numl = self.vars.len();
        if 1.0 + cpi * self.max_v < 1e-16 {
            return None;
        }
        let bmsq = cbeta * cbeta;
        // First pass: log Z_l per component, plus running maxima of the
        // three accumulators (Z, E[z], E[z^2]; z_l = 1/(1 + cpi v_l)).
        let mut log_zl = vec![0.0; numl];
        let (mut mxlz, mut mxla, mut mxla2) = (0.0, 0.0, 0.0);
        for l in 0..numl {
            let vl = self.vars[l];
            let log_z = -(cpi * vl).ln_1p();
            let mut t = self.log_p[l] - self.lse_c + 0.5 * (bmsq * vl / (1.0 + cpi * vl) + log_z);
            log_zl[l] = t;
            if l == 0 || t > mxlz {
                mxlz = t;
            }
            t += log_z;
            if l == 0 || t > mxla {
                mxla = t;
            }
            t += log_z;
            if l == 0 || t > mxla2 {
                mxla2 = t;
            }
        }
        // Second pass: accumulate against the maxima.
        let (mut z, mut a, mut a2) = (0.0, 0.0, 0.0);
        for l in 0..numl {
            let log_z = -(cpi * self.vars[l]).ln_1p();
            let mut t = log_zl[l];
            z += (t - mxlz).exp();
            t += log_z;
            a += (t - mxla).exp();
            t += log_z;
            a2 += (t - mxla2).exp();
        }
        let log_zh = z.ln() + mxlz;
        let a_til = (a.ln() + mxla - log_zh).exp();
        let a2_til = (a2.ln() + mxla2 - log_zh).exp();
        let alpha = -cbeta * a_til;
        let nu = a_til * cpi - bmsq * a2_til + alpha * alpha;
        Some((alpha, nu, log_zh))
    }
}

impl EpPotential for GaussMixture {
    fn num_pars(&self) -> usize {
        2 * self.vars.len()
    }

    fn num_const_pars(&self) -> usize {
        1
    }

    fn get_pars(&self, pv: &mut [f64]) {
        let numl = self.vars.len();
        pv[0] = numl as f64;
        pv[1..numl].copy_from_slice(&self.log_p[..numl - 1]);
        pv[numl..2 * numl].copy_from_slice(&self.vars);
    }

    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
        let numl = self.vars.len();
        require!(
            self.is_valid_pars(pv),
            InvalidParameter: "invalid mixture parameters for {} components", numl
        );
        self.set_c_vals(&pv[1..numl])?;
        self.set_variances(&pv[numl..2 * numl])
    }

    fn is_valid_pars(&self, pv: &[f64]) -> bool {
        let numl = self.vars.len();
        if pv.len() < 2 * numl {
            return false;
        }
        if pv[0] != numl as f64 {
            return false;
        }
        pv[numl..2 * numl].iter().all(|&v| v >= 1e-16)
    }

    fn is_log_concave(&self) -> bool {
        false
    }

    fn moments(&self, cavity: &GaussianCavity, eta: f64) -> Option<Moments> {
        if eta != 1.0 || cavity.var < 1e-16 {
            return None;
        }
        let cpi = 1.0 / cavity.var;
        let cbeta = cavity.mean / cavity.var;
        let (alpha, nu, log_zh) = self.moments_natural(cbeta, cpi)?;
        // Correct log Z for the unnormalized cavity.
        let log_z =
            log_zh - 0.5 * (cbeta * cavity.mean + cavity.var.ln() + specfun::LN_2PI);
        Some(Moments { alpha, nu, log_z })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(pot: &GaussMixture, cmu: f64, crho: f64) -> (f64, f64, f64) {
        let sd = crho.sqrt();
        let n = 400_001;
        let (lo, hi) = (-25.0, 25.0);
        let h = (hi - lo) / (n - 1) as f64;
        let weights: Vec<f64> = pot.log_p.iter().map(|c| (c - pot.lse_c).exp()).collect();
        let (mut z, mut m1, mut m2) = (0.0, 0.0, 0.0);
        for idx in 0..n {
            let s = lo + idx as f64 * h;
            let t: f64 = weights
                .iter()
                .zip(&pot.vars)
                .map(|(&p, &v)| p * (-0.5 * s * s / v).exp() / (v * 2.0 * std::f64::consts::PI).sqrt())
                .sum();
            let w = t * (specfun::log_pdf_normal((s - cmu) / sd)).exp() / sd;
            z += w;
            m1 += w * s;
            m2 += w * s * s;
        }
        m1 /= z;
        m2 /= z;
        ((z * h).ln(), m1, m2 - m1 * m1)
    }

    fn two_component() -> GaussMixture {
        let mut pot = GaussMixture::new(2).unwrap();
        pot.set_pars(&[2.0, 1.2, 0.25, 4.0]).unwrap();
        pot
    }

    #[test]
    fn test_moments_match_numerical_integration() {
        let pot = two_component();
        for &(cmu, crho) in &[(0.0, 1.0), (1.5, 0.5), (-0.7, 3.0)] {
            let cav = GaussianCavity { mean: cmu, var: crho };
            let m = pot.moments(&cav, 1.0).unwrap();
            let (log_z, mean, var) = brute_force(&pot, cmu, crho);
            assert!((m.log_z - log_z).abs() < 1e-6, "log_z at ({cmu}, {crho})");
            assert!(((cmu + m.alpha * crho) - mean).abs() < 1e-6);
            assert!(((crho * (1.0 - m.nu * crho)) - var).abs() < 1e-6);
        }
    }

    #[test]
    fn test_equal_components_collapse_to_gaussian() {
        // Both components N(0, 2): the mixture is a single Gaussian and
        // the match must agree with the Gaussian potential.
        let mut pot = GaussMixture::new(2).unwrap();
        pot.set_pars(&[2.0, 0.0, 2.0, 2.0]).unwrap();
        let cav = GaussianCavity { mean: 0.8, var: 1.5 };
        let m = pot.moments(&cav, 1.0).unwrap();
        let nu_expect = 1.0 / (1.5 + 2.0);
        let alpha_expect = nu_expect * (0.0 - 0.8);
        assert!((m.nu - nu_expect).abs() < 1e-10);
        assert!((m.alpha - alpha_expect).abs() < 1e-10);
    }

    #[test]
    fn test_construction_parameter_checks() {
        assert!(GaussMixture::new(1).is_err());
        let pot = two_component();
        assert_eq!(pot.num_pars(), 4);
        assert_eq!(pot.num_const_pars(), 1);
        // Wrong component count in slot 0 is invalid.
        assert!(!pot.is_valid_pars(&[3.0, 1.2, 0.25, 4.0]));
        // Spike variances are rejected.
        assert!(!pot.is_valid_pars(&[2.0, 1.2, 0.0, 4.0]));
        let mut pv = [0.0; 4];
        pot.get_pars(&mut pv);
        assert_eq!(pv, [2.0, 1.2, 0.25, 4.0]);
    }
}
