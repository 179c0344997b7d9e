use super::{Bound, Interval, QuadPotential, QuadratureProvider};
use crate::potential::{EpPotential, GaussianCavity, Moments};
use factep_core::specfun;
use factep_error::{EpResult, require};
use std::sync::Arc;

/// EP moment service for a [QuadPotential], via numerical quadrature with
/// a Laplace-style transformation of the integration variable.
///
/// The integrand for the normalizer is
///
/// ```text
/// h(s) = eta l(s) + (s - mu)^2 / (2 rho)
/// ```
///
/// Its minimizer (the proximal map) is pulled outside as `exp(-h(s*))` to
/// counter underflow, and the variable is standardized with the curvature
/// `h''(s*)`, falling back to `sqrt(rho)` when the mode sits on a critical
/// point or the curvature is unusable. Zeroth, first and second moments of
/// the transformed integrand then give `log Z`, `alpha` and `nu`.
pub struct LaplaceQuad<P> {
    pot: P,
    quad: Arc<dyn QuadratureProvider>,
}

impl<P: QuadPotential> LaplaceQuad<P> {
    pub fn new(pot: P, quad: Arc<dyn QuadratureProvider>) -> EpResult<Self> {
        require!(
            pot.has_derivatives(),
            InvalidConfig: "quadrature transformation needs second derivatives"
        );
        let (interval, waypoints) = pot.interval();
        if let (Bound::Finite(a), Bound::Finite(b)) = (interval.lower, interval.upper) {
            require!(a < b, InvalidConfig: "integration interval is empty");
        }
        for w in waypoints.windows(2) {
            require!(w[0] < w[1], InvalidConfig: "way-point list must be increasing");
        }
        Ok(LaplaceQuad { pot, quad })
    }

    pub fn inner(&self) -> &P {
        &self.pot
    }
}

impl<P: QuadPotential> EpPotential for LaplaceQuad<P> {
    fn num_pars(&self) -> usize {
        self.pot.num_pars()
    }

    fn num_const_pars(&self) -> usize {
        self.pot.num_const_pars()
    }

    fn get_pars(&self, pv: &mut [f64]) {
        self.pot.get_pars(pv)
    }

    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
        self.pot.set_pars(pv)
    }

    fn is_valid_pars(&self, pv: &[f64]) -> bool {
        self.pot.is_valid_pars(pv)
    }

    fn is_log_concave(&self) -> bool {
        self.pot.is_log_concave()
    }

    fn supports_fractional(&self) -> bool {
        true
    }

    fn moments(&self, cavity: &GaussianCavity, eta: f64) -> Option<Moments> {
        let (cmu, crho) = (cavity.mean, cavity.var);
        if crho < 1e-14 || eta < 1e-10 || eta > 1.0 {
            return None;
        }
        let sstar = self.pot.proximal(cmu, eta * crho)?;

        let (interval, mut waypoints) = self.pot.interval();
        // Standardizing with the curvature is only sound where l is twice
        // differentiable; on or next to a critical point fall back to the
        // cavity scale.
        let mut is_critical = false;
        if let Bound::Finite(a) = interval.lower {
            is_critical |= (sstar - a).abs() < 1e-5;
        }
        if let Bound::Finite(b) = interval.upper {
            is_critical |= (sstar - b).abs() < 1e-5;
        }
        is_critical |= waypoints.iter().any(|w| (sstar - w).abs() < 1e-5);

        let h = |s: f64| {
            let d = s - cmu;
            eta * self.pot.eval(s) + 0.5 * d * d / crho
        };
        let sigma = if is_critical {
            crho.sqrt()
        } else {
            let (_, _, ddl) = self.pot.eval_grad(sstar);
            let d2h = eta * ddl + 1.0 / crho;
            if d2h < -1e-10 {
                crho.sqrt()
            } else {
                1.0 / (d2h + 1e-8).sqrt()
            }
        };
        let h_star = h(sstar);

        // Transformed interval and way-points.
        let map = |b: Bound| match b {
            Bound::Finite(v) => Bound::Finite((v - sstar) / sigma),
            Bound::Infinite => Bound::Infinite,
        };
        let t_interval = Interval {
            lower: map(interval.lower),
            upper: map(interval.upper),
        };
        for w in waypoints.iter_mut() {
            *w = (*w - sstar) / sigma;
        }

        let z_til = self.quad.integrate(
            &mut |x| (h_star - h(sstar + sigma * x)).exp(),
            &t_interval,
            &waypoints,
        )?;
        if z_til < 1e-12 {
            return None;
        }
        let log_z =
            z_til.ln() - h_star + sigma.ln() - 0.5 * (crho.ln() + specfun::LN_2PI);
        // Fold Z into the first and second moment integrands.
        let norm = h_star - z_til.ln();
        let ex1 = self.quad.integrate(
            &mut |x| x * (norm - h(sstar + sigma * x)).exp(),
            &t_interval,
            &waypoints,
        )?;
        let ex2 = self.quad.integrate(
            &mut |x| x * x * (norm - h(sstar + sigma * x)).exp(),
            &t_interval,
            &waypoints,
        )?;

        let alpha = (sigma * ex1 + sstar - cmu) / crho;
        let var = ex2 - ex1 * ex1;
        let nu = (1.0 - var * sigma * sigma / crho) / crho;
        Some(Moments { alpha, nu, log_z })
    }
}
