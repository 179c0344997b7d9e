//! Numerical quadrature collaborators for potentials without closed-form
//! moments.
//!
//! A quadrature-backed family describes itself through [QuadPotential]:
//! the negative log potential `l(s) = -log t(s)` with derivatives, the
//! integration interval with way-points where `l` is non-smooth, and the
//! proximal map used to normalize the integrand location. The
//! [crate::quad::LaplaceQuad] adapter turns any such family into a full
//! [crate::potential::EpPotential] by running three integrals against a
//! [QuadratureProvider].

mod adaptive;
mod gauss_prec;
mod negbin;
mod poisson;
mod solver;
mod transform;

pub use adaptive::AdaptiveSimpson;
pub use gauss_prec::GaussianPrecision;
pub use negbin::NegBinomialExpRate;
pub use poisson::{PoissonExpRate, PoissonLogisticRate};
pub use solver::newton_solve;
pub use transform::LaplaceQuad;

use factep_error::EpResult;

/// One end of an integration interval.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Bound {
    Finite(f64),
    Infinite,
}

/// Integration interval, possibly unbounded on either side.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Interval {
    pub lower: Bound,
    pub upper: Bound,
}

impl Interval {
    /// The whole real line.
    pub fn all() -> Self {
        Interval {
            lower: Bound::Infinite,
            upper: Bound::Infinite,
        }
    }

    pub fn from_lower(a: f64) -> Self {
        Interval {
            lower: Bound::Finite(a),
            upper: Bound::Infinite,
        }
    }
}

/// Numerical quadrature service.
///
/// `waypoints` lists interior points where the integrand is non-smooth
/// (strictly inside the interval, ascending); the provider splits the
/// domain there. Failure to converge is an expected runtime condition and
/// is reported as `None`, which moment routines translate into their own
/// failure signal.
pub trait QuadratureProvider {
    fn integrate(
        &self,
        f: &mut dyn FnMut(f64) -> f64,
        interval: &Interval,
        waypoints: &[f64],
    ) -> Option<f64>;
}

/// A potential integrated numerically: `l(s) = -log t(s)` plus the
/// services the quadrature adapter needs.
pub trait QuadPotential {
    fn num_pars(&self) -> usize;
    fn num_const_pars(&self) -> usize {
        0
    }
    fn get_pars(&self, pv: &mut [f64]);
    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()>;
    fn is_valid_pars(&self, pv: &[f64]) -> bool;
    fn is_log_concave(&self) -> bool;

    /// Are the derivatives in [QuadPotential::eval_grad] meaningful? The
    /// Laplace-transform adapter refuses families without them.
    fn has_derivatives(&self) -> bool {
        true
    }

    /// `l(s)`.
    fn eval(&self, s: f64) -> f64;

    /// `(l(s), l'(s), l''(s))`.
    fn eval_grad(&self, s: f64) -> (f64, f64, f64);

    /// Integration interval and interior way-points (ascending; empty for
    /// a smooth integrand).
    fn interval(&self) -> (Interval, Vec<f64>);

    /// Proximal map: `argmin_s rho l(s) + (s - h)^2 / 2`. Uniquely
    /// solvable for convex `l`; `None` on failure.
    fn proximal(&self, h: f64, rho: f64) -> Option<f64>;
}

/// Solve the proximal-map stationarity condition
/// `f(s) = rho l'(s) + s - h = 0` by bracketed Newton iteration.
///
/// `l` is the initial left bracket end with `f(l) < 0`; if `r` is `None`
/// the right end is searched automatically, which succeeds whenever `f`
/// is increasing to the right of `l` (convex `l`).
pub fn proximal_newton(
    pot: &(impl QuadPotential + ?Sized),
    h: f64,
    rho: f64,
    l: f64,
    r: Option<f64>,
    acc: f64,
    facc: f64,
) -> Option<f64> {
    if rho < 1e-16 {
        return None;
    }
    let mut f = |s: f64| {
        let (_, dl, ddl) = pot.eval_grad(s);
        (rho * dl + s - h, rho * ddl + 1.0)
    };
    newton_solve(&mut f, l, r, acc, facc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use factep_error::EpResult;

    /// l(s) = (s - 3)^2 / 2: proximal map has the closed form
    /// (h + 3 rho) / (1 + rho).
    struct Quadratic;

    impl QuadPotential for Quadratic {
        fn num_pars(&self) -> usize {
            0
        }
        fn get_pars(&self, _pv: &mut [f64]) {}
        fn set_pars(&mut self, _pv: &[f64]) -> EpResult<()> {
            Ok(())
        }
        fn is_valid_pars(&self, _pv: &[f64]) -> bool {
            true
        }
        fn is_log_concave(&self) -> bool {
            true
        }
        fn eval(&self, s: f64) -> f64 {
            0.5 * (s - 3.0) * (s - 3.0)
        }
        fn eval_grad(&self, s: f64) -> (f64, f64, f64) {
            (self.eval(s), s - 3.0, 1.0)
        }
        fn interval(&self) -> (Interval, Vec<f64>) {
            (Interval::all(), Vec::new())
        }
        fn proximal(&self, h: f64, rho: f64) -> Option<f64> {
            proximal_newton(self, h, rho, h.min(3.0) - 1.0, None, 1e-10, 1e-12)
        }
    }

    #[test]
    fn test_proximal_newton_quadratic_closed_form() {
        for &(h, rho) in &[(0.0, 1.0), (5.0, 0.25), (-2.0, 4.0)] {
            let s = Quadratic.proximal(h, rho).unwrap();
            let expect = (h + 3.0 * rho) / (1.0 + rho);
            assert!((s - expect).abs() < 1e-8, "h={h}, rho={rho}: {s} vs {expect}");
        }
    }
}
