//! # Scalar potential interface
//!
//! A potential `t_j(s_j)` sees the rest of the model only through the
//! cavity marginal on its scalar argument `s_j` (plus a Gamma cavity on its
//! precision variable for the bivariate-precision group). An EP update asks
//! the potential to match the first two moments of the tilted distribution
//!
//! ```text
//! P_hat(s) = Z^-1 t(s)^eta N(s | mu, rho)
//! ```
//!
//! and reports the result through `(alpha, nu)` such that the tilted mean
//! is `mu + alpha * rho` and the tilted variance `rho * (1 - nu * rho)`.
//!
//! Moment routines fail with `None` — a degenerate cavity or a failed
//! integration is an expected runtime condition that the driver converts
//! into a status code, never an error or panic.

use factep_error::EpResult;

/// Input/output signature of a potential.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArgumentGroup {
    /// `t(s)`: Gaussian cavity in, `(alpha, nu, log Z)` out.
    Univariate,
    /// `t(s, tau)`: adds a Gamma cavity on the precision variable and the
    /// matched `(a_hat, c_hat)` on the way out.
    BivariatePrecision,
}

/// Gaussian cavity marginal `N(s | mean, var)` in moment form.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GaussianCavity {
    pub mean: f64,
    pub var: f64,
}

/// Gamma cavity marginal on a precision variable,
/// `Gamma(tau | shape, rate) ∝ tau^(shape-1) exp(-rate tau)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GammaCavity {
    pub shape: f64,
    pub rate: f64,
}

/// Result of a univariate tilted moment match.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Moments {
    pub alpha: f64,
    pub nu: f64,
    pub log_z: f64,
}

/// Result of a bivariate-precision moment match: the Gaussian part plus
/// the Gamma parameters matching the tau-marginal of the tilted
/// distribution in its first two moments.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PrecisionMoments {
    pub alpha: f64,
    pub nu: f64,
    pub a_hat: f64,
    pub c_hat: f64,
    pub log_z: f64,
}

/// A scalar EP potential.
///
/// Parameters are a flat `f64` vector of length [EpPotential::num_pars]. A
/// prefix of [EpPotential::num_const_pars] construction parameters must be
/// known before the object exists (and is therefore always shared across a
/// manager block); most families have none.
pub trait EpPotential {
    /// Number of parameters (can be zero).
    fn num_pars(&self) -> usize;

    /// Number of construction parameters forming the parameter prefix.
    fn num_const_pars(&self) -> usize {
        0
    }

    /// Write the parameter vector into `pv` (length `num_pars()`).
    fn get_pars(&self, pv: &mut [f64]);

    /// Replace the parameter vector; rejects invalid configurations.
    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()>;

    /// Would `pv` be accepted by [EpPotential::set_pars]?
    fn is_valid_pars(&self, pv: &[f64]) -> bool;

    /// Is `log t(s)` (generalized) concave?
    fn is_log_concave(&self) -> bool;

    /// Does the family support fractional updates (`eta < 1`)?
    fn supports_fractional(&self) -> bool {
        false
    }

    fn argument_group(&self) -> ArgumentGroup {
        ArgumentGroup::Univariate
    }

    /// Tilted moment match against the Gaussian cavity; see the module
    /// comment for the `(alpha, nu)` convention. `eta` must be 1 unless
    /// the family supports fractional updates.
    fn moments(&self, cavity: &GaussianCavity, eta: f64) -> Option<Moments>;

    /// Bivariate-precision moment match. Families in the univariate group
    /// do not implement this.
    fn precision_moments(
        &self,
        _cavity: &GaussianCavity,
        _tau: &GammaCavity,
        _eta: f64,
    ) -> Option<PrecisionMoments> {
        None
    }

    /// Tilted match in natural-parameter form: given the cavity
    /// `exp(cbeta s - cpi s^2 / 2)` (not necessarily normalizable, `cpi`
    /// may be 0), return natural parameters `(beta_hat, pi_hat)` of the
    /// Gaussian matched to the tilted distribution, plus `log Z` relative
    /// to the *normalized* cavity where defined.
    ///
    /// The default path goes through [EpPotential::moments] and therefore
    /// needs `cpi > 0`; families with a closed-form tilted posterior
    /// (Gaussian observations) override it and accept `cpi == 0`, which is
    /// what makes updates against a flat marginal well defined.
    fn natural_moments(&self, cbeta: f64, cpi: f64) -> Option<(f64, f64, f64)> {
        if cpi <= 0.0 {
            return None;
        }
        let cavity = GaussianCavity {
            mean: cbeta / cpi,
            var: 1.0 / cpi,
        };
        let m = self.moments(&cavity, 1.0)?;
        let denom = 1.0 - m.nu * cavity.var;
        if denom <= 0.0 {
            return None;
        }
        // Tilted precision and mean in natural form.
        let pi_hat = cpi / denom;
        let beta_hat = (cavity.mean + m.alpha * cavity.var) * pi_hat;
        Some((beta_hat, pi_hat, m.log_z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flat;

    impl EpPotential for Flat {
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
        fn moments(&self, _cavity: &GaussianCavity, _eta: f64) -> Option<Moments> {
            Some(Moments {
                alpha: 0.0,
                nu: 0.0,
                log_z: 0.0,
            })
        }
    }

    #[test]
    fn test_default_natural_moments_reproduces_cavity_for_flat_potential() {
        // t(s) = 1 leaves the cavity untouched.
        let (beta_hat, pi_hat, _) = Flat.natural_moments(1.5, 0.5).unwrap();
        assert!((beta_hat - 1.5).abs() < 1e-12);
        assert!((pi_hat - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_default_natural_moments_rejects_improper_cavity() {
        assert!(Flat.natural_moments(0.0, 0.0).is_none());
    }
}
