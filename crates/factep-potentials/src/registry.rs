//! # Potential registry
//!
//! Stable integer IDs and stable names for every supported family.
//! External interfaces refer to potentials by name; internal
//! representations translate to the ID. IDs are append-only: existing
//! values never change meaning.
//!
//! Quadrature-backed families carry an [Annotation] handle supplying the
//! quadrature provider; creating one without its annotation is an
//! argument error, as a provider cannot be conjured on the fly.

use crate::families::{GaussMixture, Gaussian, Laplace, Probit, QuantileRegress, SpikeSlab};
use crate::potential::{ArgumentGroup, EpPotential};
use crate::quad::{
    GaussianPrecision, LaplaceQuad, NegBinomialExpRate, PoissonExpRate, PoissonLogisticRate,
    QuadratureProvider,
};
use factep_error::{EpResult, ep_err, require};
use hashbrown::HashMap;
use std::sync::{Arc, OnceLock};

pub mod ids {
    pub const GAUSSIAN: i32 = 0;
    pub const LAPLACE: i32 = 1;
    pub const PROBIT: i32 = 2;
    pub const HEAVISIDE: i32 = 3;
    /// Reserved since the original ID layout; not implemented.
    pub const EXPONENTIAL: i32 = 4;
    pub const QUANT_REGRESS: i32 = 5;
    pub const GAUSS_MIXTURE: i32 = 6;
    pub const SPIKE_SLAB: i32 = 7;
    pub const POISSON_EXP_RATE: i32 = 8;
    pub const POISSON_LOGISTIC_RATE: i32 = 9;
    pub const NEG_BINOMIAL_EXP_RATE: i32 = 10;
    pub const GAUSSIAN_PRECISION: i32 = 11;
}

const NAMES: [(i32, &str); 12] = [
    (ids::GAUSSIAN, "Gaussian"),
    (ids::LAPLACE, "Laplace"),
    (ids::PROBIT, "Probit"),
    (ids::HEAVISIDE, "Heaviside"),
    (ids::EXPONENTIAL, "Exponential"),
    (ids::QUANT_REGRESS, "QuantRegress"),
    (ids::GAUSS_MIXTURE, "GaussMixture"),
    (ids::SPIKE_SLAB, "SpikeSlab"),
    (ids::POISSON_EXP_RATE, "PoissonExpRate"),
    (ids::POISSON_LOGISTIC_RATE, "PoissonLogisticRate"),
    (ids::NEG_BINOMIAL_EXP_RATE, "NegBinomialExpRate"),
    (ids::GAUSSIAN_PRECISION, "GaussianPrecision"),
];

/// Out-of-band construction dependencies for annotated families.
/// Potential objects are not shared across threads, so the provider
/// handle carries no thread-safety bounds.
#[derive(Clone)]
pub enum Annotation {
    Quadrature(Arc<dyn QuadratureProvider>),
}

pub fn is_valid_id(id: i32) -> bool {
    (0..NAMES.len() as i32).contains(&id)
}

/// Name for an ID; `None` for unknown IDs.
pub fn name_for_id(id: i32) -> Option<&'static str> {
    NAMES.iter().find(|(i, _)| *i == id).map(|(_, n)| *n)
}

/// ID for a name; `None` for unknown names.
pub fn id_for_name(name: &str) -> Option<i32> {
    static TABLE: OnceLock<HashMap<&'static str, i32>> = OnceLock::new();
    TABLE
        .get_or_init(|| NAMES.iter().map(|&(id, n)| (n, id)).collect())
        .get(name)
        .copied()
}

/// Argument group of a family, without constructing it.
pub fn argument_group(id: i32) -> EpResult<ArgumentGroup> {
    require!(is_valid_id(id), InvalidParameter: "unknown potential ID {}", id);
    Ok(match id {
        ids::GAUSSIAN_PRECISION => ArgumentGroup::BivariatePrecision,
        _ => ArgumentGroup::Univariate,
    })
}

fn quad_annotation(
    id: i32,
    annotation: Option<&Annotation>,
) -> EpResult<Arc<dyn QuadratureProvider>> {
    match annotation {
        Some(Annotation::Quadrature(q)) => Ok(q.clone()),
        None => Err(ep_err!(
            Potential: "potential type {} needs a quadrature annotation",
            name_for_id(id).unwrap_or("?")
        )),
    }
}

/// Default-construct a potential. Families with construction parameters
/// read them from the prefix of `const_pars`; everything else ignores it.
pub fn create_default(
    id: i32,
    const_pars: &[f64],
    annotation: Option<&Annotation>,
) -> EpResult<Box<dyn EpPotential>> {
    require!(is_valid_id(id), InvalidParameter: "unknown potential ID {}", id);
    Ok(match id {
        ids::GAUSSIAN => Box::new(Gaussian::default()),
        ids::LAPLACE => Box::new(Laplace::default()),
        ids::PROBIT => Box::new(Probit::soft(1.0, 0.0)?),
        ids::HEAVISIDE => Box::new(Probit::hard(1.0, 0.0)?),
        ids::EXPONENTIAL => {
            return Err(ep_err!(Potential: "the Exponential potential ID is reserved but not implemented"))
        }
        ids::QUANT_REGRESS => Box::new(QuantileRegress::default()),
        ids::GAUSS_MIXTURE => {
            require!(
                !const_pars.is_empty(),
                Potential: "GaussMixture needs its component count as construction parameter"
            );
            let l = const_pars[0].ceil();
            require!(
                l >= 2.0 && l == const_pars[0],
                Potential: "GaussMixture component count {} invalid", const_pars[0]
            );
            Box::new(GaussMixture::new(l as usize)?)
        }
        ids::SPIKE_SLAB => Box::new(SpikeSlab::default()),
        ids::POISSON_EXP_RATE => Box::new(LaplaceQuad::new(
            PoissonExpRate::new(0.0)?,
            quad_annotation(id, annotation)?,
        )?),
        ids::POISSON_LOGISTIC_RATE => Box::new(LaplaceQuad::new(
            PoissonLogisticRate::new(0.0)?,
            quad_annotation(id, annotation)?,
        )?),
        ids::NEG_BINOMIAL_EXP_RATE => Box::new(LaplaceQuad::new(
            NegBinomialExpRate::new(0.0, 1.0)?,
            quad_annotation(id, annotation)?,
        )?),
        ids::GAUSSIAN_PRECISION => {
            Box::new(GaussianPrecision::new(0.0, quad_annotation(id, annotation)?))
        }
        _ => unreachable!(),
    })
}

/// Construct a potential with an explicit parameter vector.
pub fn create(
    id: i32,
    pars: &[f64],
    annotation: Option<&Annotation>,
) -> EpResult<Box<dyn EpPotential>> {
    let mut pot = create_default(id, pars, annotation)?;
    let npar = pot.num_pars();
    if npar > 0 {
        require!(
            pars.len() >= npar,
            InvalidParameter: "potential {} needs {} parameters, got {}",
            name_for_id(id).unwrap_or("?"), npar, pars.len()
        );
        pot.set_pars(&pars[..npar])?;
    }
    Ok(pot)
}
