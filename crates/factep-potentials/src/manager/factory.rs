//! Building managers from the flat block description used by host
//! environments, plus the exhaustive pre-flight check whose messages are
//! fit to show a user.

use super::{BlockPotManager, CompositePotManager};
use crate::potential::ArgumentGroup;
use crate::registry::{self, Annotation};
use factep_core::check_tau_index;
use factep_error::{EpResult, ep_err, require};

/// Flat description of a manager: one entry per block in `pot_ids`,
/// `counts` and `annotations`, and the concatenation of all per-block
/// parameter slabs and shared flags.
pub struct ManagerSpec<'a> {
    pub pot_ids: &'a [i32],
    pub counts: &'a [usize],
    pub par_vec: &'a [f64],
    pub par_shared: &'a [bool],
    pub annotations: &'a [Option<Annotation>],
}

impl ManagerSpec<'_> {
    fn check_shape(&self) -> EpResult<()> {
        require!(
            !self.pot_ids.is_empty(),
            InvalidConfig: "manager description needs at least one block"
        );
        require!(
            self.counts.len() == self.pot_ids.len()
                && self.annotations.len() == self.pot_ids.len(),
            InvalidConfig: "counts and annotations must have one entry per block"
        );
        Ok(())
    }
}

/// Build the manager. Parameter values are not semantically validated
/// here (run [check_representation] first when the description comes from
/// an untrusted host); structural inconsistencies still fail.
pub fn build_manager(spec: &ManagerSpec<'_>) -> EpResult<CompositePotManager> {
    spec.check_shape()?;
    for (k, (&id, &n)) in spec.pot_ids.iter().zip(spec.counts).enumerate() {
        if !registry::is_valid_id(id) {
            return Err(ep_err!(InvalidParameter: "unknown potential ID {}", id).at_block(k));
        }
        if n == 0 {
            return Err(ep_err!(InvalidParameter: "potential count must be positive").at_block(k));
        }
    }

    let mut children = Vec::with_capacity(spec.pot_ids.len());
    let mut par_rest = spec.par_vec;
    let mut shrd_rest = spec.par_shared;
    for (k, (&id, &n)) in spec.pot_ids.iter().zip(spec.counts).enumerate() {
        // Construction parameters, if any, sit in the prefix of this
        // block's slab and must be shared.
        let proto = registry::create_default(id, par_rest, spec.annotations[k].as_ref())?;
        let npar = proto.num_pars();
        let nconst = proto.num_const_pars();
        if nconst > 0 {
            if npar < nconst {
                return Err(ep_err!(InvalidParameter: "parameter layout inconsistent").at_block(k));
            }
            if shrd_rest.len() < nconst || !shrd_rest[..nconst].iter().all(|&s| s) {
                return Err(
                    ep_err!(InvalidParameter: "construction parameters must be shared").at_block(k),
                );
            }
        }
        if shrd_rest.len() < npar {
            return Err(ep_err!(InvalidConfig: "shared flags exhausted").at_block(k));
        }
        let (shrd, rest) = shrd_rest.split_at(npar);
        shrd_rest = rest;
        let slab_len: usize = shrd.iter().map(|&s| if s { 1 } else { n }).sum();
        if par_rest.len() < slab_len {
            return Err(ep_err!(InvalidConfig: "parameter vector exhausted").at_block(k));
        }
        let (slab, rest) = par_rest.split_at(slab_len);
        par_rest = rest;
        children.push(BlockPotManager::new(
            proto,
            n,
            slab.to_vec(),
            shrd.to_vec(),
            false,
        )?);
    }
    require!(par_rest.is_empty(), InvalidConfig: "parameter vector too long");
    require!(shrd_rest.is_empty(), InvalidConfig: "shared flags too long");
    CompositePotManager::new(children)
}

/// Exhaustive validity sweep over a manager description. On failure the
/// error names the offending block (and potential position within it),
/// shifted by `pos_offset` so hosts with 1-based indexing can report
/// positions their users recognize. `tau_ind` must be given exactly when
/// the description contains bivariate-precision potentials.
pub fn check_representation(
    spec: &ManagerSpec<'_>,
    pos_offset: usize,
    tau_ind: Option<&[usize]>,
) -> EpResult<()> {
    spec.check_shape()?;
    let num_blocks = spec.pot_ids.len();
    for (k, (&id, &n)) in spec.pot_ids.iter().zip(spec.counts).enumerate() {
        if !registry::is_valid_id(id) {
            return Err(ep_err!(Potential: "potential ID entry invalid").at_block(k + pos_offset));
        }
        if n == 0 {
            return Err(
                ep_err!(Potential: "potential count must be positive").at_block(k + pos_offset),
            );
        }
    }

    let mut num_prec = 0usize;
    let mut par_rest = spec.par_vec;
    let mut shrd_rest = spec.par_shared;
    for (k, (&id, &n)) in spec.pot_ids.iter().zip(spec.counts).enumerate() {
        let proto = match registry::create_default(id, par_rest, spec.annotations[k].as_ref()) {
            Ok(p) => p,
            Err(e) => {
                return Err(
                    ep_err!(Potential: "cannot create potential object ({})", e)
                        .at_block(k + pos_offset),
                );
            }
        };
        if proto.argument_group() == ArgumentGroup::BivariatePrecision {
            num_prec += n;
        }
        let npar = proto.num_pars();
        let nconst = proto.num_const_pars();
        if nconst > 0 {
            if npar < nconst {
                return Err(
                    ep_err!(Potential: "needs {} construction parameters", nconst)
                        .at_block(k + pos_offset),
                );
            }
            if shrd_rest.len() < nconst || !shrd_rest[..nconst].iter().all(|&s| s) {
                return Err(
                    ep_err!(Potential: "shared flags invalid for construction parameters")
                        .at_block(k + pos_offset),
                );
            }
        }
        if npar == 0 {
            continue;
        }
        if shrd_rest.len() < npar {
            return Err(ep_err!(Potential: "shared flags too short").at_block(k + pos_offset));
        }
        let (shrd, rest) = shrd_rest.split_at(npar);
        shrd_rest = rest;
        let mut par_off = Vec::with_capacity(npar);
        let mut slab_len = 0;
        for &s in shrd {
            par_off.push(slab_len);
            slab_len += if s { 1 } else { n };
        }
        if par_rest.len() < slab_len {
            return Err(ep_err!(Potential: "parameter vector too short").at_block(k + pos_offset));
        }
        let (slab, rest) = par_rest.split_at(slab_len);
        par_rest = rest;

        let mut pv = vec![0.0; npar];
        for j in 0..n {
            for (i, &s) in shrd.iter().enumerate() {
                pv[i] = slab[par_off[i] + if s { 0 } else { j }];
            }
            if !proto.is_valid_pars(&pv) {
                let mut err = ep_err!(Potential: "invalid parameters").at_potential(j + pos_offset);
                if num_blocks > 1 {
                    err = err.at_block(k + pos_offset);
                }
                return Err(err);
            }
        }
    }
    require!(par_rest.is_empty(), Potential: "parameter vector too long");
    require!(shrd_rest.is_empty(), Potential: "shared flags too long");

    match (tau_ind, num_prec) {
        (None, 0) => Ok(()),
        (Some(_), 0) => Err(ep_err!(Potential: "tau index given but no precision potentials")),
        (None, _) => Err(ep_err!(Potential: "precision potentials need a tau index")),
        (Some(ti), m_prec) => check_tau_index(ti, m_prec).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::PotentialManager;
    use crate::quad::AdaptiveSimpson;
    use crate::registry::ids;
    use factep_core::layout::build_tau_index;
    use std::sync::Arc;

    #[test]
    fn test_build_two_block_manager() {
        // Block 0: 3 Gaussians (y individual, var shared).
        // Block 1: 2 Laplace (both individual).
        let spec = ManagerSpec {
            pot_ids: &[ids::GAUSSIAN, ids::LAPLACE],
            counts: &[3, 2],
            par_vec: &[1.0, 2.0, 3.0, 0.5, 0.0, 1.0, 2.0, 3.0],
            par_shared: &[false, true, false, false],
            annotations: &[None, None],
        };
        check_representation(&spec, 0, None).unwrap();
        let mut man = build_manager(&spec).unwrap();
        assert_eq!(man.len(), 5);

        let mut pv = [0.0; 2];
        man.pot(1).unwrap().get_pars(&mut pv);
        assert_eq!(pv, [2.0, 0.5]);
        man.pot(3).unwrap().get_pars(&mut pv);
        assert_eq!(pv, [0.0, 2.0]);
        man.pot(4).unwrap().get_pars(&mut pv);
        assert_eq!(pv, [1.0, 3.0]);
    }

    #[test]
    fn test_check_names_offending_potential() {
        // Laplace rate of potential 1 is invalid (0.0).
        let spec = ManagerSpec {
            pot_ids: &[ids::LAPLACE],
            counts: &[2],
            par_vec: &[0.0, 0.0, 1.0, 0.0],
            par_shared: &[false, false],
            annotations: &[None],
        };
        let err = check_representation(&spec, 0, None).unwrap_err();
        assert_eq!(err.potential(), Some(1));
        // A single block is not named in the position.
        assert_eq!(err.block(), None);
        assert!(err.to_string().contains("potential 1"), "{err}");
        // 1-based reporting shifts the position.
        let err = check_representation(&spec, 1, None).unwrap_err();
        assert_eq!(err.potential(), Some(2));
        assert!(err.to_string().contains("potential 2"), "{err}");
    }

    #[test]
    fn test_check_names_offending_block() {
        // Second block: Gaussian variance of potential 0 is invalid.
        let spec = ManagerSpec {
            pot_ids: &[ids::LAPLACE, ids::GAUSSIAN],
            counts: &[1, 2],
            par_vec: &[0.0, 1.0, 0.5, -0.5, 0.0, 1.0],
            par_shared: &[false, false, false, false],
            annotations: &[None, None],
        };
        let err = check_representation(&spec, 0, None).unwrap_err();
        assert_eq!(err.block(), Some(1));
        assert_eq!(err.potential(), Some(0));
        assert!(err.to_string().contains("potential 0 in block 1"), "{err}");
    }

    #[test]
    fn test_construction_parameters_must_be_shared() {
        // GaussMixture: L = 2 flagged individual is rejected.
        let spec = ManagerSpec {
            pot_ids: &[ids::GAUSS_MIXTURE],
            counts: &[2],
            par_vec: &[2.0, 2.0, 0.0, 1.0, 1.0, 2.0],
            par_shared: &[false, true, true, true],
            annotations: &[None],
        };
        assert!(check_representation(&spec, 0, None).is_err());
    }

    #[test]
    fn test_precision_suffix_and_tau_index() {
        let annot = Some(Annotation::Quadrature(Arc::new(AdaptiveSimpson::default())));
        // Gaussian block followed by a precision block: allowed.
        let spec = ManagerSpec {
            pot_ids: &[ids::GAUSSIAN, ids::GAUSSIAN_PRECISION],
            counts: &[2, 2],
            par_vec: &[0.0, 0.0, 1.0, 0.5, -0.5],
            par_shared: &[false, true, false],
            annotations: &[None, annot.clone()],
        };
        let tau = build_tau_index(&[0, 1]);
        check_representation(&spec, 0, Some(&tau)).unwrap();
        assert!(check_representation(&spec, 0, None).is_err());
        let man = build_manager(&spec).unwrap();
        assert_eq!(man.num_in_group(ArgumentGroup::BivariatePrecision), 2);

        // Precision block before a univariate block: rejected.
        let spec = ManagerSpec {
            pot_ids: &[ids::GAUSSIAN_PRECISION, ids::GAUSSIAN],
            counts: &[2, 2],
            par_vec: &[0.5, -0.5, 0.0, 0.0, 1.0],
            par_shared: &[false, false, true],
            annotations: &[annot, None],
        };
        assert!(build_manager(&spec).is_err());
    }

    #[test]
    fn test_leftover_parameters_rejected() {
        let spec = ManagerSpec {
            pot_ids: &[ids::GAUSSIAN],
            counts: &[1],
            par_vec: &[0.0, 1.0, 99.0],
            par_shared: &[true, true],
            annotations: &[None],
        };
        assert!(build_manager(&spec).is_err());
        assert!(check_representation(&spec, 0, None).is_err());
    }
}
