//! Managers serving per-potential views out of flat parameter storage.
//!
//! A block holds one prototype object for `N` potentials of the same
//! family; each of the family's parameters is either shared (one value for
//! the block) or individual (one value per potential). `pot(j)`
//! reconfigures the prototype with the parameters of potential `j` and
//! hands out a view that stays valid until the next `pot` call — the
//! mutable receiver makes the reuse rule a borrow rule instead of a
//! comment.

mod factory;

pub use factory::{ManagerSpec, build_manager, check_representation};

use crate::potential::{ArgumentGroup, EpPotential};
use factep_error::{EpResult, ep_err, require};

pub trait PotentialManager {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of potentials in the given argument group.
    fn num_in_group(&self, group: ArgumentGroup) -> usize;

    /// View of potential `j`, valid until the next `pot` call.
    fn pot(&mut self, j: usize) -> EpResult<&dyn EpPotential>;

    /// Argument group of potential `j` (no reconfiguration needed, the
    /// group is a family property).
    fn group_of(&self, j: usize) -> EpResult<ArgumentGroup>;
}

/// One homogeneous block of potentials over a single prototype object.
pub struct BlockPotManager {
    proto: Box<dyn EpPotential>,
    num: usize,
    par_vec: Vec<f64>,
    par_off: Vec<usize>,
    par_shared: Vec<bool>,
    scratch: Vec<f64>,
}

impl BlockPotManager {
    /// `par_shared[k]` marks parameter `k` as shared; the slab `par_vec`
    /// then holds one segment per parameter of length 1 or `num`.
    pub fn new(
        proto: Box<dyn EpPotential>,
        num: usize,
        par_vec: Vec<f64>,
        par_shared: Vec<bool>,
        check_valid: bool,
    ) -> EpResult<Self> {
        require!(num > 0, InvalidConfig: "potential block must not be empty");
        let npar = proto.num_pars();
        require!(
            par_shared.len() == npar,
            InvalidConfig: "shared flags must cover all {} parameters", npar
        );
        let mut par_off = Vec::with_capacity(npar);
        let mut off = 0;
        for &shared in &par_shared {
            par_off.push(off);
            off += if shared { 1 } else { num };
        }
        require!(
            par_vec.len() == off,
            InvalidConfig: "parameter slab has {} values, expected {}", par_vec.len(), off
        );
        let mut man = BlockPotManager {
            proto,
            num,
            par_vec,
            par_off,
            par_shared,
            scratch: vec![0.0; npar],
        };
        if check_valid && npar > 0 {
            for j in 0..num {
                man.gather(j);
                if !man.proto.is_valid_pars(&man.scratch) {
                    return Err(ep_err!(InvalidParameter: "invalid parameters").at_potential(j));
                }
            }
        }
        Ok(man)
    }

    fn gather(&mut self, j: usize) {
        for k in 0..self.par_off.len() {
            let idx = self.par_off[k] + if self.par_shared[k] { 0 } else { j };
            self.scratch[k] = self.par_vec[idx];
        }
    }

    fn group(&self) -> ArgumentGroup {
        self.proto.argument_group()
    }
}

impl PotentialManager for BlockPotManager {
    fn len(&self) -> usize {
        self.num
    }

    fn num_in_group(&self, group: ArgumentGroup) -> usize {
        if self.group() == group { self.num } else { 0 }
    }

    fn pot(&mut self, j: usize) -> EpResult<&dyn EpPotential> {
        require!(j < self.num, InvalidParameter: "potential index {} out of range", j);
        if !self.par_off.is_empty() {
            self.gather(j);
            self.proto.set_pars(&self.scratch)?;
        }
        Ok(self.proto.as_ref())
    }

    fn group_of(&self, j: usize) -> EpResult<ArgumentGroup> {
        require!(j < self.num, InvalidParameter: "potential index {} out of range", j);
        Ok(self.group())
    }
}

/// Concatenation of blocks. Bivariate-precision blocks must form a
/// contiguous suffix, so that precision potentials sit at the end of the
/// global potential range.
pub struct CompositePotManager {
    children: Vec<BlockPotManager>,
    start: Vec<usize>,
}

impl CompositePotManager {
    pub fn new(children: Vec<BlockPotManager>) -> EpResult<Self> {
        require!(!children.is_empty(), InvalidConfig: "manager needs at least one block");
        let mut start = Vec::with_capacity(children.len());
        let mut off = 0;
        let mut seen_precision = false;
        for child in &children {
            start.push(off);
            off += child.len();
            let nprec = child.num_in_group(ArgumentGroup::BivariatePrecision);
            require!(
                !(seen_precision && nprec < child.len()),
                InvalidConfig: "bivariate-precision potentials must form a contiguous suffix"
            );
            seen_precision |= nprec > 0;
        }
        Ok(CompositePotManager { children, start })
    }

    fn locate(&self, j: usize) -> EpResult<(usize, usize)> {
        require!(j < self.len(), InvalidParameter: "potential index {} out of range", j);
        let child = self.start.partition_point(|&s| s <= j) - 1;
        Ok((child, j - self.start[child]))
    }
}

impl PotentialManager for CompositePotManager {
    fn len(&self) -> usize {
        self.children.iter().map(|c| c.len()).sum()
    }

    fn num_in_group(&self, group: ArgumentGroup) -> usize {
        self.children.iter().map(|c| c.num_in_group(group)).sum()
    }

    fn pot(&mut self, j: usize) -> EpResult<&dyn EpPotential> {
        let (child, rel) = self.locate(j)?;
        self.children[child].pot(rel)
    }

    fn group_of(&self, j: usize) -> EpResult<ArgumentGroup> {
        let (child, rel) = self.locate(j)?;
        self.children[child].group_of(rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::{Gaussian, Laplace};

    fn gaussian_block() -> BlockPotManager {
        // y individual [1, 2, 3], variance shared 0.5.
        BlockPotManager::new(
            Box::new(Gaussian::default()),
            3,
            vec![1.0, 2.0, 3.0, 0.5],
            vec![false, true],
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_block_serves_per_potential_parameters() {
        let mut man = gaussian_block();
        assert_eq!(man.len(), 3);
        let mut pv = [0.0; 2];
        for j in 0..3 {
            let pot = man.pot(j).unwrap();
            pot.get_pars(&mut pv);
            assert_eq!(pv, [(j + 1) as f64, 0.5]);
        }
        assert!(man.pot(3).is_err());
    }

    #[test]
    fn test_block_rejects_wrong_slab_size() {
        assert!(
            BlockPotManager::new(
                Box::new(Gaussian::default()),
                3,
                vec![1.0, 0.5],
                vec![false, true],
                true,
            )
            .is_err()
        );
    }

    #[test]
    fn test_block_validates_parameters_on_request() {
        // Second variance is invalid; the constructor sweep catches it.
        let res = BlockPotManager::new(
            Box::new(Gaussian::default()),
            2,
            vec![0.0, 0.0, 1.0, 0.0],
            vec![false, false],
            true,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_composite_concatenates_blocks() {
        let a = gaussian_block();
        let b = BlockPotManager::new(
            Box::new(Laplace::default()),
            2,
            vec![4.0, 5.0, 2.0],
            vec![false, true],
            true,
        )
        .unwrap();
        let mut man = CompositePotManager::new(vec![a, b]).unwrap();
        assert_eq!(man.len(), 5);
        assert_eq!(man.num_in_group(ArgumentGroup::Univariate), 5);

        let mut pv = [0.0; 2];
        man.pot(4).unwrap().get_pars(&mut pv);
        assert_eq!(pv, [5.0, 2.0]);
        man.pot(0).unwrap().get_pars(&mut pv);
        assert_eq!(pv, [1.0, 0.5]);
    }
}
