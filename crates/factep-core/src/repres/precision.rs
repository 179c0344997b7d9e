//! Bivariate-precision extension of the representation.
//!
//! Each precision potential `j` (0-based within the precision suffix) is
//! tied to one precision variable `k = k(j)` and carries a Gamma message
//! `(a_jk, c_jk)`. The assignment and its inverse live in one flat index:
//!
//! ```text
//! tau_ind = [k(j); m_prec] ++ [K] ++ [start of J_k; K+1] ++ [J_k flat; m_prec]
//! ```
//!
//! where `J_k = { j : k(j) == k }` is ascending and the start offsets are
//! absolute positions in `tau_ind` (the final entry is the dummy
//! terminator).

use factep_error::{EpResult, require};

/// Validate a flat tau index for `m_prec` precision potentials and return
/// the number of precision variables K.
pub fn check_tau_index(tau_ind: &[usize], m_prec: usize) -> EpResult<usize> {
    require!(m_prec > 0, Representation: "precision extension needs at least one potential");
    require!(
        tau_ind.len() > m_prec,
        Representation: "tau index too short for {} precision potentials", m_prec
    );
    let num_k = tau_ind[m_prec];
    require!(num_k > 0, Representation: "tau index declares zero precision variables");
    require!(
        tau_ind.len() == 2 * m_prec + num_k + 2,
        Representation: "tau index must have 2*{} + {} + 2 entries, got {}", m_prec, num_k, tau_ind.len()
    );
    for (j, &k) in tau_ind[..m_prec].iter().enumerate() {
        require!(k < num_k, Representation: "k({}) = {} out of range (K={})", j, k, num_k);
    }
    let first = m_prec + num_k + 2;
    require!(
        tau_ind[m_prec + 1] == first && tau_ind[m_prec + 1 + num_k] == tau_ind.len(),
        Representation: "tau index group offsets must span the J_k section"
    );
    for k in 0..num_k {
        let off = tau_ind[m_prec + 1 + k];
        let end = tau_ind[m_prec + 2 + k];
        require!(end > off, Representation: "precision variable {} has no potential", k);
        let group = &tau_ind[off..end];
        for w in group.windows(2) {
            require!(w[0] < w[1], Representation: "J_{} must be strictly ascending", k);
        }
        for &j in group {
            require!(j < m_prec, Representation: "J_{} entry {} out of range", k, j);
            require!(
                tau_ind[j] == k,
                Representation: "tau index inverse mismatch: J_{} lists {} but k({}) = {}", k, j, j, tau_ind[j]
            );
        }
    }
    Ok(num_k)
}

#[derive(Debug)]
pub struct PrecisionRepr<'a> {
    num_k: usize,
    tau_ind: &'a [usize],
    a: &'a mut [f64],
    c: &'a mut [f64],
}

impl<'a> PrecisionRepr<'a> {
    pub fn new(tau_ind: &'a [usize], a: &'a mut [f64], c: &'a mut [f64]) -> EpResult<Self> {
        require!(
            a.len() == c.len() && !a.is_empty(),
            Representation: "Gamma message arrays must be nonempty and of equal length"
        );
        let num_k = check_tau_index(tau_ind, a.len())?;
        Ok(PrecisionRepr {
            num_k,
            tau_ind,
            a,
            c,
        })
    }

    /// Number of precision potentials m_prec.
    pub fn num_potentials(&self) -> usize {
        self.a.len()
    }

    /// Number of precision variables K.
    pub fn num_variables(&self) -> usize {
        self.num_k
    }

    /// Precision variable assigned to precision potential `jp`.
    pub fn var_of(&self, jp: usize) -> EpResult<usize> {
        require!(
            jp < self.num_potentials(),
            InvalidParameter: "precision potential index {} out of range", jp
        );
        Ok(self.tau_ind[jp])
    }

    /// Gamma message of precision potential `jp`, with its variable k(jp).
    pub fn tau_row_mut(&mut self, jp: usize) -> EpResult<(usize, &mut f64, &mut f64)> {
        let k = self.var_of(jp)?;
        Ok((k, &mut self.a[jp], &mut self.c[jp]))
    }

    pub fn tau_row(&self, jp: usize) -> EpResult<(usize, f64, f64)> {
        let k = self.var_of(jp)?;
        Ok((k, self.a[jp], self.c[jp]))
    }

    /// Support `J_k` of precision variable `k` plus the flat message arrays
    /// (indexed directly by the `J_k` entries).
    pub fn tau_col(&self, k: usize) -> EpResult<(&[usize], &[f64], &[f64])> {
        require!(k < self.num_k, InvalidParameter: "precision variable index {} out of range", k);
        let m_prec = self.num_potentials();
        let off = self.tau_ind[m_prec + 1 + k];
        let end = self.tau_ind[m_prec + 2 + k];
        Ok((&self.tau_ind[off..end], self.a, self.c))
    }

    /// Sum Gamma messages into the tau marginals.
    pub fn compute_marginals(
        &self,
        marg_a: &mut [f64],
        marg_c: &mut [f64],
        incremental: bool,
    ) -> EpResult<()> {
        require!(
            marg_a.len() == self.num_k && marg_c.len() == self.num_k,
            InvalidParameter: "tau marginal arrays must have length K={}", self.num_k
        );
        for k in 0..self.num_k {
            let (group, a, c) = self.tau_col(k)?;
            let mut m_a = 0.0;
            let mut m_c = 0.0;
            for &j in group {
                m_a += a[j];
                m_c += c[j];
            }
            if incremental {
                marg_a[k] += m_a;
                marg_c[k] += m_c;
            } else {
                marg_a[k] = m_a;
                marg_c[k] = m_c;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::build_tau_index;

    #[test]
    fn test_check_tau_index_accepts_built() {
        let tau = build_tau_index(&[0, 1, 0, 1]);
        assert_eq!(check_tau_index(&tau, 4).unwrap(), 2);
    }

    #[test]
    fn test_check_tau_index_rejects_inverse_mismatch() {
        // J_0 claims potential 1, but k(1) = 1.
        let mut tau = build_tau_index(&[0, 1]);
        let pos = tau.len() - 2;
        tau.swap(pos, pos + 1);
        assert!(check_tau_index(&tau, 2).is_err());
    }

    #[test]
    fn test_tau_access_and_marginals() {
        let tau = build_tau_index(&[0, 1, 0]);
        let mut a = vec![1.0, 2.0, 4.0];
        let mut c = vec![0.5, 0.25, 0.125];
        let prec = PrecisionRepr::new(&tau, &mut a, &mut c).unwrap();
        assert_eq!(prec.num_variables(), 2);
        assert_eq!(prec.var_of(2).unwrap(), 0);

        let (group, av, _cv) = prec.tau_col(0).unwrap();
        assert_eq!(group, &[0, 2]);
        assert_eq!(av[group[1]], 4.0);

        let mut ma = vec![0.0; 2];
        let mut mc = vec![0.0; 2];
        prec.compute_marginals(&mut ma, &mut mc, false).unwrap();
        assert_eq!(ma, vec![5.0, 2.0]);
        assert_eq!(mc, vec![0.625, 0.25]);
    }

    #[test]
    fn test_tau_row_mut_writes_through() {
        let tau = build_tau_index(&[0, 0]);
        let mut a = vec![1.0, 2.0];
        let mut c = vec![3.0, 4.0];
        {
            let mut prec = PrecisionRepr::new(&tau, &mut a, &mut c).unwrap();
            let (k, aj, cj) = prec.tau_row_mut(1).unwrap();
            assert_eq!(k, 0);
            *aj = 9.0;
            *cj = 8.0;
        }
        assert_eq!(a, vec![1.0, 9.0]);
        assert_eq!(c, vec![3.0, 8.0]);
    }
}
