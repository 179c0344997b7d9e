//! Sparse representation of the coupling factor B and the link messages.
//!
//! Potentials are indexed by `j in 0..m`, variables by `i in 0..n`. The
//! nonzeros of row `j` form the support `V_j`; the nonzeros of column `i`
//! form `W_i`. One Gaussian message `(beta_ji, pi_ji)` lives on every
//! nonzero link, stored in flat arrays indexed by a global link ordinal.
//!
//! All arrays are owned by the caller and borrowed for the lifetime of the
//! representation; construction validates the layout and mutation happens
//! strictly in place. Layout:
//!
//! - `row_off[j]..row_off[j+1]` is the ordinal range of row `j`; the same
//!   range indexes `row_vars` (the flat concatenation of the `V_j`),
//!   `b_vals`, `beta` and `pi`.
//! - `col_off[i]..col_off[i+1]` is a block of `col_data` of even length:
//!   first `W_i` (ascending), then the link ordinals of those entries in
//!   the same order.
//!
//! Rows must be nonempty; columns may be empty (such a variable is dead for
//! inference, but the layout is not rejected).

mod precision;

pub use precision::{PrecisionRepr, check_tau_index};

use factep_error::{EpResult, ep_err, require};

#[derive(Debug)]
pub struct FactorizedRepr<'a> {
    num_n: usize,
    num_m: usize,
    row_off: &'a [usize],
    row_vars: &'a [usize],
    col_off: &'a [usize],
    col_data: &'a [usize],
    b_vals: &'a [f64],
    beta: &'a mut [f64],
    pi: &'a mut [f64],
    precision: Option<PrecisionRepr<'a>>,
}

/// Mutable view of one row: four aligned slices of length `|V_j|`.
pub struct RowMut<'r> {
    pub vars: &'r [usize],
    pub b: &'r [f64],
    pub beta: &'r mut [f64],
    pub pi: &'r mut [f64],
}

/// Read-only view of one row.
pub struct Row<'r> {
    pub vars: &'r [usize],
    pub b: &'r [f64],
    pub beta: &'r [f64],
    pub pi: &'r [f64],
}

/// Read-only view of one column. `vars[l]` is a potential index and
/// `links[l]` the global link ordinal of that entry, so its message is
/// `(beta[links[l]], pi[links[l]])`; `b`, `beta`, `pi` are the full flat
/// arrays.
pub struct Col<'r> {
    pub vars: &'r [usize],
    pub links: &'r [usize],
    pub b: &'r [f64],
    pub beta: &'r [f64],
    pub pi: &'r [f64],
}

impl<'r> Col<'r> {
    /// Iterate `(potential index, link ordinal)` over the column.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize)> + 'r {
        self.vars.iter().copied().zip(self.links.iter().copied())
    }
}

impl<'a> FactorizedRepr<'a> {
    /// Build a representation over caller-owned arrays. The message arrays
    /// `beta`, `pi` are mutated in place by later updates.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        num_n: usize,
        num_m: usize,
        row_off: &'a [usize],
        row_vars: &'a [usize],
        col_off: &'a [usize],
        col_data: &'a [usize],
        b_vals: &'a [f64],
        beta: &'a mut [f64],
        pi: &'a mut [f64],
    ) -> EpResult<Self> {
        let nnz = b_vals.len();
        require!(num_n > 0 && num_m > 0, Representation: "empty model (n={}, m={})", num_n, num_m);
        require!(
            beta.len() == nnz && pi.len() == nnz && row_vars.len() == nnz,
            Representation: "message arrays must match the {} nonzeros of B", nnz
        );
        require!(row_off.len() == num_m + 1, Representation: "row index must have m+1 offsets");
        require!(
            row_off[0] == 0 && row_off[num_m] == nnz,
            Representation: "row offsets must start at 0 and end at nnz={}", nnz
        );
        for j in 0..num_m {
            let off = row_off[j];
            // Rows without support cannot be updated on; reject them here.
            require!(
                row_off[j + 1] > off && row_off[j + 1] - off <= num_n,
                Representation: "row {} has invalid support size", j
            );
        }
        for (l, &i) in row_vars.iter().enumerate() {
            require!(i < num_n, Representation: "row support entry {} out of range at ordinal {}", i, l);
        }
        require!(col_off.len() == num_n + 1, Representation: "column index must have n+1 offsets");
        require!(
            col_off[0] == 0 && col_off[num_n] == col_data.len() && col_data.len() == 2 * nnz,
            Representation: "column data must interleave W_i and link ordinals (2*nnz entries)"
        );
        for i in 0..num_n {
            let off = col_off[i];
            require!(col_off[i + 1] >= off, Representation: "column offsets must be monotone");
            let sz = col_off[i + 1] - off;
            require!(sz % 2 == 0, Representation: "column {} block has odd length", i);
            require!(sz / 2 <= num_m, Representation: "column {} has too many entries", i);
            for l in 0..sz / 2 {
                require!(
                    col_data[off + l] < num_m,
                    Representation: "column {} names potential {} out of range", i, col_data[off + l]
                );
                require!(
                    col_data[off + sz / 2 + l] < nnz,
                    Representation: "column {} link ordinal out of range", i
                );
            }
        }
        Ok(FactorizedRepr {
            num_n,
            num_m,
            row_off,
            row_vars,
            col_off,
            col_data,
            b_vals,
            beta,
            pi,
            precision: None,
        })
    }

    /// Attach the bivariate-precision extension. The precision potentials
    /// occupy the contiguous suffix `m - m_prec .. m` of the potential
    /// range.
    pub fn with_precision(mut self, prec: PrecisionRepr<'a>) -> EpResult<Self> {
        require!(
            prec.num_potentials() <= self.num_m,
            Representation: "more precision potentials than potentials"
        );
        self.precision = Some(prec);
        Ok(self)
    }

    pub fn num_variables(&self) -> usize {
        self.num_n
    }

    pub fn num_potentials(&self) -> usize {
        self.num_m
    }

    pub fn num_links(&self) -> usize {
        self.b_vals.len()
    }

    /// Number of bivariate-precision potentials (0 without the extension).
    pub fn num_bvprec_potentials(&self) -> usize {
        self.precision.as_ref().map_or(0, |p| p.num_potentials())
    }

    /// Number of precision variables tau_k (0 without the extension).
    pub fn num_prec_variables(&self) -> usize {
        self.precision.as_ref().map_or(0, |p| p.num_variables())
    }

    pub fn precision(&self) -> Option<&PrecisionRepr<'a>> {
        self.precision.as_ref()
    }

    pub fn precision_mut(&mut self) -> Option<&mut PrecisionRepr<'a>> {
        self.precision.as_mut()
    }

    /// Largest row support size, used to pre-size driver scratch space.
    pub fn max_row_size(&self) -> usize {
        (0..self.num_m)
            .map(|j| self.row_off[j + 1] - self.row_off[j])
            .max()
            .unwrap_or(0)
    }

    fn row_range(&self, j: usize) -> EpResult<std::ops::Range<usize>> {
        require!(j < self.num_m, InvalidParameter: "potential index {} out of range (m={})", j, self.num_m);
        Ok(self.row_off[j]..self.row_off[j + 1])
    }

    pub fn row(&self, j: usize) -> EpResult<Row<'_>> {
        let r = self.row_range(j)?;
        Ok(Row {
            vars: &self.row_vars[r.clone()],
            b: &self.b_vals[r.clone()],
            beta: &self.beta[r.clone()],
            pi: &self.pi[r],
        })
    }

    pub fn row_mut(&mut self, j: usize) -> EpResult<RowMut<'_>> {
        let r = self.row_range(j)?;
        Ok(RowMut {
            vars: &self.row_vars[r.clone()],
            b: &self.b_vals[r.clone()],
            beta: &mut self.beta[r.clone()],
            pi: &mut self.pi[r],
        })
    }

    pub fn col(&self, i: usize) -> EpResult<Col<'_>> {
        require!(i < self.num_n, InvalidParameter: "variable index {} out of range (n={})", i, self.num_n);
        let off = self.col_off[i];
        let sz = (self.col_off[i + 1] - off) / 2;
        Ok(Col {
            vars: &self.col_data[off..off + sz],
            links: &self.col_data[off + sz..off + 2 * sz],
            b: self.b_vals,
            beta: self.beta,
            pi: self.pi,
        })
    }

    /// Sum link messages into Gaussian variable marginals. With
    /// `incremental`, sums are added onto the output arrays instead of
    /// overwriting them.
    pub fn compute_marginals(
        &self,
        marg_beta: &mut [f64],
        marg_pi: &mut [f64],
        incremental: bool,
    ) -> EpResult<()> {
        require!(
            marg_beta.len() == self.num_n && marg_pi.len() == self.num_n,
            InvalidParameter: "marginal arrays must have length n={}", self.num_n
        );
        for i in 0..self.num_n {
            let col = self.col(i)?;
            let mut m_beta = 0.0;
            let mut m_pi = 0.0;
            for &l in col.links {
                m_beta += col.beta[l];
                m_pi += col.pi[l];
            }
            if incremental {
                marg_beta[i] += m_beta;
                marg_pi[i] += m_pi;
            } else {
                marg_beta[i] = m_beta;
                marg_pi[i] = m_pi;
            }
        }
        Ok(())
    }

    /// Gamma-marginal analogue of [FactorizedRepr::compute_marginals]. Fails
    /// without the precision extension.
    pub fn compute_tau_marginals(
        &self,
        marg_a: &mut [f64],
        marg_c: &mut [f64],
        incremental: bool,
    ) -> EpResult<()> {
        match self.precision.as_ref() {
            Some(p) => p.compute_marginals(marg_a, marg_c, incremental),
            None => Err(ep_err!(InvalidConfig: "representation has no precision extension")),
        }
    }

    /// Map an absolute potential index to the precision-relative index, if
    /// `j` is a precision potential.
    pub fn precision_index(&self, j: usize) -> Option<usize> {
        let p = self.precision.as_ref()?;
        let start = self.num_m - p.num_potentials();
        (j >= start && j < self.num_m).then(|| j - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout;

    // B = [[1, 2, 0], [0, 1, 3]]: nnz ordinals 0..4 in row-major order.
    fn two_row_layout() -> (Vec<usize>, Vec<usize>, Vec<usize>, Vec<usize>, Vec<f64>) {
        layout::build_layout(3, &[vec![(0, 1.0), (1, 2.0)], vec![(1, 1.0), (2, 3.0)]])
    }

    #[test]
    fn test_construction_and_access() {
        let (row_off, row_vars, col_off, col_data, b_vals) = two_row_layout();
        let mut beta = vec![0.0; 4];
        let mut pi = vec![0.0; 4];
        let repr = FactorizedRepr::new(
            3, 2, &row_off, &row_vars, &col_off, &col_data, &b_vals, &mut beta, &mut pi,
        )
        .unwrap();

        assert_eq!(repr.num_variables(), 3);
        assert_eq!(repr.num_potentials(), 2);
        assert_eq!(repr.num_links(), 4);
        assert_eq!(repr.max_row_size(), 2);

        let row = repr.row(1).unwrap();
        assert_eq!(row.vars, &[1, 2]);
        assert_eq!(row.b, &[1.0, 3.0]);

        let col = repr.col(1).unwrap();
        assert_eq!(col.vars, &[0, 1]);
        assert_eq!(col.links, &[1, 2]);

        let col = repr.col(0).unwrap();
        assert_eq!(col.vars, &[0]);
        assert_eq!(col.links, &[0]);
    }

    #[test]
    fn test_row_mut_writes_through() {
        let (row_off, row_vars, col_off, col_data, b_vals) = two_row_layout();
        let mut beta = vec![0.0; 4];
        let mut pi = vec![0.0; 4];
        {
            let mut repr = FactorizedRepr::new(
                3, 2, &row_off, &row_vars, &col_off, &col_data, &b_vals, &mut beta, &mut pi,
            )
            .unwrap();
            let row = repr.row_mut(0).unwrap();
            row.pi[1] = 7.0;
        }
        assert_eq!(pi, vec![0.0, 7.0, 0.0, 0.0]);
    }

    #[test]
    fn test_empty_row_rejected() {
        // B = [[1, 0], [0, 0]]: row 1 empty.
        let row_off_bad = [0usize, 1, 1];
        let row_vars = [0usize];
        let col_off = [0usize, 2, 2];
        let col_data = [0usize, 0];
        let b_vals = [1.0];
        let mut beta = [0.0];
        let mut pi = [0.0];
        let err = FactorizedRepr::new(
            2, 2, &row_off_bad, &row_vars, &col_off, &col_data, &b_vals, &mut beta, &mut pi,
        )
        .unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_odd_column_block_rejected() {
        let row_off = [0usize, 1];
        let row_vars = [0usize];
        let col_off = [0usize, 1, 2];
        let col_data = [0usize, 0];
        let b_vals = [1.0];
        let mut beta = [0.0];
        let mut pi = [0.0];
        assert!(
            FactorizedRepr::new(
                2, 1, &row_off, &row_vars, &col_off, &col_data, &b_vals, &mut beta, &mut pi,
            )
            .is_err()
        );
    }

    #[test]
    fn test_compute_marginals_literal() {
        // Spec'd example: pi on row 0 = [0.5, 1.0], row 1 = [2.0, 0.5].
        let (row_off, row_vars, col_off, col_data, b_vals) = two_row_layout();
        let mut beta = vec![1.0, 2.0, 3.0, 4.0];
        let mut pi = vec![0.5, 1.0, 2.0, 0.5];
        let repr = FactorizedRepr::new(
            3, 2, &row_off, &row_vars, &col_off, &col_data, &b_vals, &mut beta, &mut pi,
        )
        .unwrap();
        let mut m_beta = vec![0.0; 3];
        let mut m_pi = vec![0.0; 3];
        repr.compute_marginals(&mut m_beta, &mut m_pi, false).unwrap();
        assert_eq!(m_pi, vec![0.5, 3.0, 0.5]);
        assert_eq!(m_beta, vec![1.0, 5.0, 4.0]);

        // Idempotence: running it again gives identical output.
        let m_pi_before = m_pi.clone();
        let m_beta_before = m_beta.clone();
        repr.compute_marginals(&mut m_beta, &mut m_pi, false).unwrap();
        assert_eq!(m_pi, m_pi_before);
        assert_eq!(m_beta, m_beta_before);

        // Incremental mode doubles.
        repr.compute_marginals(&mut m_beta, &mut m_pi, true).unwrap();
        assert_eq!(m_pi, vec![1.0, 6.0, 1.0]);
    }

    #[test]
    fn test_empty_column_marginal_is_zero() {
        // B = [[1, 0]]: column 1 is empty.
        let (row_off, row_vars, col_off, col_data, b_vals) =
            layout::build_layout(2, &[vec![(0, 1.0)]]);
        let mut beta = vec![3.0];
        let mut pi = vec![2.0];
        let repr = FactorizedRepr::new(
            2, 1, &row_off, &row_vars, &col_off, &col_data, &b_vals, &mut beta, &mut pi,
        )
        .unwrap();
        let mut m_beta = vec![9.0; 2];
        let mut m_pi = vec![9.0; 2];
        repr.compute_marginals(&mut m_beta, &mut m_pi, false).unwrap();
        assert_eq!(m_pi, vec![2.0, 0.0]);
        assert_eq!(m_beta, vec![3.0, 0.0]);
    }
}
