//! Top-K maximum tracking over the links of a bipartite factor graph.
//!
//! For every variable `i` the tracker maintains the up-to-K largest link
//! values `x_ji` together with their producers `j`, sorted descending. The
//! driver consults `max(i)` on every selective-damping decision, so the
//! common path must not rescan `W_i`; a full column rescan happens only
//! when the tracked list drains.
//!
//! Storage is three caller-owned flat arrays sized `n * (K + 1)`; the last
//! slot of each block is a dummy entry that absorbs the tail of the
//! insertion shift. `num_valid[i]` must stay in `1..=K`: a variable with no
//! eligible producer makes the subsystem inconsistent, which is reported as
//! a `Tracker` error.

use crate::repres::FactorizedRepr;
use factep_error::{EpResult, ep_err, require};

/// Read access to the per-variable link values the tracker ranks.
///
/// `factor_values(i)` returns `(producers, ordinals, values)`: aligned
/// producer indices and indices into the flat `values` array, so that entry
/// `l` has producer `producers[l]` and value `values[ordinals[l]]`.
pub trait LinkValues {
    fn num_variables(&self) -> usize;
    fn num_factors(&self) -> usize;
    fn factor_values(&self, i: usize) -> EpResult<(&[usize], &[usize], &[f64])>;
}

/// Pi message values, one tracked scalar per link of B.
pub struct PiColumns<'r, 'a>(pub &'r FactorizedRepr<'a>);

impl LinkValues for PiColumns<'_, '_> {
    fn num_variables(&self) -> usize {
        self.0.num_variables()
    }

    fn num_factors(&self) -> usize {
        self.0.num_potentials()
    }

    fn factor_values(&self, i: usize) -> EpResult<(&[usize], &[usize], &[f64])> {
        let col = self.0.col(i)?;
        Ok((col.vars, col.links, col.pi))
    }
}

/// Gamma shape messages `a_jk`; variables are the precision variables and
/// producers are precision-relative potential indices.
pub struct TauAColumns<'r, 'a>(pub &'r FactorizedRepr<'a>);

impl LinkValues for TauAColumns<'_, '_> {
    fn num_variables(&self) -> usize {
        self.0.num_prec_variables()
    }

    fn num_factors(&self) -> usize {
        self.0.num_bvprec_potentials()
    }

    fn factor_values(&self, k: usize) -> EpResult<(&[usize], &[usize], &[f64])> {
        match self.0.precision() {
            Some(p) => {
                let (group, a, _) = p.tau_col(k)?;
                Ok((group, group, a))
            }
            None => Err(ep_err!(InvalidConfig: "representation has no precision extension")),
        }
    }
}

/// Gamma rate messages `c_jk`, analogous to [TauAColumns].
pub struct TauCColumns<'r, 'a>(pub &'r FactorizedRepr<'a>);

impl LinkValues for TauCColumns<'_, '_> {
    fn num_variables(&self) -> usize {
        self.0.num_prec_variables()
    }

    fn num_factors(&self) -> usize {
        self.0.num_bvprec_potentials()
    }

    fn factor_values(&self, k: usize) -> EpResult<(&[usize], &[usize], &[f64])> {
        match self.0.precision() {
            Some(p) => {
                let (group, _, c) = p.tau_col(k)?;
                Ok((group, group, c))
            }
            None => Err(ep_err!(InvalidConfig: "representation has no precision extension")),
        }
    }
}

pub struct MaxValueTracker<'a> {
    num_vars: usize,
    num_factors: usize,
    max_size: usize,
    num_valid: &'a mut [usize],
    top_ind: &'a mut [usize],
    top_val: &'a mut [f64],
    subset: Option<(&'a [usize], bool)>,
    n_updates: usize,
    n_recomputes: usize,
}

impl<'a> MaxValueTracker<'a> {
    /// Wrap caller-owned tracker arrays. The array content is trusted (call
    /// [MaxValueTracker::recompute_all] to fill from scratch), but sizes,
    /// `num_valid` ranges and the subset filter are validated.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        num_vars: usize,
        num_factors: usize,
        max_size: usize,
        num_valid: &'a mut [usize],
        top_ind: &'a mut [usize],
        top_val: &'a mut [f64],
        subset: Option<&'a [usize]>,
        subset_exclude: bool,
    ) -> EpResult<Self> {
        require!(max_size >= 1, InvalidConfig: "top-K size must be at least 1");
        require!(
            num_valid.len() == num_vars,
            InvalidConfig: "num_valid must have one entry per variable"
        );
        require!(
            top_ind.len() == num_vars * (max_size + 1) && top_val.len() == top_ind.len(),
            InvalidConfig: "tracker arrays must have n*(K+1) = {} entries", num_vars * (max_size + 1)
        );
        for (i, &nv) in num_valid.iter().enumerate() {
            require!(
                nv >= 1 && nv <= max_size,
                InvalidConfig: "num_valid[{}] = {} out of 1..={}", i, nv, max_size
            );
        }
        if let Some(sub) = subset {
            require!(!sub.is_empty(), InvalidConfig: "producer subset must not be empty");
            for w in sub.windows(2) {
                require!(w[0] < w[1], InvalidConfig: "producer subset must be sorted ascending");
            }
            require!(
                sub[sub.len() - 1] < num_factors,
                InvalidConfig: "producer subset entry out of range"
            );
            let eligible = if subset_exclude {
                num_factors - sub.len()
            } else {
                sub.len()
            };
            require!(
                eligible >= max_size,
                InvalidConfig: "producer subset leaves fewer than K eligible producers"
            );
        }
        Ok(MaxValueTracker {
            num_vars,
            num_factors,
            max_size,
            num_valid,
            top_ind,
            top_val,
            subset: subset.map(|s| (s, subset_exclude)),
            n_updates: 0,
            n_recomputes: 0,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Largest tracked value for variable `i`.
    pub fn max(&self, i: usize) -> f64 {
        self.top_val[i * (self.max_size + 1)]
    }

    /// `(update calls, recomputes triggered by updates)` so far.
    pub fn stats(&self) -> (usize, usize) {
        (self.n_updates, self.n_recomputes)
    }

    pub fn reset_stats(&mut self) {
        self.n_updates = 0;
        self.n_recomputes = 0;
    }

    fn is_excluded(&self, j: usize) -> bool {
        match self.subset {
            Some((sub, exclude)) => sub.binary_search(&j).is_ok() == exclude,
            None => false,
        }
    }

    /// Rebuild the top-K list of variable `i` from the underlying values.
    pub fn recompute(&mut self, src: &impl LinkValues, i: usize) -> EpResult<()> {
        let (producers, ordinals, values) = src.factor_values(i)?;
        self.num_valid[i] = 0;
        for (&j, &l) in producers.iter().zip(ordinals) {
            if self.is_excluded(j) {
                continue;
            }
            self.insert_entry(i, j, values[l]);
        }
        if self.num_valid[i] == 0 {
            return Err(ep_err!(Tracker: "variable {} has no eligible producer; tracker state is invalid", i));
        }
        Ok(())
    }

    /// Rebuild every top-K list.
    pub fn recompute_all(&mut self, src: &impl LinkValues) -> EpResult<()> {
        for i in 0..self.num_vars {
            // Recompute needs num_valid pinned to a sane value first; the
            // constructor guarantees that for caller-filled arrays.
            self.recompute(src, i)?;
        }
        Ok(())
    }

    /// Notification that `x_ji` changed to `val`. The new value must
    /// already be written back to the underlying array, so a triggered
    /// rescan sees fresh data. `j` must not be excluded by the subset
    /// filter (not checked, as in the source).
    pub fn update(&mut self, src: &impl LinkValues, i: usize, j: usize, val: f64) -> EpResult<()> {
        require!(
            i < self.num_vars && j < self.num_factors,
            InvalidParameter: "tracker update out of range (i={}, j={})", i, j
        );
        let base = i * (self.max_size + 1);
        if val <= self.top_val[base + self.num_valid[i] - 1] {
            // No longer ranks among the tracked entries.
            if self.remove_entry(i, j) && self.num_valid[i] == 0 {
                self.recompute(src, i)?;
                self.n_recomputes += 1;
            }
        } else {
            self.remove_entry(i, j);
            self.insert_entry(i, j, val);
        }
        self.n_updates += 1;
        Ok(())
    }

    /// Insert `(val, j)` into the list of `i`, shifting smaller entries
    /// down through the trailing dummy slot. Assumes `j` is not present.
    fn insert_entry(&mut self, i: usize, j: usize, val: f64) {
        let base = i * (self.max_size + 1);
        let num = self.num_valid[i];
        if num == self.max_size && val <= self.top_val[base + self.max_size - 1] {
            return;
        }
        let mut pos = 0;
        while pos < num && val <= self.top_val[base + pos] {
            pos += 1;
        }
        let (mut val, mut j) = (val, j);
        // The shift runs through index `num`, which may be the dummy slot.
        for p in pos..=num {
            let cpv = self.top_val[base + p];
            let cpj = self.top_ind[base + p];
            self.top_val[base + p] = val;
            self.top_ind[base + p] = j;
            val = cpv;
            j = cpj;
        }
        if num < self.max_size {
            self.num_valid[i] += 1;
        }
    }

    /// Remove producer `j` from the list of `i` if present. May leave the
    /// list empty.
    fn remove_entry(&mut self, i: usize, j: usize) -> bool {
        let base = i * (self.max_size + 1);
        let num = self.num_valid[i];
        debug_assert!(num > 0);
        let mut pos = 0;
        while pos < num && self.top_ind[base + pos] != j {
            pos += 1;
        }
        if pos == num {
            return false;
        }
        for p in pos..num - 1 {
            self.top_ind[base + p] = self.top_ind[base + p + 1];
            self.top_val[base + p] = self.top_val[base + p + 1];
        }
        self.num_valid[i] -= 1;
        true
    }
}

/// Tracker arrays sized for `n` variables at top-K size `k`, pre-filled so
/// construction succeeds before the first recompute.
pub fn alloc_tracker_arrays(n: usize, k: usize) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
    (vec![1; n], vec![0; n * (k + 1)], vec![0.0; n * (k + 1)])
}
