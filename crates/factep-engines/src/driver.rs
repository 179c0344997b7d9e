//! # Sequential EP update driver
//!
//! One update on potential `j` walks through: cavity formation, projection
//! onto the scalar argument `s_j`, tilted moment matching, the undamped
//! proposal, selective damping, a predicted-marginal check, and a single
//! commit. Every phase before the commit only reads persistent state; any
//! failure therefore leaves representation, marginals and trackers
//! bit-identical to before the call.
//!
//! Numerical trouble is reported through [UpdateStatus], never as an
//! error: a rejected update is an expected event the caller's schedule
//! simply moves past. `Err` is reserved for caller bugs (index out of
//! range, damping outside `[0, 1)`).

use factep_core::{FactorizedRepr, MaxValueTracker, PiColumns, TauAColumns, TauCColumns};
use factep_error::{EpResult, ep_err, require};
use factep_potentials::{ArgumentGroup, GammaCavity, GaussianCavity, PotentialManager};
use tracing::{debug, warn};

/// Outcome classification of one sequential update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UpdateStatus {
    Success,
    /// A cavity precision (or Gamma cavity parameter) fell below half its
    /// threshold; the update was skipped.
    CavityInvalid,
    /// The moment routine failed or a proposal denominator collapsed.
    NumericalError,
    /// The predicted post-update marginals would be degenerate.
    MarginalsInvalid,
    /// Selective damping would have to damp (almost) everything away.
    CavCondSkipped,
}

impl UpdateStatus {
    /// Stable numeric code, matching the order above.
    pub fn code(self) -> i32 {
        match self {
            UpdateStatus::Success => 0,
            UpdateStatus::CavityInvalid => 1,
            UpdateStatus::NumericalError => 2,
            UpdateStatus::MarginalsInvalid => 3,
            UpdateStatus::CavCondSkipped => 4,
        }
    }

    pub fn is_success(self) -> bool {
        self == UpdateStatus::Success
    }
}

/// Result of one update. `delta` is the maximum relative change of mean
/// and standard deviation of `s_j` (and of `tau_k(j)` for a precision
/// potential); it is 0 for a non-success outcome. `effective_damp` is the
/// damping actually applied, `max(caller, selective)`, and 1 for any
/// rejected or skipped update.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct UpdateOutcome {
    pub status: UpdateStatus,
    pub delta: f64,
    pub effective_damp: f64,
}

impl UpdateOutcome {
    fn failed(status: UpdateStatus) -> Self {
        UpdateOutcome {
            status,
            delta: 0.0,
            effective_damp: 1.0,
        }
    }
}

/// Numerical guards of the update equations.
#[derive(Copy, Clone, Debug)]
pub struct DriverTuning {
    /// Below this magnitude of `|B_ji|` the better-conditioned small-B
    /// form of the proposal equations is used.
    pub tiny_b_threshold: f64,
    /// Smallest acceptable proposal denominator.
    pub denom_floor: f64,
    /// Selective-damping fraction at which the update is skipped outright.
    pub skip_damp: f64,
}

impl Default for DriverTuning {
    fn default() -> Self {
        DriverTuning {
            tiny_b_threshold: 1e-6,
            denom_floor: 1e-10,
            skip_damp: 0.98,
        }
    }
}

/// |a - b| relative to the larger magnitude, floored to keep tiny values
/// from blowing the ratio up.
fn rel_diff(a: f64, b: f64) -> f64 {
    (a - b).abs() / a.abs().max(b.abs()).max(1e-8)
}

/// Row-local working arrays, sized once for the widest row.
struct Scratch {
    vars: Vec<usize>,
    b: Vec<f64>,
    cur_beta: Vec<f64>,
    cur_pi: Vec<f64>,
    cav_beta: Vec<f64>,
    cav_pi: Vec<f64>,
    pr_beta: Vec<f64>,
    pr_pi: Vec<f64>,
}

impl Scratch {
    fn with_capacity(n: usize) -> Self {
        Scratch {
            vars: vec![0; n],
            b: vec![0.0; n],
            cur_beta: vec![0.0; n],
            cur_pi: vec![0.0; n],
            cav_beta: vec![0.0; n],
            cav_pi: vec![0.0; n],
            pr_beta: vec![0.0; n],
            pr_pi: vec![0.0; n],
        }
    }
}

/// Precision-row context captured during cavity formation.
#[derive(Copy, Clone)]
struct PrecCtx {
    jp: usize,
    k: usize,
    cav_a: f64,
    cav_c: f64,
    old_a: f64,
    old_c: f64,
    tau_mean: f64,
    tau_std: f64,
}

pub struct EpDriver<'s, 'd> {
    pots: &'d mut dyn PotentialManager,
    repr: &'d mut FactorizedRepr<'s>,
    marg_beta: &'d mut [f64],
    marg_pi: &'d mut [f64],
    pi_min: f64,
    a_min: f64,
    c_min: f64,
    marg_a: Option<&'d mut [f64]>,
    marg_c: Option<&'d mut [f64]>,
    max_pi: Option<&'d mut MaxValueTracker<'s>>,
    max_a: Option<&'d mut MaxValueTracker<'s>>,
    max_c: Option<&'d mut MaxValueTracker<'s>>,
    tuning: DriverTuning,
    scratch: Scratch,
}

pub struct EpDriverBuilder<'s, 'd> {
    pots: &'d mut dyn PotentialManager,
    repr: &'d mut FactorizedRepr<'s>,
    marg_beta: &'d mut [f64],
    marg_pi: &'d mut [f64],
    pi_min: f64,
    a_min: f64,
    c_min: f64,
    marg_a: Option<&'d mut [f64]>,
    marg_c: Option<&'d mut [f64]>,
    max_pi: Option<&'d mut MaxValueTracker<'s>>,
    max_a: Option<&'d mut MaxValueTracker<'s>>,
    max_c: Option<&'d mut MaxValueTracker<'s>>,
    tuning: DriverTuning,
}

impl<'s, 'd> EpDriverBuilder<'s, 'd> {
    pub fn new(
        pots: &'d mut dyn PotentialManager,
        repr: &'d mut FactorizedRepr<'s>,
        marg_beta: &'d mut [f64],
        marg_pi: &'d mut [f64],
        pi_min: f64,
    ) -> Self {
        EpDriverBuilder {
            pots,
            repr,
            marg_beta,
            marg_pi,
            pi_min,
            a_min: 0.0,
            c_min: 0.0,
            marg_a: None,
            marg_c: None,
            max_pi: None,
            max_a: None,
            max_c: None,
            tuning: DriverTuning::default(),
        }
    }

    /// Attach the pi tracker enabling selective damping.
    pub fn with_max_pi(mut self, tracker: &'d mut MaxValueTracker<'s>) -> Self {
        self.max_pi = Some(tracker);
        self
    }

    /// Attach Gamma marginals and thresholds for bivariate-precision
    /// potentials.
    pub fn with_precision(
        mut self,
        marg_a: &'d mut [f64],
        marg_c: &'d mut [f64],
        a_min: f64,
        c_min: f64,
    ) -> Self {
        self.marg_a = Some(marg_a);
        self.marg_c = Some(marg_c);
        self.a_min = a_min;
        self.c_min = c_min;
        self
    }

    pub fn with_max_a(mut self, tracker: &'d mut MaxValueTracker<'s>) -> Self {
        self.max_a = Some(tracker);
        self
    }

    pub fn with_max_c(mut self, tracker: &'d mut MaxValueTracker<'s>) -> Self {
        self.max_c = Some(tracker);
        self
    }

    pub fn with_tuning(mut self, tuning: DriverTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn build(self) -> EpResult<EpDriver<'s, 'd>> {
        let n = self.repr.num_variables();
        let m = self.repr.num_potentials();
        require!(self.pi_min >= 0.0, InvalidConfig: "pi threshold must be nonnegative");
        require!(
            self.marg_beta.len() == n && self.marg_pi.len() == n,
            InvalidConfig: "marginal arrays must have length n={}", n
        );
        require!(
            self.pots.len() == m,
            InvalidConfig: "manager serves {} potentials, representation has {}", self.pots.len(), m
        );
        let m_prec = self.repr.num_bvprec_potentials();
        let managed_prec = self.pots.num_in_group(ArgumentGroup::BivariatePrecision);
        if m_prec == 0 {
            require!(
                managed_prec == 0,
                InvalidConfig: "manager has precision potentials but the representation does not"
            );
            require!(
                self.marg_a.is_none() && self.max_a.is_none() && self.max_c.is_none(),
                InvalidConfig: "precision state attached without a precision representation"
            );
        } else {
            require!(
                managed_prec == m_prec,
                InvalidConfig: "manager and representation disagree on precision potentials ({} vs {})",
                managed_prec, m_prec
            );
            require!(
                self.a_min > 0.0 && self.c_min > 0.0,
                InvalidConfig: "Gamma thresholds must be positive"
            );
            let num_k = self.repr.num_prec_variables();
            match (&self.marg_a, &self.marg_c) {
                (Some(a), Some(c)) => {
                    require!(
                        a.len() == num_k && c.len() == num_k,
                        InvalidConfig: "Gamma marginal arrays must have length K={}", num_k
                    );
                }
                _ => return Err(ep_err!(InvalidConfig: "precision potentials need Gamma marginals")),
            }
        }
        let widest = self.repr.max_row_size();
        Ok(EpDriver {
            pots: self.pots,
            repr: self.repr,
            marg_beta: self.marg_beta,
            marg_pi: self.marg_pi,
            pi_min: self.pi_min,
            a_min: self.a_min,
            c_min: self.c_min,
            marg_a: self.marg_a,
            marg_c: self.marg_c,
            max_pi: self.max_pi,
            max_a: self.max_a,
            max_c: self.max_c,
            tuning: self.tuning,
            scratch: Scratch::with_capacity(widest),
        })
    }
}

impl<'s> EpDriver<'s, '_> {
    pub fn num_variables(&self) -> usize {
        self.repr.num_variables()
    }

    pub fn num_potentials(&self) -> usize {
        self.repr.num_potentials()
    }

    pub fn has_selective_damping(&self) -> bool {
        self.max_pi.is_some() || self.max_a.is_some() || self.max_c.is_some()
    }

    /// `(updates, recomputes)` of the pi tracker, if attached.
    pub fn tracker_stats(&self) -> (usize, usize) {
        self.max_pi.as_deref().map_or((0, 0), |t| t.stats())
    }

    fn write_link(&mut self, j: usize, ii: usize, beta: Option<f64>, pi: Option<f64>) -> EpResult<()> {
        let row = self.repr.row_mut(j)?;
        if let Some(v) = beta {
            row.beta[ii] = v;
        }
        if let Some(v) = pi {
            row.pi[ii] = v;
        }
        Ok(())
    }

    fn notify_pi(&mut self, i: usize, j: usize, val: f64) -> EpResult<()> {
        if let Some(tr) = self.max_pi.as_deref_mut() {
            tr.update(&PiColumns(&*self.repr), i, j, val)?;
        }
        Ok(())
    }

    fn write_tau(&mut self, jp: usize, a: Option<f64>, c: Option<f64>) -> EpResult<()> {
        let Some(prec) = self.repr.precision_mut() else {
            return Err(ep_err!(InvalidConfig: "representation has no precision extension"));
        };
        let (_, a_ref, c_ref) = prec.tau_row_mut(jp)?;
        if let Some(v) = a {
            *a_ref = v;
        }
        if let Some(v) = c {
            *c_ref = v;
        }
        Ok(())
    }

    fn notify_a(&mut self, k: usize, jp: usize, val: f64) -> EpResult<()> {
        if let Some(tr) = self.max_a.as_deref_mut() {
            tr.update(&TauAColumns(&*self.repr), k, jp, val)?;
        }
        Ok(())
    }

    fn notify_c(&mut self, k: usize, jp: usize, val: f64) -> EpResult<()> {
        if let Some(tr) = self.max_c.as_deref_mut() {
            tr.update(&TauCColumns(&*self.repr), k, jp, val)?;
        }
        Ok(())
    }

    /// Run one sequential EP update on potential `j` with caller damping
    /// `damp in [0, 1)`.
    pub fn update(&mut self, j: usize, damp: f64) -> EpResult<UpdateOutcome> {
        require!(
            (0.0..1.0).contains(&damp),
            InvalidConfig: "damping factor {} outside [0, 1)", damp
        );
        require!(
            j < self.repr.num_potentials(),
            InvalidParameter: "potential index {} out of range", j
        );
        let is_prec = self.pots.group_of(j)? == ArgumentGroup::BivariatePrecision;
        let thres2 = 0.5 * self.pi_min;

        // Cavity formation. The row is copied into scratch so later
        // phases can interleave reads with tracker probes.
        let n_links;
        {
            let row = self.repr.row(j)?;
            n_links = row.vars.len();
            self.scratch.vars[..n_links].copy_from_slice(row.vars);
            self.scratch.b[..n_links].copy_from_slice(row.b);
            self.scratch.cur_beta[..n_links].copy_from_slice(row.beta);
            self.scratch.cur_pi[..n_links].copy_from_slice(row.pi);
        }
        let mut flat = false;
        let (mut c_rho, mut c_h) = (0.0, 0.0);
        // Marginal moments of s_j before the update, for the delta metric.
        let (mut m_rho, mut m_h) = (0.0, 0.0);
        for ii in 0..n_links {
            let i = self.scratch.vars[ii];
            let cav_pi = self.marg_pi[i] - self.scratch.cur_pi[ii];
            if cav_pi < thres2 {
                debug!(j, i, cav_pi, "cavity precision below threshold");
                return Ok(UpdateOutcome::failed(UpdateStatus::CavityInvalid));
            }
            let cav_beta = self.marg_beta[i] - self.scratch.cur_beta[ii];
            self.scratch.cav_pi[ii] = cav_pi;
            self.scratch.cav_beta[ii] = cav_beta;
            let bval = self.scratch.b[ii];
            if cav_pi > 0.0 {
                let t = bval / cav_pi;
                c_rho += bval * t;
                c_h += t * cav_beta;
            } else {
                flat = true;
            }
            if self.marg_pi[i] > 0.0 {
                let t = bval / self.marg_pi[i];
                m_rho += bval * t;
                m_h += t * self.marg_beta[i];
            }
        }

        let mut prec = None;
        if is_prec {
            let Some(jp) = self.repr.precision_index(j) else {
                return Err(ep_err!(InvalidConfig: "potential {} is not in the precision suffix", j));
            };
            let Some(p) = self.repr.precision() else {
                return Err(ep_err!(InvalidConfig: "representation has no precision extension"));
            };
            let (k, old_a, old_c) = p.tau_row(jp)?;
            let (Some(marg_a), Some(marg_c)) = (self.marg_a.as_deref(), self.marg_c.as_deref())
            else {
                return Err(ep_err!(InvalidConfig: "precision potentials need Gamma marginals"));
            };
            let cav_a = marg_a[k] - old_a;
            let cav_c = marg_c[k] - old_c;
            if cav_a < 0.5 * self.a_min || cav_c < 0.5 * self.c_min {
                debug!(j, k, cav_a, cav_c, "Gamma cavity below threshold");
                return Ok(UpdateOutcome::failed(UpdateStatus::CavityInvalid));
            }
            prec = Some(PrecCtx {
                jp,
                k,
                cav_a,
                cav_c,
                old_a,
                old_c,
                tau_mean: marg_a[k] / marg_c[k],
                tau_std: marg_a[k].sqrt() / marg_c[k],
            });
        }

        // Moment match and undamped proposal.
        let (mut hat_a, mut hat_c) = (0.0, 0.0);
        if flat {
            // An improper cavity can only be served through the
            // natural-parameter path of a single-link potential.
            if n_links != 1 || is_prec {
                debug!(j, "flat cavity on a multi-link or precision row");
                return Ok(UpdateOutcome::failed(UpdateStatus::CavityInvalid));
            }
            let bval = self.scratch.b[0];
            if bval == 0.0 {
                return Ok(UpdateOutcome::failed(UpdateStatus::NumericalError));
            }
            let cav_beta = self.scratch.cav_beta[0];
            let cav_pi = self.scratch.cav_pi[0];
            let pot = self.pots.pot(j)?;
            match pot.natural_moments(cav_beta / bval, cav_pi / (bval * bval)) {
                Some((beta_hat, pi_hat, _)) => {
                    self.scratch.pr_pi[0] = bval * bval * pi_hat - cav_pi;
                    self.scratch.pr_beta[0] = bval * beta_hat - cav_beta;
                }
                None => {
                    debug!(j, "potential cannot serve an improper cavity");
                    return Ok(UpdateOutcome::failed(UpdateStatus::CavityInvalid));
                }
            }
        } else {
            let cavity = GaussianCavity {
                mean: c_h,
                var: c_rho,
            };
            let (alpha, nu);
            if is_prec {
                let Some(ctx) = prec.as_ref() else {
                    return Err(ep_err!(InvalidConfig: "precision context missing"));
                };
                let gamma = GammaCavity {
                    shape: ctx.cav_a,
                    rate: ctx.cav_c,
                };
                let pot = self.pots.pot(j)?;
                match pot.precision_moments(&cavity, &gamma, 1.0) {
                    Some(m) => {
                        alpha = m.alpha;
                        nu = m.nu;
                        hat_a = m.a_hat;
                        hat_c = m.c_hat;
                    }
                    None => {
                        debug!(j, c_h, c_rho, cav_a = ctx.cav_a, cav_c = ctx.cav_c, "moment match failed");
                        return Ok(UpdateOutcome::failed(UpdateStatus::NumericalError));
                    }
                }
            } else {
                let pot = self.pots.pot(j)?;
                match pot.moments(&cavity, 1.0) {
                    Some(m) => {
                        alpha = m.alpha;
                        nu = m.nu;
                    }
                    None => {
                        debug!(j, c_h, c_rho, "moment match failed");
                        return Ok(UpdateOutcome::failed(UpdateStatus::NumericalError));
                    }
                }
            }
            for ii in 0..n_links {
                let bval = self.scratch.b[ii];
                let cav_pi = self.scratch.cav_pi[ii];
                let cav_beta = self.scratch.cav_beta[ii];
                if bval.abs() > self.tuning.tiny_b_threshold {
                    // pi_cav / b^2 - nu, written to divide by b twice.
                    let t2 = cav_pi / bval;
                    let denom = t2 / bval - nu;
                    if denom < self.tuning.denom_floor {
                        debug!(j, ii, denom, "proposal denominator collapsed");
                        return Ok(UpdateOutcome::failed(UpdateStatus::NumericalError));
                    }
                    let e = 1.0 / denom;
                    self.scratch.pr_pi[ii] = e * cav_pi * nu;
                    self.scratch.pr_beta[ii] = e * (cav_beta * nu + t2 * alpha);
                } else {
                    // Small |b|: multiply through by b^2 first.
                    let denom = cav_pi - nu * bval * bval;
                    if denom < self.tuning.denom_floor {
                        debug!(j, ii, denom, "proposal denominator collapsed (small b)");
                        return Ok(UpdateOutcome::failed(UpdateStatus::NumericalError));
                    }
                    let t = bval / denom;
                    self.scratch.pr_pi[ii] = t * bval * nu * cav_pi;
                    self.scratch.pr_beta[ii] = t * (cav_beta * bval * nu + cav_pi * alpha);
                }
            }
        }

        // Selective damping: find the smallest damping keeping every
        // post-update margin pi_i - max_j' pi_j'i at or above the
        // threshold; skip the update when that needs (almost) full
        // inertia.
        let mut eff = damp;
        if self.max_pi.is_some() {
            for ii in 0..n_links {
                let proposed = self.scratch.pr_pi[ii];
                let current = self.scratch.cur_pi[ii];
                if proposed >= current {
                    continue;
                }
                let i = self.scratch.vars[ii];
                let kappa = self.max_pi.as_deref().map(|t| t.max(i)).unwrap_or(0.0);
                if kappa <= 0.0 {
                    debug!(j, i, kappa, "tracked maximum not positive");
                    return Ok(UpdateOutcome::failed(UpdateStatus::NumericalError));
                }
                let eta =
                    1.0 - ((self.marg_pi[i] - kappa - self.pi_min) / (current - proposed)).min(1.0);
                if eta >= self.tuning.skip_damp {
                    return Ok(UpdateOutcome::failed(UpdateStatus::CavCondSkipped));
                }
                if kappa == current {
                    // The maximal producer is j itself. Probe whether the
                    // damped value keeps the new maximum positive; the
                    // probe is rolled back before any decision.
                    let test = eta * current + (1.0 - eta) * proposed;
                    self.write_link(j, ii, None, Some(test))?;
                    self.notify_pi(i, j, test)?;
                    let kappa_after = self.max_pi.as_deref().map(|t| t.max(i)).unwrap_or(0.0);
                    self.write_link(j, ii, None, Some(current))?;
                    self.notify_pi(i, j, current)?;
                    if kappa_after <= 0.0 {
                        warn!(j, i, "skipping update, damped maximum would not stay positive");
                        return Ok(UpdateOutcome::failed(UpdateStatus::CavCondSkipped));
                    }
                }
                eff = eff.max(eta);
            }
        }

        let (mut pr_a, mut pr_c) = (0.0, 0.0);
        if let Some(ctx) = prec {
            pr_a = hat_a - ctx.cav_a;
            pr_c = hat_c - ctx.cav_c;
            if self.max_a.is_some() && pr_a < ctx.old_a {
                let kappa = self.max_a.as_deref().map(|t| t.max(ctx.k)).unwrap_or(0.0);
                if kappa <= 0.0 {
                    debug!(j, k = ctx.k, kappa, "tracked maximum a not positive");
                    return Ok(UpdateOutcome::failed(UpdateStatus::NumericalError));
                }
                let marg = self.marg_a.as_deref().map(|a| a[ctx.k]).unwrap_or(0.0);
                let eta = 1.0 - ((marg - kappa - self.a_min) / (ctx.old_a - pr_a)).min(1.0);
                if eta >= self.tuning.skip_damp {
                    return Ok(UpdateOutcome::failed(UpdateStatus::CavCondSkipped));
                }
                if kappa == ctx.old_a {
                    let test = pr_a + eta * (ctx.old_a - pr_a);
                    self.write_tau(ctx.jp, Some(test), None)?;
                    self.notify_a(ctx.k, ctx.jp, test)?;
                    let kappa_after = self.max_a.as_deref().map(|t| t.max(ctx.k)).unwrap_or(0.0);
                    self.write_tau(ctx.jp, Some(ctx.old_a), None)?;
                    self.notify_a(ctx.k, ctx.jp, ctx.old_a)?;
                    if kappa_after <= 0.0 {
                        warn!(j, k = ctx.k, "skipping update, damped maximum a not positive");
                        return Ok(UpdateOutcome::failed(UpdateStatus::CavCondSkipped));
                    }
                }
                eff = eff.max(eta);
            }
            if self.max_c.is_some() && pr_c < ctx.old_c {
                let kappa = self.max_c.as_deref().map(|t| t.max(ctx.k)).unwrap_or(0.0);
                if kappa <= 0.0 {
                    debug!(j, k = ctx.k, kappa, "tracked maximum c not positive");
                    return Ok(UpdateOutcome::failed(UpdateStatus::NumericalError));
                }
                let marg = self.marg_c.as_deref().map(|c| c[ctx.k]).unwrap_or(0.0);
                let eta = 1.0 - ((marg - kappa - self.c_min) / (ctx.old_c - pr_c)).min(1.0);
                if eta >= self.tuning.skip_damp {
                    return Ok(UpdateOutcome::failed(UpdateStatus::CavCondSkipped));
                }
                if kappa == ctx.old_c {
                    let test = pr_c + eta * (ctx.old_c - pr_c);
                    self.write_tau(ctx.jp, None, Some(test))?;
                    self.notify_c(ctx.k, ctx.jp, test)?;
                    let kappa_after = self.max_c.as_deref().map(|t| t.max(ctx.k)).unwrap_or(0.0);
                    self.write_tau(ctx.jp, None, Some(ctx.old_c))?;
                    self.notify_c(ctx.k, ctx.jp, ctx.old_c)?;
                    if kappa_after <= 0.0 {
                        warn!(j, k = ctx.k, "skipping update, damped maximum c not positive");
                        return Ok(UpdateOutcome::failed(UpdateStatus::CavCondSkipped));
                    }
                }
                eff = eff.max(eta);
            }
        }

        // Predicted post-update marginals; nothing has been written yet,
        // so a violation is still a clean no-op rejection.
        for ii in 0..n_links {
            let mut pr_pi = self.scratch.pr_pi[ii];
            let mut pr_beta = self.scratch.pr_beta[ii];
            if eff > 0.0 {
                pr_pi += eff * (self.scratch.cur_pi[ii] - pr_pi);
                pr_beta += eff * (self.scratch.cur_beta[ii] - pr_beta);
            }
            if self.scratch.cav_pi[ii] + pr_pi < thres2 {
                debug!(j, ii, "predicted marginal below threshold");
                return Ok(UpdateOutcome::failed(UpdateStatus::MarginalsInvalid));
            }
            self.scratch.pr_pi[ii] = pr_pi;
            self.scratch.pr_beta[ii] = pr_beta;
        }
        if let Some(ctx) = prec {
            if eff > 0.0 {
                pr_a += eff * (ctx.old_a - pr_a);
                pr_c += eff * (ctx.old_c - pr_c);
            }
            if ctx.cav_a + pr_a < 0.5 * self.a_min || ctx.cav_c + pr_c < 0.5 * self.c_min {
                debug!(j, k = ctx.k, "predicted Gamma marginal below threshold");
                return Ok(UpdateOutcome::failed(UpdateStatus::MarginalsInvalid));
            }
        }

        // Commit. From here on every write goes through.
        if let Some(ctx) = prec {
            self.write_tau(ctx.jp, Some(pr_a), Some(pr_c))?;
            if let Some(marg_a) = self.marg_a.as_deref_mut() {
                marg_a[ctx.k] = ctx.cav_a + pr_a;
            }
            if let Some(marg_c) = self.marg_c.as_deref_mut() {
                marg_c[ctx.k] = ctx.cav_c + pr_c;
            }
            self.notify_a(ctx.k, ctx.jp, pr_a)?;
            self.notify_c(ctx.k, ctx.jp, pr_c)?;
        }
        {
            let row = self.repr.row_mut(j)?;
            row.beta[..n_links].copy_from_slice(&self.scratch.pr_beta[..n_links]);
            row.pi[..n_links].copy_from_slice(&self.scratch.pr_pi[..n_links]);
        }
        let (mut mpr_rho, mut mpr_h) = (0.0, 0.0);
        for ii in 0..n_links {
            let i = self.scratch.vars[ii];
            let new_pi = self.scratch.cav_pi[ii] + self.scratch.pr_pi[ii];
            let new_beta = self.scratch.cav_beta[ii] + self.scratch.pr_beta[ii];
            self.marg_pi[i] = new_pi;
            self.marg_beta[i] = new_beta;
            if new_pi > 0.0 {
                let bval = self.scratch.b[ii];
                let t = bval / new_pi;
                mpr_rho += bval * t;
                mpr_h += t * new_beta;
            }
            let val = self.scratch.pr_pi[ii];
            self.notify_pi(i, j, val)?;
        }

        let mut delta = rel_diff(m_h, mpr_h).max(rel_diff(m_rho.sqrt(), mpr_rho.sqrt()));
        if let Some(ctx) = prec {
            let (Some(marg_a), Some(marg_c)) = (self.marg_a.as_deref(), self.marg_c.as_deref())
            else {
                return Err(ep_err!(InvalidConfig: "precision potentials need Gamma marginals"));
            };
            let mean = marg_a[ctx.k] / marg_c[ctx.k];
            let std = marg_a[ctx.k].sqrt() / marg_c[ctx.k];
            delta = delta
                .max(rel_diff(ctx.tau_mean, mean))
                .max(rel_diff(ctx.tau_std, std));
        }

        Ok(UpdateOutcome {
            status: UpdateStatus::Success,
            delta,
            effective_damp: eff,
        })
    }
}
