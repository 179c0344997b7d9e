//! Sequential-update scheduling and one-shot recompute services.
//!
//! The schedule itself is the caller's: a list of potential indices,
//! repeats allowed, executed in order. The driver decides nothing about
//! ordering and the report records exactly one row per requested update.

use crate::driver::{EpDriver, UpdateOutcome, UpdateStatus};
use factep_core::{
    FactorizedRepr, LinkValues, MaxValueTracker, PiColumns, TauAColumns, TauCColumns,
};
use factep_error::{EpResult, require};
use tracing::debug;

/// Per-update records of one schedule run plus aggregate tracker
/// statistics (zeros when no tracker is attached).
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduleReport {
    pub status: Vec<UpdateStatus>,
    /// Relative moment change per update; 0 for rejected updates.
    pub delta: Vec<f64>,
    /// Effective damping per update; 1 for rejected or skipped updates.
    pub effective_damp: Vec<f64>,
    pub tracker_updates: usize,
    pub tracker_recomputes: usize,
}

impl ScheduleReport {
    pub fn num_success(&self) -> usize {
        self.status.iter().filter(|s| s.is_success()).count()
    }
}

/// Run the driver over `order`, one update per entry. Numerical rejections
/// are recorded and iteration continues; only argument errors abort.
pub fn run_schedule(
    driver: &mut EpDriver<'_, '_>,
    order: &[usize],
    damp: f64,
) -> EpResult<ScheduleReport> {
    require!(!order.is_empty(), InvalidParameter: "update schedule must not be empty");
    let m = driver.num_potentials();
    for &j in order {
        require!(j < m, InvalidParameter: "schedule entry {} out of range (m={})", j, m);
    }
    let stats_before = driver.tracker_stats();
    let mut report = ScheduleReport {
        status: Vec::with_capacity(order.len()),
        delta: Vec::with_capacity(order.len()),
        effective_damp: Vec::with_capacity(order.len()),
        ..Default::default()
    };
    for &j in order {
        let UpdateOutcome {
            status,
            delta,
            effective_damp,
        } = driver.update(j, damp)?;
        if !status.is_success() {
            debug!(j, code = status.code(), "update rejected");
        }
        report.status.push(status);
        report.delta.push(delta);
        report.effective_damp.push(effective_damp);
    }
    let stats_after = driver.tracker_stats();
    report.tracker_updates = stats_after.0 - stats_before.0;
    report.tracker_recomputes = stats_after.1 - stats_before.1;
    Ok(report)
}

fn recompute_into<'s>(
    src: &impl LinkValues,
    max_size: usize,
    num_valid: &'s mut [usize],
    top_ind: &'s mut [usize],
    top_val: &'s mut [f64],
    subset: Option<&'s [usize]>,
    subset_exclude: bool,
) -> EpResult<()> {
    // Pin the list lengths so construction passes on arbitrary content.
    num_valid.fill(1);
    let mut tracker = MaxValueTracker::new(
        src.num_variables(),
        src.num_factors(),
        max_size,
        num_valid,
        top_ind,
        top_val,
        subset,
        subset_exclude,
    )?;
    tracker.recompute_all(src)
}

/// Fill pi-tracker arrays from scratch (the one-shot construction
/// service; attach the arrays to a [MaxValueTracker] afterwards).
pub fn recompute_max_pi(
    repr: &FactorizedRepr<'_>,
    max_size: usize,
    num_valid: &mut [usize],
    top_ind: &mut [usize],
    top_val: &mut [f64],
    subset: Option<&[usize]>,
    subset_exclude: bool,
) -> EpResult<()> {
    recompute_into(
        &PiColumns(repr),
        max_size,
        num_valid,
        top_ind,
        top_val,
        subset,
        subset_exclude,
    )
}

/// Fill the a- and c-tracker arrays from scratch for a representation
/// with precision potentials.
#[allow(clippy::too_many_arguments)]
pub fn recompute_max_ac(
    repr: &FactorizedRepr<'_>,
    max_size: usize,
    a_num_valid: &mut [usize],
    a_top_ind: &mut [usize],
    a_top_val: &mut [f64],
    c_num_valid: &mut [usize],
    c_top_ind: &mut [usize],
    c_top_val: &mut [f64],
) -> EpResult<()> {
    recompute_into(
        &TauAColumns(repr),
        max_size,
        a_num_valid,
        a_top_ind,
        a_top_val,
        None,
        false,
    )?;
    recompute_into(
        &TauCColumns(repr),
        max_size,
        c_num_valid,
        c_top_ind,
        c_top_val,
        None,
        false,
    )
}
