//! # factep
//!
//! Approximate Bayesian inference in large factor graphs by expectation
//! propagation with a factorized Gaussian backbone.
//!
//! Variables couple to potentials only through scalar projections
//! `s_j = sum_i B_ji x_i` of a sparse coupling factor `B`; one Gaussian
//! message lives on each nonzero link (plus Gamma messages for potentials
//! with a free precision variable). The [EpDriver] refines one message at
//! a time — cavity, tilted moment match, damped write-back — under the
//! selective-damping safeguard that keeps all marginal precisions bounded
//! away from the tracked per-variable maxima.
//!
//! ```rust
//! use factep::prelude::*;
//!
//! // One variable, one observation t(x) = N(x | 2, 0.5).
//! let spec = ManagerSpec {
//!     pot_ids: &[0], // "Gaussian"
//!     counts: &[1],
//!     par_vec: &[2.0, 0.5],
//!     par_shared: &[true, true],
//!     annotations: &[None],
//! };
//! let mut man = build_manager(&spec).unwrap();
//!
//! let (row_off, row_vars, col_off, col_data, b_vals) =
//!     build_layout(1, &[vec![(0, 1.0)]]);
//! let (mut beta, mut pi) = (vec![0.0], vec![0.0]);
//! let mut repr = FactorizedRepr::new(
//!     1, 1, &row_off, &row_vars, &col_off, &col_data, &b_vals,
//!     &mut beta, &mut pi,
//! )
//! .unwrap();
//! let (mut marg_beta, mut marg_pi) = (vec![0.0], vec![0.0]);
//!
//! let mut driver = EpDriverBuilder::new(
//!     &mut man, &mut repr, &mut marg_beta, &mut marg_pi, 0.0,
//! )
//! .build()
//! .unwrap();
//! let out = driver.update(0, 0.0).unwrap();
//! assert!(out.status.is_success());
//! drop(driver);
//! assert_eq!(marg_pi[0], 2.0);
//! ```

pub use factep_core::*;
pub use factep_engines::{
    DriverTuning, EpDriver, EpDriverBuilder, ScheduleReport, UpdateOutcome, UpdateStatus,
    init_logging, recompute_max_ac, recompute_max_pi, run_schedule,
};
pub use factep_error::{EpError, EpResult, ErrorKind};
pub use factep_potentials::*;

pub mod prelude {
    pub use factep_core::prelude::*;
    pub use factep_engines::{
        DriverTuning, EpDriver, EpDriverBuilder, ScheduleReport, UpdateOutcome, UpdateStatus,
        recompute_max_ac, recompute_max_pi, run_schedule,
    };
    pub use factep_error::{EpError, EpResult};
    pub use factep_potentials::prelude::*;
}
