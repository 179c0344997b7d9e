pub mod layout;
pub mod maxval;
pub mod repres;
pub mod specfun;

pub use maxval::{
    LinkValues, MaxValueTracker, PiColumns, TauAColumns, TauCColumns, alloc_tracker_arrays,
};
pub use repres::{Col, FactorizedRepr, PrecisionRepr, Row, RowMut, check_tau_index};

pub mod prelude {
    pub use super::layout::{build_layout, build_tau_index};
    pub use super::maxval::{
        LinkValues, MaxValueTracker, PiColumns, TauAColumns, TauCColumns, alloc_tracker_arrays,
    };
    pub use super::repres::{Col, FactorizedRepr, PrecisionRepr, Row, RowMut, check_tau_index};
}
