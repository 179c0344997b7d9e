mod driver;
mod schedule;

pub use driver::{DriverTuning, EpDriver, EpDriverBuilder, UpdateOutcome, UpdateStatus};
pub use schedule::{ScheduleReport, recompute_max_ac, recompute_max_pi, run_schedule};

pub use factep_core::prelude::*;
pub use factep_error::{EpError, EpResult, ErrorKind, ep_err, require};
pub use factep_potentials::prelude::*;

pub fn init_logging() {
    pub use std::sync::Once;
    static INIT_LOGGING: Once = Once::new();

    INIT_LOGGING.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .compact(),
            )
            .init();
    });
}
