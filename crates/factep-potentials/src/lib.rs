pub mod families;
pub mod manager;
pub mod potential;
pub mod quad;
pub mod registry;

pub use families::{GaussMixture, Gaussian, Laplace, Probit, QuantileRegress, SpikeSlab};
pub use manager::{
    BlockPotManager, CompositePotManager, ManagerSpec, PotentialManager, build_manager,
    check_representation,
};
pub use potential::{
    ArgumentGroup, EpPotential, GammaCavity, GaussianCavity, Moments, PrecisionMoments,
};
pub use quad::{
    AdaptiveSimpson, GaussianPrecision, LaplaceQuad, NegBinomialExpRate, PoissonExpRate,
    PoissonLogisticRate, QuadPotential, QuadratureProvider,
};
pub use registry::{Annotation, create, create_default, id_for_name, is_valid_id, name_for_id};

pub mod prelude {
    pub use super::families::{GaussMixture, Gaussian, Laplace, Probit, QuantileRegress, SpikeSlab};
    pub use super::manager::{
        BlockPotManager, CompositePotManager, ManagerSpec, PotentialManager, build_manager,
        check_representation,
    };
    pub use super::potential::{
        ArgumentGroup, EpPotential, GammaCavity, GaussianCavity, Moments, PrecisionMoments,
    };
    pub use super::quad::{AdaptiveSimpson, QuadratureProvider};
    pub use super::registry::{Annotation, create, create_default, id_for_name, name_for_id};
}
