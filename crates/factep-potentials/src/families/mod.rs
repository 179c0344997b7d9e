mod gaussian;
mod laplace;
mod mixture;
mod probit;
mod quantile;
mod spike_slab;

pub use gaussian::Gaussian;
pub use laplace::Laplace;
pub use mixture::GaussMixture;
pub use probit::Probit;
pub use quantile::QuantileRegress;
pub use spike_slab::SpikeSlab;
