//! The collection of implemented generators.

pub mod bayesian;
pub mod cnsga;
pub mod extremum_seeking;
pub mod mggpo;
pub mod random;
pub mod upper_confidence_bound;

pub use bayesian::{AcquisitionStrategy, BayesianGenerator};
pub use cnsga::CnsgaGenerator;
pub use extremum_seeking::ExtremumSeekingGenerator;
pub use mggpo::MggpoGenerator;
pub use random::RandomGenerator;
pub use upper_confidence_bound::UpperConfidenceBoundGenerator;
