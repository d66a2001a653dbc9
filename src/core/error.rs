use thiserror::Error;

use crate::model::ModelError;
use crate::optimize::NelderMeadError;
use crate::options::ValidationError;

/// Error returned from constructing a generator or generating candidates.
#[derive(Debug, Error)]
pub enum Error {
    /// The problem definition or the options do not fit the generator, or a
    /// value required by the generator is missing.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// An options field violates its declared range or shape.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The observation data cannot be used (e.g., no complete row).
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// There is not enough data to fit a model.
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    /// The generator cannot produce the requested number of candidates at
    /// once.
    #[error("{generator} cannot produce {requested} candidates at once")]
    UnsupportedBatchSize {
        /// Name of the generator.
        generator: &'static str,
        /// Requested number of candidates.
        requested: usize,
    },
    /// Fitting the surrogate model failed.
    #[error("model fitting failed: {0}")]
    Model(#[from] ModelError),
    /// Maximizing the acquisition function failed.
    #[error("acquisition optimization failed: {0}")]
    Optimization(#[from] NelderMeadError),
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether the error belongs to configuration errors (wrong options or
    /// mismatch between problem definition and generator).
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Validation(_))
    }
}
