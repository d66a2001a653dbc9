//! Options of the Bayesian generators.
//!
//! Options form a tree of plain value types with a default for every field, so
//! that any generator can be constructed without specifying anything. Numeric
//! fields are validated whenever they are assigned through a setter and the
//! whole tree is validated again when a generator is constructed.
//!
//! Specialized generators do not subclass options. Instead, [`BayesianOptions`]
//! is generic over its acquisition node and each acquisition node embeds the
//! common [`AcqOptions`]:
//!
//! ```rust
//! use seqopt::generators::upper_confidence_bound::UcbOptions;
//!
//! let mut options = UcbOptions::default();
//! options.acq_mut().set_beta(0.5).unwrap();
//! options.optim_mut().set_raw_samples(64).unwrap();
//!
//! assert!(options.optim_mut().set_num_restarts(0).is_err());
//! ```

use std::fmt::Debug;

use getset::{CopyGetters, Getters, MutGetters, Setters};
use thiserror::Error;

use crate::optimize::NelderMeadOptions;

/// Error of an options field assignment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The value is out of the allowed range.
    #[error("`{field}` must be {expected}, got {value}")]
    OutOfRange {
        /// Name of the field.
        field: &'static str,
        /// Description of the allowed range.
        expected: &'static str,
        /// The rejected value.
        value: f64,
    },
    /// The list is empty while at least one element is required.
    #[error("`{field}` must not be empty")]
    Empty {
        /// Name of the field.
        field: &'static str,
    },
    /// The string is empty.
    #[error("`{field}` must be a non-empty name")]
    EmptyName {
        /// Name of the field.
        field: &'static str,
    },
}

pub(crate) fn check_positive(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            expected: "positive and finite",
            value,
        })
    }
}

pub(crate) fn check_finite(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            expected: "finite",
            value,
        })
    }
}

pub(crate) fn check_at_least(
    field: &'static str,
    value: usize,
    min: usize,
) -> Result<usize, ValidationError> {
    if value >= min {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            expected: if min == 1 { "at least 1" } else { "at least 2" },
            value: value as f64,
        })
    }
}

pub(crate) fn check_positive_list(
    field: &'static str,
    values: &[f64],
) -> Result<(), ValidationError> {
    if values.is_empty() {
        return Err(ValidationError::Empty { field });
    }

    values
        .iter()
        .try_for_each(|value| check_positive(field, *value).map(|_| ()))
}

/// Node of acquisition options. Every acquisition node carries the common
/// [`AcqOptions`].
pub trait AcquisitionOptions: Debug + Clone + Default {
    /// The common acquisition options.
    fn base(&self) -> &AcqOptions;

    /// Validates all fields of the node.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Common options for defining the acquisition function.
#[derive(Debug, Clone, PartialEq, CopyGetters, Getters, Setters)]
pub struct AcqOptions {
    /// Number of Monte-Carlo samples used for estimating the acquisition
    /// function. Default: `128`.
    #[getset(get_copy = "pub")]
    monte_carlo_samples: usize,
    /// Lengthscales for proximal biasing, one per variable. Default: none.
    #[getset(get = "pub")]
    proximal_lengthscales: Option<Vec<f64>>,
    /// Whether the proximal weights are computed in the normalized (unit cube)
    /// space. Default: `true`.
    #[getset(get_copy = "pub", set = "pub")]
    use_transformed_proximal_weights: bool,
}

impl Default for AcqOptions {
    fn default() -> Self {
        Self {
            monte_carlo_samples: 128,
            proximal_lengthscales: None,
            use_transformed_proximal_weights: true,
        }
    }
}

impl AcqOptions {
    /// Sets the number of Monte-Carlo samples.
    pub fn set_monte_carlo_samples(&mut self, value: usize) -> Result<&mut Self, ValidationError> {
        self.monte_carlo_samples = check_at_least("monte_carlo_samples", value, 1)?;
        Ok(self)
    }

    /// Sets or clears the proximal lengthscales.
    pub fn set_proximal_lengthscales(
        &mut self,
        value: Option<Vec<f64>>,
    ) -> Result<&mut Self, ValidationError> {
        if let Some(lengthscales) = value.as_ref() {
            check_positive_list("proximal_lengthscales", lengthscales)?;
        }
        self.proximal_lengthscales = value;
        Ok(self)
    }
}

impl AcquisitionOptions for AcqOptions {
    fn base(&self) -> &AcqOptions {
        self
    }

    fn validate(&self) -> Result<(), ValidationError> {
        check_at_least("monte_carlo_samples", self.monte_carlo_samples, 1)?;
        if let Some(lengthscales) = self.proximal_lengthscales.as_ref() {
            check_positive_list("proximal_lengthscales", lengthscales)?;
        }
        Ok(())
    }
}

/// Options for maximizing the acquisition function.
#[derive(Debug, Clone, PartialEq, CopyGetters, Getters, Setters)]
pub struct OptimOptions {
    /// Number of local searches started from the best raw samples. Default:
    /// `5`.
    #[getset(get_copy = "pub")]
    num_restarts: usize,
    /// Number of random samples used to seed the local searches. Default:
    /// `20`.
    #[getset(get_copy = "pub")]
    raw_samples: usize,
    /// Whether a batch of candidates is chosen one point at a time (greedily)
    /// instead of jointly. Default: `true`.
    #[getset(get_copy = "pub", set = "pub")]
    sequential: bool,
    /// Whether part of the raw samples is drawn close to the most recent
    /// observation. Default: `true`.
    #[getset(get_copy = "pub", set = "pub")]
    use_nearby_initial_points: bool,
    /// Limits of the distance from the most recent observation, as fractions
    /// of the variable ranges. Default: none.
    #[getset(get = "pub")]
    max_travel_distances: Option<Vec<f64>>,
    /// Maximum number of iterations of every local search. Default: `100`.
    #[getset(get_copy = "pub")]
    max_iterations: usize,
    /// Configuration of the Nelder-Mead local search. Default: balanced
    /// coefficients with initial step `0.1`.
    #[getset(get_copy = "pub")]
    local_search: NelderMeadOptions,
}

impl Default for OptimOptions {
    fn default() -> Self {
        Self {
            num_restarts: 5,
            raw_samples: 20,
            sequential: true,
            use_nearby_initial_points: true,
            max_travel_distances: None,
            max_iterations: 100,
            local_search: NelderMeadOptions::default(),
        }
    }
}

impl OptimOptions {
    /// Sets the number of restarts.
    pub fn set_num_restarts(&mut self, value: usize) -> Result<&mut Self, ValidationError> {
        self.num_restarts = check_at_least("num_restarts", value, 1)?;
        Ok(self)
    }

    /// Sets the number of raw samples.
    pub fn set_raw_samples(&mut self, value: usize) -> Result<&mut Self, ValidationError> {
        self.raw_samples = check_at_least("raw_samples", value, 1)?;
        Ok(self)
    }

    /// Sets or clears the travel distance limits.
    pub fn set_max_travel_distances(
        &mut self,
        value: Option<Vec<f64>>,
    ) -> Result<&mut Self, ValidationError> {
        if let Some(distances) = value.as_ref() {
            check_positive_list("max_travel_distances", distances)?;
        }
        self.max_travel_distances = value;
        Ok(self)
    }

    /// Sets the iteration limit of local searches.
    pub fn set_max_iterations(&mut self, value: usize) -> Result<&mut Self, ValidationError> {
        self.max_iterations = check_at_least("max_iterations", value, 1)?;
        Ok(self)
    }

    /// Sets the configuration of the local search.
    pub fn set_local_search(
        &mut self,
        value: NelderMeadOptions,
    ) -> Result<&mut Self, ValidationError> {
        check_positive("local_search.initial_step", value.initial_step())?;
        self.local_search = value;
        Ok(self)
    }

    /// Validates all fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_at_least("num_restarts", self.num_restarts, 1)?;
        check_at_least("raw_samples", self.raw_samples, 1)?;
        check_at_least("max_iterations", self.max_iterations, 1)?;
        check_positive("local_search.initial_step", self.local_search.initial_step())?;
        if let Some(distances) = self.max_travel_distances.as_ref() {
            check_positive_list("max_travel_distances", distances)?;
        }
        Ok(())
    }
}

/// Options of the default surrogate model.
#[derive(Debug, Clone, PartialEq, CopyGetters, Getters)]
pub struct ModelOptions {
    /// Candidate lengthscales (in the normalized input space) from which the
    /// one maximizing the marginal likelihood is chosen. Default: 9 values
    /// from `0.05` to `2.5`.
    #[getset(get = "pub")]
    lengthscale_grid: Vec<f64>,
    /// Observation noise variance relative to the output variance. Default:
    /// `1e-4`.
    #[getset(get_copy = "pub")]
    noise_variance: f64,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            lengthscale_grid: vec![0.05, 0.1, 0.2, 0.35, 0.5, 0.75, 1.0, 1.5, 2.5],
            noise_variance: 1e-4,
        }
    }
}

impl ModelOptions {
    /// Sets the lengthscale grid.
    pub fn set_lengthscale_grid(&mut self, value: Vec<f64>) -> Result<&mut Self, ValidationError> {
        check_positive_list("lengthscale_grid", &value)?;
        self.lengthscale_grid = value;
        Ok(self)
    }

    /// Sets the relative noise variance.
    pub fn set_noise_variance(&mut self, value: f64) -> Result<&mut Self, ValidationError> {
        self.noise_variance = check_positive("noise_variance", value)?;
        Ok(self)
    }

    /// Validates all fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_positive_list("lengthscale_grid", &self.lengthscale_grid)?;
        check_positive("noise_variance", self.noise_variance)?;
        Ok(())
    }
}

/// Options of the time-dependent capability.
///
/// When present in [`BayesianOptions`], the model additionally conditions on
/// the time column of the observations and candidates are searched at the
/// current time (plus [`added_time`](TimeOptions::added_time)).
#[derive(Debug, Clone, PartialEq, CopyGetters, Getters)]
pub struct TimeOptions {
    /// Offset (in seconds) added to the current time at which candidates are
    /// searched. Default: `0`.
    #[getset(get_copy = "pub")]
    added_time: f64,
    /// Name of the column holding the observation time in seconds since the
    /// Unix epoch. Default: `"time"`.
    #[getset(get = "pub")]
    column: String,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            added_time: 0.0,
            column: "time".to_string(),
        }
    }
}

impl TimeOptions {
    /// Sets the time offset.
    pub fn set_added_time(&mut self, value: f64) -> Result<&mut Self, ValidationError> {
        if check_finite("added_time", value)? < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "added_time",
                expected: "non-negative",
                value,
            });
        }
        self.added_time = value;
        Ok(self)
    }

    /// Sets the name of the time column.
    pub fn set_column(&mut self, value: impl Into<String>) -> Result<&mut Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::EmptyName { field: "column" });
        }
        self.column = value;
        Ok(self)
    }

    /// Validates all fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.added_time.is_finite() || self.added_time < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "added_time",
                expected: "non-negative and finite",
                value: self.added_time,
            });
        }
        if self.column.is_empty() {
            return Err(ValidationError::EmptyName { field: "column" });
        }
        Ok(())
    }
}

/// Options of a Bayesian generator with acquisition node `A`.
#[derive(Debug, Clone, PartialEq, CopyGetters, Getters, MutGetters)]
pub struct BayesianOptions<A: AcquisitionOptions = AcqOptions> {
    /// Options of the acquisition function optimization.
    #[getset(get = "pub", get_mut = "pub")]
    optim: OptimOptions,
    /// Options of the acquisition function.
    #[getset(get = "pub", get_mut = "pub")]
    acq: A,
    /// Options of the surrogate model.
    #[getset(get = "pub", get_mut = "pub")]
    model: ModelOptions,
    /// Number of random points returned when there is no data yet. Default:
    /// `3`.
    #[getset(get_copy = "pub")]
    n_initial: usize,
    /// Time-dependent capability. Default: disabled.
    #[getset(get = "pub")]
    time: Option<TimeOptions>,
}

impl<A: AcquisitionOptions> Default for BayesianOptions<A> {
    fn default() -> Self {
        Self {
            optim: OptimOptions::default(),
            acq: A::default(),
            model: ModelOptions::default(),
            n_initial: 3,
            time: None,
        }
    }
}

impl<A: AcquisitionOptions> BayesianOptions<A> {
    /// Default options with the time-dependent capability enabled.
    pub fn time_dependent() -> Self {
        Self {
            time: Some(TimeOptions::default()),
            ..Self::default()
        }
    }

    /// Sets the number of initial random points.
    pub fn set_n_initial(&mut self, value: usize) -> Result<&mut Self, ValidationError> {
        self.n_initial = check_at_least("n_initial", value, 1)?;
        Ok(self)
    }

    /// Enables or disables the time-dependent capability.
    pub fn set_time(&mut self, value: Option<TimeOptions>) -> Result<&mut Self, ValidationError> {
        if let Some(time) = value.as_ref() {
            time.validate()?;
        }
        self.time = value;
        Ok(self)
    }

    /// Whether the time-dependent capability is enabled.
    pub fn is_time_dependent(&self) -> bool {
        self.time.is_some()
    }

    /// Validates the whole tree.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.optim.validate()?;
        self.acq.validate()?;
        self.model.validate()?;
        check_at_least("n_initial", self.n_initial, 1)?;
        if let Some(time) = self.time.as_ref() {
            time.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::CoefficientsFamily;

    #[test]
    fn defaults_are_valid() {
        let options = BayesianOptions::<AcqOptions>::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.n_initial(), 3);
        assert_eq!(options.acq().monte_carlo_samples(), 128);
        assert_eq!(options.optim().num_restarts(), 5);
        assert_eq!(options.optim().raw_samples(), 20);
        assert!(options.optim().sequential());
        assert!(!options.is_time_dependent());
    }

    #[test]
    fn defaults_are_not_shared() {
        let mut a = BayesianOptions::<AcqOptions>::default();
        let b = BayesianOptions::<AcqOptions>::default();

        a.optim_mut().set_raw_samples(30).unwrap();
        assert_eq!(b.optim().raw_samples(), 20);
    }

    #[test]
    fn assignment_is_validated() {
        let mut options = BayesianOptions::<AcqOptions>::default();

        assert!(options.set_n_initial(0).is_err());
        assert_eq!(options.n_initial(), 3);

        assert!(options.acq_mut().set_monte_carlo_samples(0).is_err());
        assert!(options
            .acq_mut()
            .set_proximal_lengthscales(Some(vec![1.0, -1.0]))
            .is_err());
        assert!(options.acq().proximal_lengthscales().is_none());

        assert!(options
            .optim_mut()
            .set_max_travel_distances(Some(vec![]))
            .is_err());
        assert!(options.model_mut().set_noise_variance(f64::NAN).is_err());
    }

    #[test]
    fn chained_setters() {
        let mut options = OptimOptions::default();
        options
            .set_num_restarts(10)
            .unwrap()
            .set_raw_samples(100)
            .unwrap()
            .set_sequential(false);

        assert_eq!(options.num_restarts(), 10);
        assert_eq!(options.raw_samples(), 100);
        assert!(!options.sequential());
    }

    #[test]
    fn local_search_options() {
        let mut options = OptimOptions::default();
        assert_eq!(options.local_search(), NelderMeadOptions::default());

        let mut local = NelderMeadOptions::default();
        local.set_initial_step(-0.1);
        assert!(options.set_local_search(local).is_err());
        assert_eq!(options.local_search().initial_step(), 0.1);

        local
            .set_family(CoefficientsFamily::Standard)
            .set_initial_step(0.2);
        options.set_local_search(local).unwrap();
        assert_eq!(options.local_search().family(), CoefficientsFamily::Standard);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn time_options() {
        let options = BayesianOptions::<AcqOptions>::time_dependent();
        assert!(options.is_time_dependent());
        assert_eq!(options.time().as_ref().unwrap().column(), "time");

        let mut time = TimeOptions::default();
        assert!(time.set_added_time(-1.0).is_err());
        assert!(time.set_column("").is_err());
    }
}
