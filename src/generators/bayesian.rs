//! Bayesian optimization control loop.
//!
//! Every call to [`generate`](Generator::generate) runs the same three phases:
//!
//! 1. The observations are split into an input matrix (variable columns, plus
//!    the time column for time-dependent generators) and an output matrix
//!    (objectives followed by constraints), skipping incomplete rows.
//! 2. A surrogate model is built from scratch by the [`ModelConstructor`].
//! 3. The [`AcquisitionStrategy`] assembles the acquisition function which is
//!    then maximized over the bounds of the variables.
//!
//! With no observations at all, the generator samples
//! [`n_initial`](BayesianOptions::n_initial) random points instead.
//!
//! Specialized generators only differ in their strategy, see
//! [`UpperConfidenceBound`](super::upper_confidence_bound::UpperConfidenceBound)
//! and [`Mggpo`](super::mggpo::Mggpo).

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::acquisition::{AcquisitionFunction, FixedFeature, McSampler, Proximal};
use crate::core::{append_observations, Domain, Error, Generator, Table, Vocs};
use crate::model::{Model, ModelConstructor, ModelInputs, StandardModelConstructor};
use crate::optimize::optimize_acquisition;
use crate::options::{AcquisitionOptions, BayesianOptions};

/// Inputs and outputs of the complete observations.
#[derive(Debug, Clone)]
pub struct TrainingData {
    input_names: Vec<String>,
    output_names: Vec<String>,
    inputs: DMatrix<f64>,
    outputs: DMatrix<f64>,
}

impl TrainingData {
    /// Input column names in the order of the input matrix columns.
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Output column names in the order of the output matrix columns.
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// One row per observation.
    pub fn inputs(&self) -> &DMatrix<f64> {
        &self.inputs
    }

    /// One row per observation.
    pub fn outputs(&self) -> &DMatrix<f64> {
        &self.outputs
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    /// Whether there are no observations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First `n` input values of the most recent observation.
    fn last_inputs(&self, n: usize) -> DVector<f64> {
        let last = self.len() - 1;
        self.inputs.row(last).columns(0, n).transpose()
    }
}

/// Everything an acquisition strategy can build the acquisition function
/// from.
pub struct AcquisitionContext<'a, M> {
    /// The problem definition.
    pub vocs: &'a Vocs,
    /// Model trained on the current observations.
    pub model: &'a M,
    /// The observations the model was trained on.
    pub training: &'a TrainingData,
    /// Configuration of Monte-Carlo sampling.
    pub sampler: McSampler,
}

/// Acquisition policy plugged into [`BayesianGenerator`].
pub trait AcquisitionStrategy: Default {
    /// Name of the generator using the strategy.
    const NAME: &'static str;

    /// Acquisition options node of the strategy.
    type Options: AcquisitionOptions;

    /// Checks that the problem definition and the options fit the strategy.
    /// Called once when the generator is constructed.
    fn check(&self, vocs: &Vocs, options: &Self::Options) -> Result<(), Error>;

    /// Builds the acquisition function over the model inputs.
    fn acquisition<'a, M: Model + 'a>(
        &self,
        options: &Self::Options,
        context: AcquisitionContext<'a, M>,
    ) -> Result<Box<dyn AcquisitionFunction + 'a>, Error>;
}

fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or_default()
}

/// Bayesian optimization generator. See [module](self) documentation for more
/// details.
pub struct BayesianGenerator<S: AcquisitionStrategy, C = StandardModelConstructor> {
    vocs: Vocs,
    options: BayesianOptions<S::Options>,
    data: Table,
    strategy: S,
    model_constructor: C,
    rng: StdRng,
    sampler_seed: u64,
    clock: fn() -> f64,
}

impl<S: AcquisitionStrategy> BayesianGenerator<S, StandardModelConstructor> {
    /// Initializes the generator with default options.
    pub fn new(vocs: Vocs) -> Result<Self, Error> {
        Self::with_options(vocs, BayesianOptions::default())
    }

    /// Initializes the generator with given options and the default model
    /// constructor.
    pub fn with_options(vocs: Vocs, options: BayesianOptions<S::Options>) -> Result<Self, Error> {
        let model_constructor = StandardModelConstructor::new(options.model().clone());
        Self::with_model_constructor(vocs, options, model_constructor)
    }
}

impl<S: AcquisitionStrategy, C: ModelConstructor> BayesianGenerator<S, C> {
    /// Initializes the generator with given options and model constructor.
    pub fn with_model_constructor(
        vocs: Vocs,
        options: BayesianOptions<S::Options>,
        model_constructor: C,
    ) -> Result<Self, Error> {
        options.validate()?;

        let strategy = S::default();
        strategy.check(&vocs, options.acq())?;

        let n = vocs.n_variables();
        if let Some(lengthscales) = options.acq().base().proximal_lengthscales() {
            if lengthscales.len() != n {
                return Err(Error::configuration(format!(
                    "expected {} proximal lengthscales, got {}",
                    n,
                    lengthscales.len()
                )));
            }
        }

        if let Some(distances) = options.optim().max_travel_distances() {
            if distances.len() != n {
                return Err(Error::configuration(format!(
                    "expected {} max travel distances, got {}",
                    n,
                    distances.len()
                )));
            }
        }

        if let Some(time) = options.time() {
            if vocs.variable_names().contains(time.column()) || vocs.output_names().contains(time.column()) {
                return Err(Error::configuration(format!(
                    "time column `{}` clashes with a problem name",
                    time.column()
                )));
            }
        }

        let mut rng = StdRng::from_entropy();
        let sampler_seed = rng.gen();

        Ok(Self {
            vocs,
            options,
            data: Table::default(),
            strategy,
            model_constructor,
            rng,
            sampler_seed,
            clock: unix_time,
        })
    }

    /// Makes the random choices of the generator reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self.sampler_seed = seed;
        self
    }

    /// Replaces the wall clock (seconds since the Unix epoch) used by the
    /// time-dependent capability.
    pub fn with_clock(mut self, clock: fn() -> f64) -> Self {
        self.clock = clock;
        self
    }

    /// The model constructor.
    pub fn model_constructor(&self) -> &C {
        &self.model_constructor
    }

    /// The strategy.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Names of the model inputs: the variables followed by the time column
    /// if time-dependent.
    pub fn input_names(&self) -> Vec<String> {
        let mut names = self.vocs.variable_names().to_vec();
        if let Some(time) = self.options.time() {
            names.push(time.column().clone());
        }
        names
    }

    /// Time at which candidates are searched by the time-dependent capability.
    pub fn target_time(&self) -> f64 {
        let added = self
            .options
            .time()
            .as_ref()
            .map(|time| time.added_time())
            .unwrap_or(0.0);
        (self.clock)() + added
    }

    /// Extracts the complete observations, with columns in the order of the
    /// problem definition.
    ///
    /// Fails with [`Error::InvalidData`] if an input column is absent or no
    /// observation is complete.
    pub fn get_training_data(&self) -> Result<TrainingData, Error> {
        let input_names = self.input_names();
        let output_names = self.vocs.output_names();

        self.data.require_columns(&input_names)?;

        let all = input_names
            .iter()
            .chain(output_names.iter())
            .cloned()
            .collect::<Vec<_>>();
        let rows = self.data.complete_rows(&all);

        if rows.is_empty() {
            return Err(Error::InvalidData(
                "no observation has values for all inputs and outputs".to_string(),
            ));
        }

        debug!(
            "{} out of {} observations are complete",
            rows.len(),
            self.data.len()
        );

        Ok(TrainingData {
            inputs: self.data.matrix(&rows, &input_names)?,
            outputs: self.data.matrix(&rows, &output_names)?,
            input_names,
            output_names,
        })
    }

    /// Domain of the model inputs.
    ///
    /// For time-dependent generators the bounds are extended by the range of
    /// observed times including the target time.
    pub fn model_domain(&self) -> Result<Domain, Error> {
        let time = match self.options.time() {
            Some(time) => time,
            None => return Ok(self.vocs.bounds().clone()),
        };

        let times = self
            .data
            .column(time.column())
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        // Observations must arrive in time order.
        if let Some(pair) = times.windows(2).find(|pair| !(pair[0] <= pair[1])) {
            return Err(Error::InvalidData(format!(
                "column `{}` must be non-decreasing, got {} after {}",
                time.column(),
                pair[1],
                pair[0]
            )));
        }

        let target = self.target_time();
        let (lower, upper) = times
            .iter()
            .fold((target, target), |(lower, upper), &t| (lower.min(t), upper.max(t)));

        if !lower.is_finite() || !upper.is_finite() {
            return Err(Error::InvalidData(format!(
                "column `{}` contains invalid times",
                time.column()
            )));
        }

        // Keep the time dimension non-degenerate.
        let upper = upper.max(lower + 1.0);
        trace!("time domain [{}, {}]", lower, upper);

        Ok(self.vocs.bounds().extended(lower, upper))
    }

    /// Builds the model from all observations.
    pub fn train_model(&self) -> Result<C::Model, Error> {
        let input_names = self.input_names();
        let output_names = self.vocs.output_names();
        let domain = self.model_domain()?;

        let inputs = ModelInputs {
            input_names: &input_names,
            output_names: &output_names,
            domain: &domain,
        };

        self.model_constructor.build_model(&inputs, &self.data)
    }

    /// Builds the acquisition function over the variables.
    ///
    /// The strategy's function is wrapped to fix the time input at the target
    /// time (time-dependent) and to apply proximal biasing (if proximal
    /// lengthscales are set).
    pub fn get_acquisition<'a>(
        &'a self,
        model: &'a C::Model,
        training: &'a TrainingData,
    ) -> Result<Box<dyn AcquisitionFunction + 'a>, Error>
    where
        C::Model: 'a,
    {
        let base = self.options.acq().base();
        let context = AcquisitionContext {
            vocs: &self.vocs,
            model,
            training,
            sampler: McSampler::new(base.monte_carlo_samples(), self.sampler_seed),
        };

        let mut acq = self.strategy.acquisition(self.options.acq(), context)?;

        if self.options.is_time_dependent() {
            let target = self.target_time();
            trace!("acquisition fixed at time {}", target);
            acq = Box::new(FixedFeature::new(acq, target));
        }

        if let Some(lengthscales) = base.proximal_lengthscales() {
            let n = self.vocs.n_variables();
            let domain = if base.use_transformed_proximal_weights() {
                Some(self.vocs.bounds().clone())
            } else {
                None
            };

            acq = Box::new(Proximal::new(
                acq,
                training.last_inputs(n),
                DVector::from_column_slice(lengthscales),
                domain,
            ));
        }

        Ok(acq)
    }

    /// Domain over which the acquisition function is maximized.
    fn optimization_domain(&self, training: &TrainingData) -> Domain {
        match self.options.optim().max_travel_distances() {
            Some(distances) => self
                .vocs
                .bounds()
                .restrict_around(&training.last_inputs(self.vocs.n_variables()), distances),
            None => self.vocs.bounds().clone(),
        }
    }

    /// Random points returned while there are no observations.
    fn initial_points(&mut self) -> Table {
        let n = self.options.n_initial();
        debug!("no observations, sampling {} random points", n);
        self.vocs.random_inputs(n, &mut self.rng)
    }

    fn empty_candidates(&self) -> Table {
        self.vocs
            .inputs_from_matrix(&DMatrix::zeros(0, self.vocs.n_variables()))
    }
}

impl<S: AcquisitionStrategy, C: ModelConstructor> Generator for BayesianGenerator<S, C> {
    const NAME: &'static str = S::NAME;
    type Options = BayesianOptions<S::Options>;

    fn default_options() -> Self::Options {
        BayesianOptions::default()
    }

    fn vocs(&self) -> &Vocs {
        &self.vocs
    }

    fn options(&self) -> &Self::Options {
        &self.options
    }

    fn data(&self) -> &Table {
        &self.data
    }

    fn add_data(&mut self, new_data: &Table) -> Result<(), Error> {
        append_observations(&self.vocs, &mut self.data, new_data)
    }

    fn generate(&mut self, n_candidates: usize) -> Result<Table, Error> {
        if n_candidates == 0 {
            return Ok(self.empty_candidates());
        }

        if self.data.is_empty() {
            return Ok(self.initial_points());
        }

        let training = self.get_training_data()?;
        let model = self.train_model()?;
        let domain = self.optimization_domain(&training);
        let nearby = training.last_inputs(self.vocs.n_variables());
        let mut rng = StdRng::seed_from_u64(self.rng.gen());

        let acq = self.get_acquisition(&model, &training)?;
        let candidates = optimize_acquisition(
            &acq,
            &domain,
            n_candidates,
            self.options.optim(),
            Some(&nearby),
            &mut rng,
        )?;

        debug!(
            "{} generated {} candidates from {} observations",
            S::NAME,
            n_candidates,
            training.len()
        );

        Ok(self.vocs.inputs_from_matrix(&candidates))
    }
}
