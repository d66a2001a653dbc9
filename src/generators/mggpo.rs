//! Multi-generation Gaussian process optimization.
//!
//! A hybrid of a genetic algorithm and Bayesian multi-objective optimization.
//! In each step, the [genetic sub-generator](super::cnsga) proposes a pool of
//! ten times the requested number of candidates. The pool is then scored by
//! the expected hypervolume improvement of a model trained on all observations
//! and the best candidates are returned.
//!
//! The expected hypervolume improvement needs a reference point, one value
//! per objective given by
//! [`reference_point`](MggpoAcqOptions::reference_point). There is no
//! default; generating candidates without it fails.
//!
//! # References
//!
//! \[1\] [Multiobjective Bayesian optimization for online accelerator
//! tuning](https://doi.org/10.1103/PhysRevAccelBeams.24.062801)

use std::cmp::Ordering;
use std::collections::BTreeMap;

use getset::{CopyGetters, Getters, MutGetters};
use log::debug;
use nalgebra::DMatrix;

use super::bayesian::{AcquisitionContext, AcquisitionStrategy, BayesianGenerator};
use super::cnsga::{CnsgaGenerator, CnsgaOptions};
use crate::acquisition::{
    create_constraints, create_multi_objective, AcquisitionFunction, ConstrainedMcAcquisition,
    ExpectedHypervolumeImprovement,
};
use crate::core::{Error, Generator, Table, Vocs};
use crate::model::{Model, ModelConstructor, StandardModelConstructor};
use crate::options::{
    check_at_least, check_finite, AcqOptions, AcquisitionOptions, BayesianOptions, ValidationError,
};

/// Acquisition options of [`Mggpo`].
#[derive(Debug, Clone, PartialEq, CopyGetters, Getters, MutGetters)]
pub struct MggpoAcqOptions {
    /// Common acquisition options.
    #[getset(get = "pub", get_mut = "pub")]
    base: AcqOptions,
    /// Reference point of the hypervolume, keyed by objective name, in the
    /// units of the objectives. Default: none.
    #[getset(get = "pub")]
    reference_point: Option<BTreeMap<String, f64>>,
    /// Population size of the genetic sub-generator. Default: `64`.
    #[getset(get_copy = "pub")]
    population_size: usize,
}

impl Default for MggpoAcqOptions {
    fn default() -> Self {
        Self {
            base: AcqOptions::default(),
            reference_point: None,
            population_size: 64,
        }
    }
}

impl MggpoAcqOptions {
    /// Sets or clears the reference point.
    pub fn set_reference_point(
        &mut self,
        value: Option<BTreeMap<String, f64>>,
    ) -> Result<&mut Self, ValidationError> {
        if let Some(point) = value.as_ref() {
            check_reference_point(point)?;
        }
        self.reference_point = value;
        Ok(self)
    }

    /// Sets the population size of the genetic sub-generator.
    pub fn set_population_size(&mut self, value: usize) -> Result<&mut Self, ValidationError> {
        self.population_size = check_at_least("population_size", value, 2)?;
        Ok(self)
    }
}

fn check_reference_point(point: &BTreeMap<String, f64>) -> Result<(), ValidationError> {
    if point.keys().any(|name| name.is_empty()) {
        return Err(ValidationError::EmptyName {
            field: "reference_point",
        });
    }

    point
        .values()
        .try_for_each(|value| check_finite("reference_point", *value).map(|_| ()))
}

impl AcquisitionOptions for MggpoAcqOptions {
    fn base(&self) -> &AcqOptions {
        &self.base
    }

    fn validate(&self) -> Result<(), ValidationError> {
        self.base.validate()?;
        check_at_least("population_size", self.population_size, 2)?;
        if let Some(point) = self.reference_point.as_ref() {
            check_reference_point(point)?;
        }
        Ok(())
    }
}

/// Options of [`MggpoGenerator`].
pub type MggpoOptions = BayesianOptions<MggpoAcqOptions>;

/// Reference point in the maximization space, in the order of the objectives.
///
/// Fails if the reference point is not set or misses an objective.
pub fn reference_point(vocs: &Vocs, options: &MggpoAcqOptions) -> Result<Vec<f64>, Error> {
    let point = options
        .reference_point()
        .as_ref()
        .ok_or_else(|| Error::configuration("reference point is required for hypervolume"))?;

    vocs.objectives()
        .iter()
        .map(|(name, direction)| {
            point
                .get(name)
                .map(|value| direction.sign() * value)
                .ok_or_else(|| {
                    Error::configuration(format!("reference point misses objective `{}`", name))
                })
        })
        .collect()
}

/// Expected hypervolume improvement strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mggpo;

impl AcquisitionStrategy for Mggpo {
    const NAME: &'static str = "mggpo";
    type Options = MggpoAcqOptions;

    fn check(&self, vocs: &Vocs, _options: &MggpoAcqOptions) -> Result<(), Error> {
        if vocs.n_objectives() == 0 {
            return Err(Error::configuration(
                "hypervolume optimization requires at least one objective",
            ));
        }

        Ok(())
    }

    fn acquisition<'a, M: Model + 'a>(
        &self,
        options: &MggpoAcqOptions,
        context: AcquisitionContext<'a, M>,
    ) -> Result<Box<dyn AcquisitionFunction + 'a>, Error> {
        let reference = reference_point(context.vocs, options)?;
        let objective = create_multi_objective(context.vocs);
        let constraints = create_constraints(context.vocs);

        // Baseline front from the predictions at the observed inputs.
        let baseline = context
            .model
            .posterior(context.training.inputs())
            .mean_matrix();
        let feasible = baseline
            .row_iter()
            .map(|y| {
                let y = y.transpose();
                constraints.iter().all(|constraint| constraint.margin(&y) <= 0.0)
            })
            .collect::<Vec<_>>();

        let utility = ExpectedHypervolumeImprovement::new(objective, reference, &baseline, &feasible);
        debug!(
            "baseline front of {} points, hypervolume {}",
            utility.front().len(),
            utility.baseline_volume()
        );

        Ok(Box::new(ConstrainedMcAcquisition::new(
            context.model,
            utility,
            constraints,
            context.sampler,
        )))
    }
}

/// Indices ordered by descending score. Ties keep their original order and
/// NaN scores come last.
pub(crate) fn rank_descending(scores: &[f64]) -> Vec<usize> {
    let mut indices = (0..scores.len()).collect::<Vec<_>>();
    let key = |i: usize| {
        if scores[i].is_nan() {
            f64::NEG_INFINITY
        } else {
            scores[i]
        }
    };

    // Stable sort.
    indices.sort_by(|&a, &b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
    indices
}

/// Hybrid genetic and Bayesian generator. See [module](self) documentation
/// for more details.
pub struct MggpoGenerator<C = StandardModelConstructor> {
    bayesian: BayesianGenerator<Mggpo, C>,
    ga: CnsgaGenerator,
}

impl MggpoGenerator<StandardModelConstructor> {
    /// Initializes the generator with default options.
    ///
    /// Note that the default options have no reference point, which must be
    /// set before generating from observations.
    pub fn new(vocs: Vocs) -> Result<Self, Error> {
        Self::with_options(vocs, MggpoOptions::default())
    }

    /// Initializes the generator with given options.
    pub fn with_options(vocs: Vocs, options: MggpoOptions) -> Result<Self, Error> {
        let ga = Self::ga_generator_for(&vocs, &options)?;
        let bayesian = BayesianGenerator::with_options(vocs, options)?;
        Ok(Self { bayesian, ga })
    }
}

impl<C: ModelConstructor> MggpoGenerator<C> {
    /// Initializes the generator with given options and model constructor.
    pub fn with_model_constructor(
        vocs: Vocs,
        options: MggpoOptions,
        model_constructor: C,
    ) -> Result<Self, Error> {
        let ga = Self::ga_generator_for(&vocs, &options)?;
        let bayesian = BayesianGenerator::with_model_constructor(vocs, options, model_constructor)?;
        Ok(Self { bayesian, ga })
    }

    fn ga_generator_for(vocs: &Vocs, options: &MggpoOptions) -> Result<CnsgaGenerator, Error> {
        let mut ga_options = CnsgaOptions::default();
        ga_options.set_population_size(options.acq().population_size())?;
        CnsgaGenerator::with_options(vocs.clone(), ga_options)
    }

    /// Makes the random choices of the generator reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            bayesian: self.bayesian.with_seed(seed),
            ga: self.ga.with_seed(seed.wrapping_add(1)),
        }
    }

    /// The genetic sub-generator.
    pub fn ga_generator(&self) -> &CnsgaGenerator {
        &self.ga
    }

    /// The Bayesian part scoring the candidate pools.
    pub fn bayesian(&self) -> &BayesianGenerator<Mggpo, C> {
        &self.bayesian
    }
}

impl<C: ModelConstructor> Generator for MggpoGenerator<C> {
    const NAME: &'static str = "mggpo";
    type Options = MggpoOptions;

    fn default_options() -> Self::Options {
        MggpoOptions::default()
    }

    fn vocs(&self) -> &Vocs {
        self.bayesian.vocs()
    }

    fn options(&self) -> &Self::Options {
        self.bayesian.options()
    }

    fn data(&self) -> &Table {
        self.bayesian.data()
    }

    fn add_data(&mut self, new_data: &Table) -> Result<(), Error> {
        self.bayesian.add_data(new_data)?;
        self.ga.add_data(new_data)
    }

    fn generate(&mut self, n_candidates: usize) -> Result<Table, Error> {
        if n_candidates == 0 || self.bayesian.data().is_empty() {
            return self.bayesian.generate(n_candidates);
        }

        let pool = self.ga.generate(10 * n_candidates)?;
        let vocs = self.bayesian.vocs();
        let rows = (0..pool.len()).collect::<Vec<_>>();
        let x = pool.matrix(&rows, vocs.variable_names())?;

        let training = self.bayesian.get_training_data()?;
        let model = self.bayesian.train_model()?;
        let acq = self.bayesian.get_acquisition(&model, &training)?;
        let scores = acq.evaluate_each(&x);

        let best = rank_descending(&scores)
            .into_iter()
            .take(n_candidates)
            .collect::<Vec<_>>();

        debug!(
            "selected {} out of pool of {}, best score {}",
            best.len(),
            pool.len(),
            best.first().map(|&i| scores[i]).unwrap_or(f64::NAN)
        );

        let candidates = DMatrix::from_fn(best.len(), x.ncols(), |i, j| x[(best[i], j)]);
        Ok(vocs.inputs_from_matrix(&candidates))
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use super::*;
    use crate::core::ObjectiveDirection;
    use crate::model::{ModelInputs, Posterior};
    use crate::testing::{evaluate, run, TestFunction, TwoQuadratics};

    /// Noise-free model predicting the first input as the only output.
    struct FirstInput {
        n_inputs: usize,
    }

    impl Model for FirstInput {
        fn n_inputs(&self) -> usize {
            self.n_inputs
        }

        fn n_outputs(&self) -> usize {
            1
        }

        fn posterior(&self, x: &DMatrix<f64>) -> Posterior {
            let q = x.nrows();
            Posterior::new(vec![x.column(0).clone_owned()], vec![DMatrix::zeros(q, q)])
        }
    }

    struct FirstInputConstructor;

    impl ModelConstructor for FirstInputConstructor {
        type Model = FirstInput;

        fn build_model(&self, inputs: &ModelInputs<'_>, _data: &Table) -> Result<FirstInput, Error> {
            Ok(FirstInput {
                n_inputs: inputs.input_names.len(),
            })
        }
    }

    fn reference(f1: f64, f2: f64) -> BTreeMap<String, f64> {
        BTreeMap::from([("f1".to_string(), f1), ("f2".to_string(), f2)])
    }

    fn options() -> MggpoOptions {
        let mut options = MggpoOptions::default();
        options
            .acq_mut()
            .set_reference_point(Some(reference(3.0, 3.0)))
            .unwrap();
        options.acq_mut().base_mut().set_monte_carlo_samples(32).unwrap();
        options
    }

    #[test]
    fn default_options() {
        let options = MggpoGenerator::<StandardModelConstructor>::default_options();
        assert_eq!(options.acq().population_size(), 64);
        assert!(options.acq().reference_point().is_none());

        let mut options = MggpoOptions::default();
        assert!(options
            .acq_mut()
            .set_reference_point(Some(reference(f64::NAN, 1.0)))
            .is_err());
        assert!(options.acq_mut().set_population_size(1).is_err());
    }

    #[test]
    fn reference_point_signs() {
        let vocs = Vocs::builder()
            .variable("x", 0.0, 1.0)
            .objective("f1", ObjectiveDirection::Minimize)
            .objective("f2", ObjectiveDirection::Maximize)
            .build()
            .unwrap();

        let mut options = MggpoAcqOptions::default();
        assert!(reference_point(&vocs, &options).unwrap_err().is_configuration());

        options
            .set_reference_point(Some(BTreeMap::from([("f1".to_string(), 2.0)])))
            .unwrap();
        assert!(reference_point(&vocs, &options).is_err());

        options.set_reference_point(Some(reference(2.0, 1.0))).unwrap();
        assert_eq!(reference_point(&vocs, &options).unwrap(), vec![-2.0, 1.0]);
    }

    #[test]
    fn ties_keep_pool_order() {
        assert_eq!(
            rank_descending(&[1.0, 3.0, f64::NAN, 3.0, 2.0]),
            vec![1, 3, 4, 0, 2]
        );
    }

    #[test]
    fn missing_reference_point_fails_at_acquisition() {
        let f = TwoQuadratics;
        let mut generator = MggpoGenerator::new(f.vocs()).unwrap().with_seed(1);

        // Bootstrap does not need the reference point.
        let initial = generator.generate(2).unwrap();
        assert_eq!(initial.len(), 3);
        generator.add_data(&evaluate(&f, &initial)).unwrap();

        assert!(matches!(generator.generate(2), Err(Error::Configuration(_))));
    }

    #[test]
    fn forwards_data_to_ga() {
        let f = TwoQuadratics;
        let mut generator = MggpoGenerator::with_options(f.vocs(), options())
            .unwrap()
            .with_seed(2);

        run(&mut generator, &f, 3, 2).unwrap();
        assert_eq!(generator.data().len(), 3 + 2 + 2);
        assert_eq!(generator.ga_generator().data(), generator.data());
    }

    #[test]
    fn selects_best_of_pool() {
        let vocs = Vocs::builder()
            .variable("x1", 0.0, 1.0)
            .variable("x2", 0.0, 1.0)
            .objective("f", ObjectiveDirection::Minimize)
            .build()
            .unwrap();
        let mut options = MggpoOptions::default();
        options
            .acq_mut()
            .set_reference_point(Some(BTreeMap::from([("f".to_string(), 3.0)])))
            .unwrap();

        let data = Table::from_records(vec![
            vec![("x1", 1.0), ("x2", 0.2), ("f", 1.0)],
            vec![("x1", 1.0), ("x2", 0.8), ("f", 1.0)],
        ]);

        let build = || {
            let mut generator = MggpoGenerator::with_model_constructor(
                vocs.clone(),
                options.clone(),
                FirstInputConstructor,
            )
            .unwrap()
            .with_seed(4);
            generator.add_data(&data).unwrap();
            generator
        };

        let candidates = build().generate(3).unwrap();

        // Same seed, so the same pool of 30.
        let pool = build().ga.generate(30).unwrap();
        let mut pool_x1 = pool
            .records()
            .map(|record| (record["x1"], record["x2"]))
            .collect::<Vec<_>>();

        // The improvement over the baseline at x1 = 1 is 1 - x1, so the best
        // candidates have the smallest x1.
        pool_x1.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        let expected = pool_x1.into_iter().take(3).collect::<Vec<_>>();
        let selected = candidates
            .records()
            .map(|record| (record["x1"], record["x2"]))
            .collect::<Vec<_>>();

        assert_eq!(selected, expected);
    }

    #[test]
    fn candidates_from_pool() {
        let f = TwoQuadratics;
        let mut generator = MggpoGenerator::with_options(f.vocs(), options())
            .unwrap()
            .with_seed(3);
        run(&mut generator, &f, 2, 4).unwrap();

        let candidates = generator.generate(3).unwrap();
        assert_eq!(candidates.len(), 3);

        let bounds = generator.vocs().bounds();
        for record in candidates.records() {
            let x = DVector::from_vec(vec![record["x1"], record["x2"]]);
            assert!(bounds.contains(&x));
        }

        assert!(generator.generate(0).unwrap().is_empty());
    }
}
