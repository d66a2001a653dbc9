//! Bayesian optimization with the upper confidence bound acquisition function.
//!
//! The acquisition value of a candidate is `μ + sqrt(β)·σ` of the (sign
//! adjusted) objective, estimated by Monte-Carlo sampling. Larger `β` favors
//! exploration of uncertain regions. Infeasible candidates are pulled towards
//! a value dominated by every observed objective value.
//!
//! Only single-objective problems are supported. For the time-dependent
//! variant, construct the generator with
//! [`time_dependent`](UpperConfidenceBoundGenerator::time_dependent) options.
//!
//! # References
//!
//! \[1\] [Gaussian Process Optimization in the Bandit Setting: No Regret and
//! Experimental Design](https://arxiv.org/abs/0912.3995)

use getset::{CopyGetters, Getters, MutGetters};
use log::debug;

use super::bayesian::{AcquisitionContext, AcquisitionStrategy, BayesianGenerator};
use crate::acquisition::{
    create_constraints, create_scalar_objective, dominated_value, AcquisitionFunction,
    ConstrainedMcAcquisition, UpperConfidenceBoundUtility,
};
use crate::core::{Error, Vocs};
use crate::model::Model;
use crate::options::{check_finite, AcqOptions, AcquisitionOptions, BayesianOptions, ValidationError};

/// Acquisition options of [`UpperConfidenceBound`].
#[derive(Debug, Clone, PartialEq, CopyGetters, Getters, MutGetters)]
pub struct UcbAcqOptions {
    /// Common acquisition options.
    #[getset(get = "pub", get_mut = "pub")]
    base: AcqOptions,
    /// Exploration weight. Default: `2.0`.
    #[getset(get_copy = "pub")]
    beta: f64,
}

impl Default for UcbAcqOptions {
    fn default() -> Self {
        Self {
            base: AcqOptions::default(),
            beta: 2.0,
        }
    }
}

impl UcbAcqOptions {
    /// Sets the exploration weight.
    pub fn set_beta(&mut self, value: f64) -> Result<&mut Self, ValidationError> {
        self.beta = check_non_negative("beta", value)?;
        Ok(self)
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if check_finite(field, value)? >= 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            expected: "non-negative and finite",
            value,
        })
    }
}

impl AcquisitionOptions for UcbAcqOptions {
    fn base(&self) -> &AcqOptions {
        &self.base
    }

    fn validate(&self) -> Result<(), ValidationError> {
        self.base.validate()?;
        check_non_negative("beta", self.beta)?;
        Ok(())
    }
}

/// Options of [`UpperConfidenceBoundGenerator`].
pub type UcbOptions = BayesianOptions<UcbAcqOptions>;

/// Upper confidence bound strategy. See [module](self) documentation for more
/// details.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpperConfidenceBound;

impl AcquisitionStrategy for UpperConfidenceBound {
    const NAME: &'static str = "upper_confidence_bound";
    type Options = UcbAcqOptions;

    fn check(&self, vocs: &Vocs, _options: &UcbAcqOptions) -> Result<(), Error> {
        if vocs.n_objectives() != 1 {
            return Err(Error::configuration(format!(
                "upper confidence bound requires exactly one objective, got {}",
                vocs.n_objectives()
            )));
        }

        Ok(())
    }

    fn acquisition<'a, M: Model + 'a>(
        &self,
        options: &UcbAcqOptions,
        context: AcquisitionContext<'a, M>,
    ) -> Result<Box<dyn AcquisitionFunction + 'a>, Error> {
        let objective = create_scalar_objective(context.vocs);
        let observed = objective.apply_rows(context.training.outputs());
        let floor = dominated_value(observed.iter().copied());

        debug!("beta = {}, infeasible utility = {}", options.beta(), floor);

        let utility = UpperConfidenceBoundUtility::new(objective, options.beta(), floor);

        Ok(Box::new(ConstrainedMcAcquisition::new(
            context.model,
            utility,
            create_constraints(context.vocs),
            context.sampler,
        )))
    }
}

/// Bayesian generator using the upper confidence bound acquisition function.
pub type UpperConfidenceBoundGenerator = BayesianGenerator<UpperConfidenceBound>;

impl UpperConfidenceBoundGenerator {
    /// Initializes the time-dependent variant with default options.
    pub fn time_dependent(vocs: Vocs) -> Result<Self, Error> {
        Self::with_options(vocs, UcbOptions::time_dependent())
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use super::*;
    use crate::core::{Generator, ObjectiveDirection, Table};
    use crate::testing::{evaluate, run, test_data, test_vocs, ConstrainedQuadratic, TestFunction};

    fn unit_square() -> Vocs {
        Vocs::builder()
            .variable("x1", 0.0, 1.0)
            .variable("x2", 0.0, 1.0)
            .objective("y", ObjectiveDirection::Minimize)
            .build()
            .unwrap()
    }

    fn y(x1: f64, x2: f64) -> f64 {
        (x1 - 0.3).powi(2) + (x2 - 0.6).powi(2)
    }

    fn observe(candidates: &Table) -> Table {
        Table::from_records(candidates.records().map(|mut record| {
            let value = y(record["x1"], record["x2"]);
            record.insert("y".to_string(), value);
            record
        }))
    }

    #[test]
    fn default_options() {
        let options = UpperConfidenceBoundGenerator::default_options();
        assert_eq!(options.acq().beta(), 2.0);
        assert_eq!(options.acq().base().monte_carlo_samples(), 128);
        assert!(!options.is_time_dependent());

        let mut options = UcbOptions::default();
        assert!(options.acq_mut().set_beta(-1.0).is_err());
        assert!(options.acq_mut().set_beta(f64::INFINITY).is_err());
        assert_eq!(options.acq().beta(), 2.0);
    }

    #[test]
    fn rejects_multiple_objectives() {
        let vocs = Vocs::builder()
            .variable("x1", 0.0, 1.0)
            .objective("f1", ObjectiveDirection::Minimize)
            .objective("f2", ObjectiveDirection::Maximize)
            .build()
            .unwrap();

        let result = UpperConfidenceBoundGenerator::new(vocs);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn rejects_no_objective() {
        let vocs = Vocs::builder().variable("x1", 0.0, 1.0).build().unwrap();
        assert!(UpperConfidenceBoundGenerator::new(vocs).is_err());
    }

    #[test]
    fn end_to_end() {
        let mut generator = UpperConfidenceBoundGenerator::new(unit_square())
            .unwrap()
            .with_seed(42);

        let initial = generator.generate(3).unwrap();
        assert_eq!(initial.len(), 3);
        generator.add_data(&observe(&initial)).unwrap();

        let first = generator.generate(1).unwrap();
        assert_eq!(first.len(), 1);
        let first = first.record(0).unwrap();
        let x = DVector::from_vec(vec![first["x1"], first["x2"]]);
        assert!(generator.vocs().bounds().contains(&x));

        generator
            .add_data(&observe(&Table::from_records(vec![first.clone()])))
            .unwrap();
        assert_eq!(generator.data().len(), 4);

        let second = generator.generate(1).unwrap().record(0).unwrap();
        assert!(first["x1"] != second["x1"] || first["x2"] != second["x2"]);
    }

    #[test]
    fn constrained_batches() {
        let mut generator = UpperConfidenceBoundGenerator::new(test_vocs())
            .unwrap()
            .with_seed(7);
        generator.add_data(&test_data()).unwrap();

        let candidates = generator.generate(2).unwrap();
        assert_eq!(candidates.len(), 2);

        let observations = evaluate(&ConstrainedQuadratic, &candidates);
        generator.add_data(&observations).unwrap();
        assert_eq!(generator.data().len(), 12);
    }

    #[test]
    fn runs_on_quadratic() {
        let f = ConstrainedQuadratic;
        let mut options = UcbOptions::default();
        options.acq_mut().set_beta(0.1).unwrap();

        let mut generator = UpperConfidenceBoundGenerator::with_options(f.vocs(), options)
            .unwrap()
            .with_seed(3);

        run(&mut generator, &f, 6, 1).unwrap();
        assert_eq!(generator.data().len(), 3 + 5);
    }

    fn fixed_clock() -> f64 {
        100.0
    }

    #[test]
    fn time_dependent_variant() {
        let mut generator = UpperConfidenceBoundGenerator::time_dependent(unit_square())
            .unwrap()
            .with_seed(5)
            .with_clock(fixed_clock);
        assert!(generator.options().is_time_dependent());

        let data = Table::from_records((0..4).map(|i| {
            let x1 = 0.2 * i as f64 + 0.1;
            let x2 = 0.9 - 0.2 * i as f64;
            vec![
                ("x1", x1),
                ("x2", x2),
                ("y", y(x1, x2)),
                ("time", 90.0 + i as f64),
            ]
        }));
        generator.add_data(&data).unwrap();

        let candidates = generator.generate(1).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(!candidates.has_column("time"));
    }
}
