//! Acquisition functions and their building blocks.
//!
//! An [`AcquisitionFunction`] scores a batch of candidate points (one point
//! per row). Monte-Carlo acquisition functions are assembled from a model, an
//! [objective transform](ObjectiveTransform), constraint transforms and a
//! [`SampleUtility`] by [`ConstrainedMcAcquisition`]. Wrappers add proximal
//! biasing ([`Proximal`]) or fix an input feature ([`FixedFeature`]).

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use crate::core::Domain;
use crate::model::{Model, Posterior};

pub mod hypervolume;
mod objective;
mod upper_confidence_bound;

pub use hypervolume::ExpectedHypervolumeImprovement;
pub use objective::*;
pub(crate) use upper_confidence_bound::dominated_value;
pub use upper_confidence_bound::UpperConfidenceBoundUtility;

/// Scalar-valued function over a batch of candidate points.
pub trait AcquisitionFunction {
    /// Evaluates the joint value of the batch given by the rows of `x`.
    fn evaluate(&self, x: &DMatrix<f64>) -> f64;

    /// Evaluates every row of `x` as a batch of a single point.
    fn evaluate_each(&self, x: &DMatrix<f64>) -> Vec<f64> {
        (0..x.nrows())
            .map(|i| self.evaluate(&x.rows(i, 1).clone_owned()))
            .collect()
    }
}

impl<A: AcquisitionFunction + ?Sized> AcquisitionFunction for Box<A> {
    fn evaluate(&self, x: &DMatrix<f64>) -> f64 {
        (**self).evaluate(x)
    }
}

impl<A: AcquisitionFunction + ?Sized> AcquisitionFunction for &A {
    fn evaluate(&self, x: &DMatrix<f64>) -> f64 {
        (**self).evaluate(x)
    }
}

/// Configuration of Monte-Carlo sampling of the posterior.
///
/// Base samples are derived deterministically from the seed, so that the
/// resulting acquisition function is a deterministic function of the
/// candidates, which is needed by the local search.
#[derive(Debug, Clone, Copy)]
pub struct McSampler {
    n_samples: usize,
    seed: u64,
}

impl McSampler {
    /// Creates the sampler.
    pub fn new(n_samples: usize, seed: u64) -> Self {
        Self { n_samples, seed }
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Standard normal base samples, one `S × q` matrix per output.
    pub fn base_samples(&self, n_outputs: usize, q: usize) -> Vec<DMatrix<f64>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..n_outputs)
            .map(|_| {
                DMatrix::from_fn(self.n_samples, q, |_, _| StandardNormal.sample(&mut rng))
            })
            .collect()
    }
}

/// Utility of a batch under one posterior sample.
pub trait SampleUtility {
    /// Value of the batch for a posterior `sample` (`q × m`) given the
    /// posterior mean (`q × m`) and the soft feasibility of each point in the
    /// sample (all ones for unconstrained problems).
    fn value(&self, sample: &DMatrix<f64>, mean: &DMatrix<f64>, feasibility: &[f64]) -> f64;
}

/// Monte-Carlo acquisition function with constraint handling.
///
/// The value is the average of [`SampleUtility::value`] over posterior
/// samples. For every sample, the feasibility of each point is
/// `Π sigmoid(-margin / eta)` over the constraints.
pub struct ConstrainedMcAcquisition<'a, M: Model, U: SampleUtility> {
    model: &'a M,
    utility: U,
    constraints: Vec<ConstraintTransform>,
    sampler: McSampler,
    eta: f64,
}

impl<'a, M: Model, U: SampleUtility> ConstrainedMcAcquisition<'a, M, U> {
    /// Creates the acquisition function.
    pub fn new(
        model: &'a M,
        utility: U,
        constraints: Vec<ConstraintTransform>,
        sampler: McSampler,
    ) -> Self {
        Self {
            model,
            utility,
            constraints,
            sampler,
            eta: 1e-3,
        }
    }

    /// The posterior samples and their feasibility used for evaluating `x`.
    fn samples(&self, posterior: &Posterior) -> Vec<(DMatrix<f64>, Vec<f64>)> {
        let base = self
            .sampler
            .base_samples(posterior.n_outputs(), posterior.batch_size());

        posterior
            .sample(&base)
            .into_iter()
            .map(|sample| {
                let feasibility = (0..sample.nrows())
                    .map(|i| feasibility(&self.constraints, &sample.row(i).transpose(), self.eta))
                    .collect();
                (sample, feasibility)
            })
            .collect()
    }
}

impl<'a, M: Model, U: SampleUtility> AcquisitionFunction for ConstrainedMcAcquisition<'a, M, U> {
    fn evaluate(&self, x: &DMatrix<f64>) -> f64 {
        let posterior = self.model.posterior(x);
        let mean = posterior.mean_matrix();
        let samples = self.samples(&posterior);

        let total = samples
            .iter()
            .map(|(sample, feasibility)| self.utility.value(sample, &mean, feasibility))
            .sum::<f64>();

        total / samples.len().max(1) as f64
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Soft feasibility of an outcome vector: product of `sigmoid(-margin/eta)`
/// over all constraints.
pub fn feasibility(constraints: &[ConstraintTransform], y: &DVector<f64>, eta: f64) -> f64 {
    constraints
        .iter()
        .map(|constraint| sigmoid(-constraint.margin(y) / eta))
        .product()
}

/// Proximal biasing of an acquisition function.
///
/// The value becomes `softplus(acq) * exp(-Σ ((x - x₀) / l)² / 2)` summed
/// over the points of the batch, where `x₀` is the anchor (the most recent
/// observation) and `l` the lengthscales.
pub struct Proximal<A> {
    inner: A,
    anchor: DVector<f64>,
    lengthscales: DVector<f64>,
    domain: Option<Domain>,
}

impl<A: AcquisitionFunction> Proximal<A> {
    /// Wraps the acquisition function. When `domain` is given, distances are
    /// measured in the normalized space of the domain.
    pub fn new(
        inner: A,
        anchor: DVector<f64>,
        lengthscales: DVector<f64>,
        domain: Option<Domain>,
    ) -> Self {
        assert_eq!(anchor.len(), lengthscales.len(), "dimension mismatch");
        Self {
            inner,
            anchor,
            lengthscales,
            domain,
        }
    }

    fn weight(&self, x: &DVector<f64>) -> f64 {
        let (x, anchor) = match self.domain.as_ref() {
            Some(domain) => (domain.normalize(x), domain.normalize(&self.anchor)),
            None => (x.clone_owned(), self.anchor.clone_owned()),
        };

        let dist = (x - anchor).component_div(&self.lengthscales).norm_squared();
        (-0.5 * dist).exp()
    }
}

fn softplus(x: f64) -> f64 {
    if x > 20.0 {
        x
    } else {
        x.exp().ln_1p()
    }
}

impl<A: AcquisitionFunction> AcquisitionFunction for Proximal<A> {
    fn evaluate(&self, x: &DMatrix<f64>) -> f64 {
        let n = self.anchor.len();
        let weight = x
            .row_iter()
            .map(|row| self.weight(&row.columns(0, n).transpose()))
            .product::<f64>();

        softplus(self.inner.evaluate(x)) * weight
    }
}

/// Acquisition function with the last input feature fixed to a value.
///
/// Candidates passed to [`evaluate`](AcquisitionFunction::evaluate) do not
/// contain the fixed feature; it is appended before evaluating the inner
/// function.
pub struct FixedFeature<A> {
    inner: A,
    value: f64,
}

impl<A: AcquisitionFunction> FixedFeature<A> {
    /// Wraps the acquisition function.
    pub fn new(inner: A, value: f64) -> Self {
        Self { inner, value }
    }
}

impl<A: AcquisitionFunction> AcquisitionFunction for FixedFeature<A> {
    fn evaluate(&self, x: &DMatrix<f64>) -> f64 {
        let n = x.ncols();
        let extended = x.clone_owned().insert_column(n, self.value);
        self.inner.evaluate(&extended)
    }
}

/// Constant `sqrt(π / 2)` relating the expected absolute deviation of a
/// standard normal to its standard deviation.
pub(crate) fn half_pi_sqrt() -> f64 {
    (PI / 2.0).sqrt()
}
