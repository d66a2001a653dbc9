//! Surrogate models and their construction from observations.
//!
//! A [`Model`] maps a batch of input points to a joint predictive
//! distribution ([`Posterior`]) of all outputs. Models are built from scratch
//! by a [`ModelConstructor`] in every generation step; there is no online
//! update.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::core::{Domain, Error, Table};

pub mod gaussian_process;

pub use gaussian_process::{GaussianProcess, ModelList, StandardModelConstructor};

/// Error encountered while fitting a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The covariance matrix of the training data is not positive definite
    /// even with added jitter.
    #[error("covariance matrix is not positive definite")]
    NotPositiveDefinite,
}

/// Joint predictive distribution of a model at a batch of `q` points.
///
/// Outputs are independent of each other. For each output there is a mean
/// vector and a `q × q` covariance matrix over the batch.
#[derive(Debug, Clone)]
pub struct Posterior {
    means: Vec<DVector<f64>>,
    covariances: Vec<DMatrix<f64>>,
}

impl Posterior {
    /// Creates posterior from per-output means and covariances.
    pub fn new(means: Vec<DVector<f64>>, covariances: Vec<DMatrix<f64>>) -> Self {
        assert_eq!(means.len(), covariances.len(), "output count mismatch");
        Self { means, covariances }
    }

    /// Number of points in the batch.
    pub fn batch_size(&self) -> usize {
        self.means.first().map(|mean| mean.len()).unwrap_or(0)
    }

    /// Number of outputs.
    pub fn n_outputs(&self) -> usize {
        self.means.len()
    }

    /// Mean of an output over the batch.
    pub fn mean(&self, output: usize) -> &DVector<f64> {
        &self.means[output]
    }

    /// Covariance of an output over the batch.
    pub fn covariance(&self, output: usize) -> &DMatrix<f64> {
        &self.covariances[output]
    }

    /// Means as a `q × m` matrix.
    pub fn mean_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.batch_size(), self.n_outputs(), |i, j| self.means[j][i])
    }

    /// Draws samples by reparameterization of given standard normal base
    /// samples.
    ///
    /// `base[j]` is an `S × q` matrix for output `j`. The result contains `S`
    /// matrices of shape `q × m`.
    pub fn sample(&self, base: &[DMatrix<f64>]) -> Vec<DMatrix<f64>> {
        assert_eq!(base.len(), self.n_outputs(), "base sample count mismatch");

        let q = self.batch_size();
        let n_samples = base.first().map(|b| b.nrows()).unwrap_or(0);
        let mut samples = vec![DMatrix::zeros(q, self.n_outputs()); n_samples];

        for (j, (mean, cov)) in self.means.iter().zip(self.covariances.iter()).enumerate() {
            let l = factor_covariance(cov);

            for (s, sample) in samples.iter_mut().enumerate() {
                let z = base[j].row(s).transpose();
                let y = mean + &l * z;
                sample.set_column(j, &y);
            }
        }

        samples
    }
}

/// Lower triangular factor of a covariance matrix. Falls back to the square
/// root of the diagonal when the matrix is numerically singular.
fn factor_covariance(cov: &DMatrix<f64>) -> DMatrix<f64> {
    let n = cov.nrows();
    let scale = cov.diagonal().amax().max(1e-12);

    for jitter in [1e-10, 1e-8, 1e-6] {
        let mut jittered = cov.clone();
        for i in 0..n {
            jittered[(i, i)] += jitter * scale;
        }

        if let Some(chol) = jittered.cholesky() {
            return chol.l();
        }
    }

    DMatrix::from_diagonal(&cov.diagonal().map(|v| v.max(0.0).sqrt()))
}

/// A trained surrogate model.
pub trait Model {
    /// Number of input dimensions.
    fn n_inputs(&self) -> usize;

    /// Number of outputs.
    fn n_outputs(&self) -> usize;

    /// Joint predictive distribution at the rows of `x` (in the raw, not
    /// normalized, input space).
    fn posterior(&self, x: &DMatrix<f64>) -> Posterior;
}

/// Description of the inputs and outputs a model is built for.
#[derive(Debug, Clone)]
pub struct ModelInputs<'a> {
    /// Input column names, in the order of the model input dimensions.
    pub input_names: &'a [String],
    /// Output column names, in the order of the model outputs.
    pub output_names: &'a [String],
    /// Domain of the inputs used for normalization.
    pub domain: &'a Domain,
}

/// Instructions for building a trained model from observations.
pub trait ModelConstructor {
    /// Type of the trained model.
    type Model: Model;

    /// Builds a trained model for all outputs from the observations.
    ///
    /// Fails with [`Error::InsufficientData`] if some output has no
    /// observation.
    fn build_model(&self, inputs: &ModelInputs<'_>, data: &Table) -> Result<Self::Model, Error>;
}
