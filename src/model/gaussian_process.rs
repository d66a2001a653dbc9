//! Gaussian process regression with a squared-exponential kernel.
//!
//! Inputs are normalized to the unit cube using the domain bounds and outputs
//! are standardized, so a single set of kernel hyperparameters works for
//! problems of any scale. The lengthscale is chosen from a grid by maximizing
//! the log marginal likelihood.
//!
//! # References
//!
//! \[1\] [Gaussian Processes for Machine
//! Learning](https://gaussianprocess.org/gpml/chapters/RW2.pdf)

use std::f64::consts::PI;

use log::{debug, trace};
use nalgebra::{Cholesky, DMatrix, DVector, Dynamic};

use super::{Model, ModelConstructor, ModelError, ModelInputs, Posterior};
use crate::core::{Domain, Error, Table};
use crate::options::ModelOptions;

const JITTER: f64 = 1e-8;

/// Single-output Gaussian process.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    domain: Domain,
    x: DMatrix<f64>,
    lengthscale: f64,
    noise_variance: f64,
    y_mean: f64,
    y_std: f64,
    chol: Cholesky<f64, Dynamic>,
    alpha: DVector<f64>,
    log_likelihood: f64,
}

impl GaussianProcess {
    /// Fits the process to the observations, selecting the lengthscale from
    /// the grid.
    ///
    /// `x` has one observation per row in the raw input space.
    pub fn fit(
        domain: &Domain,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        options: &ModelOptions,
    ) -> Result<Self, ModelError> {
        assert_eq!(x.nrows(), y.len(), "row count mismatch");
        assert!(x.nrows() > 0, "no observations");

        let x_norm = normalize_rows(domain, x);

        let n = y.len() as f64;
        let y_mean = y.mean();
        let y_std = if y.len() > 1 {
            let var = y.iter().map(|yi| (yi - y_mean).powi(2)).sum::<f64>() / (n - 1.0);
            if var.sqrt() > 1e-12 {
                var.sqrt()
            } else {
                1.0
            }
        } else {
            1.0
        };
        let y_std_vec = y.map(|yi| (yi - y_mean) / y_std);

        let mut best: Option<Self> = None;

        for &lengthscale in options.lengthscale_grid() {
            let candidate = match Self::fit_fixed(
                domain,
                &x_norm,
                &y_std_vec,
                lengthscale,
                options.noise_variance(),
                y_mean,
                y_std,
            ) {
                Some(candidate) => candidate,
                None => continue,
            };

            trace!(
                "lengthscale = {}\tlog likelihood = {}",
                lengthscale,
                candidate.log_likelihood
            );

            if best
                .as_ref()
                .map(|best| candidate.log_likelihood > best.log_likelihood)
                .unwrap_or(true)
            {
                best = Some(candidate);
            }
        }

        let best = best.ok_or(ModelError::NotPositiveDefinite)?;
        debug!(
            "fitted GP on {} points, lengthscale = {}",
            y.len(),
            best.lengthscale
        );
        Ok(best)
    }

    fn fit_fixed(
        domain: &Domain,
        x_norm: &DMatrix<f64>,
        y: &DVector<f64>,
        lengthscale: f64,
        noise_variance: f64,
        y_mean: f64,
        y_std: f64,
    ) -> Option<Self> {
        let n = x_norm.nrows();
        let mut k = kernel(x_norm, x_norm, lengthscale);
        for i in 0..n {
            k[(i, i)] += noise_variance + JITTER;
        }

        let chol = k.cholesky()?;
        let alpha = chol.solve(y);

        let log_det = chol.l().diagonal().iter().map(|v| v.ln()).sum::<f64>();
        let log_likelihood = -0.5 * y.dot(&alpha) - log_det - 0.5 * n as f64 * (2.0 * PI).ln();

        if !log_likelihood.is_finite() {
            return None;
        }

        Some(Self {
            domain: domain.clone(),
            x: x_norm.clone_owned(),
            lengthscale,
            noise_variance,
            y_mean,
            y_std,
            chol,
            alpha,
            log_likelihood,
        })
    }

    /// The selected lengthscale (in the normalized input space).
    pub fn lengthscale(&self) -> f64 {
        self.lengthscale
    }

    /// Observation noise variance in standardized output units.
    pub fn noise_variance(&self) -> f64 {
        self.noise_variance
    }

    /// The log marginal likelihood of the standardized training outputs.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Predictive mean and covariance at the rows of `x`.
    pub fn predict(&self, x: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
        let x_norm = normalize_rows(&self.domain, x);

        let k_star = kernel(&x_norm, &self.x, self.lengthscale);
        let mean = &k_star * &self.alpha;

        let v = self
            .chol
            .l()
            .solve_lower_triangular(&k_star.transpose())
            .unwrap_or_else(|| DMatrix::zeros(self.x.nrows(), x.nrows()));
        let mut cov = kernel(&x_norm, &x_norm, self.lengthscale) - v.transpose() * v;

        for i in 0..cov.nrows() {
            cov[(i, i)] = cov[(i, i)].max(1e-12);
        }

        let mean = mean.map(|m| m * self.y_std + self.y_mean);
        let cov = cov * self.y_std.powi(2);
        (mean, cov)
    }
}

fn normalize_rows(domain: &Domain, x: &DMatrix<f64>) -> DMatrix<f64> {
    let lower = domain.lower();
    let range = domain.range();
    DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| {
        (x[(i, j)] - lower[j]) / range[j]
    })
}

fn kernel(a: &DMatrix<f64>, b: &DMatrix<f64>, lengthscale: f64) -> DMatrix<f64> {
    let denom = 2.0 * lengthscale * lengthscale;
    DMatrix::from_fn(a.nrows(), b.nrows(), |i, j| {
        let dist = (a.row(i) - b.row(j)).norm_squared();
        (-dist / denom).exp()
    })
}

/// Joint model of independent single-output processes.
#[derive(Debug, Clone)]
pub struct ModelList {
    n_inputs: usize,
    models: Vec<GaussianProcess>,
}

impl ModelList {
    /// Creates a list from single-output processes.
    pub fn new(n_inputs: usize, models: Vec<GaussianProcess>) -> Self {
        Self { n_inputs, models }
    }

    /// The single-output processes.
    pub fn models(&self) -> &[GaussianProcess] {
        &self.models
    }
}

impl Model for ModelList {
    fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    fn n_outputs(&self) -> usize {
        self.models.len()
    }

    fn posterior(&self, x: &DMatrix<f64>) -> Posterior {
        let (means, covariances) = self.models.iter().map(|model| model.predict(x)).unzip();
        Posterior::new(means, covariances)
    }
}

/// Default model constructor that fits one independent Gaussian process per
/// output.
///
/// Each process is trained on the rows where all inputs and the particular
/// output are present.
#[derive(Debug, Clone, Default)]
pub struct StandardModelConstructor {
    options: ModelOptions,
}

impl StandardModelConstructor {
    /// Creates the constructor with given model options.
    pub fn new(options: ModelOptions) -> Self {
        Self { options }
    }
}

impl ModelConstructor for StandardModelConstructor {
    type Model = ModelList;

    fn build_model(&self, inputs: &ModelInputs<'_>, data: &Table) -> Result<ModelList, Error> {
        let models = inputs
            .output_names
            .iter()
            .map(|output| {
                let mut names = inputs.input_names.to_vec();
                names.push(output.clone());

                let rows = data.complete_rows(&names);
                if rows.is_empty() {
                    return Err(Error::InsufficientData(format!(
                        "no data found to train model for `{}`",
                        output
                    )));
                }

                let m = data.matrix(&rows, &names)?;

                let n_inputs = inputs.input_names.len();
                let x = m.columns(0, n_inputs).clone_owned();
                let y = m.column(n_inputs).clone_owned();

                GaussianProcess::fit(inputs.domain, &x, &y, &self.options).map_err(Error::from)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ModelList::new(inputs.input_names.len(), models))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn interpolates_observations() {
        let domain: Domain = [(0.0, 1.0)].into_iter().collect();
        let x = DMatrix::from_column_slice(5, 1, &[0.0, 0.25, 0.5, 0.75, 1.0]);
        let y = x.column(0).map(|xi| (6.0f64 * xi).sin());

        let gp = GaussianProcess::fit(&domain, &x, &y, &ModelOptions::default()).unwrap();
        let (mean, cov) = gp.predict(&x);

        for i in 0..5 {
            assert_abs_diff_eq!(mean[i], y[i], epsilon = 0.05);
            assert!(cov[(i, i)] < 0.05);
        }
    }

    #[test]
    fn uncertainty_grows_away_from_data() {
        let domain: Domain = [(0.0, 10.0)].into_iter().collect();
        let x = DMatrix::from_column_slice(3, 1, &[0.0, 0.5, 1.0]);
        let y = DVector::from_vec(vec![1.0, 2.0, 1.5]);

        let gp = GaussianProcess::fit(&domain, &x, &y, &ModelOptions::default()).unwrap();
        let (_, near) = gp.predict(&DMatrix::from_element(1, 1, 0.5));
        let (_, far) = gp.predict(&DMatrix::from_element(1, 1, 9.0));

        assert!(far[(0, 0)] > near[(0, 0)]);
    }

    #[test]
    fn single_observation() {
        let domain: Domain = [(0.0, 1.0), (0.0, 1.0)].into_iter().collect();
        let x = DMatrix::from_row_slice(1, 2, &[0.3, 0.7]);
        let y = DVector::from_vec(vec![4.0]);

        let gp = GaussianProcess::fit(&domain, &x, &y, &ModelOptions::default()).unwrap();
        let (mean, _) = gp.predict(&x);
        assert_abs_diff_eq!(mean[0], 4.0, epsilon = 1e-3);
        assert_eq!(gp.noise_variance(), ModelOptions::default().noise_variance());
    }

    #[test]
    fn constructor_builds_one_model_per_output() {
        let domain: Domain = [(0.0, 1.0)].into_iter().collect();
        let data = Table::from_records(vec![
            vec![("x", 0.1), ("y", 1.0), ("c", 0.0)],
            vec![("x", 0.5), ("y", 2.0)],
            vec![("x", 0.9), ("y", 3.0), ("c", 1.0)],
        ]);
        let input_names = names(&["x"]);
        let output_names = names(&["y", "c"]);
        let inputs = ModelInputs {
            input_names: &input_names,
            output_names: &output_names,
            domain: &domain,
        };

        let model = StandardModelConstructor::default()
            .build_model(&inputs, &data)
            .unwrap();
        assert_eq!(model.n_outputs(), 2);
        assert_eq!(model.n_inputs(), 1);

        let posterior = model.posterior(&DMatrix::from_column_slice(2, 1, &[0.2, 0.8]));
        assert_eq!(posterior.batch_size(), 2);
        assert_eq!(posterior.covariance(1).shape(), (2, 2));
    }

    #[test]
    fn constructor_skips_failed_evaluations() {
        let domain: Domain = [(0.0, 1.0)].into_iter().collect();
        let data = Table::from_records(vec![
            vec![("x", 0.1), ("y", 1.0)],
            vec![("x", 0.5), ("y", f64::NAN)],
            vec![("x", 0.9), ("y", 3.0)],
        ]);
        let input_names = names(&["x"]);
        let output_names = names(&["y"]);
        let inputs = ModelInputs {
            input_names: &input_names,
            output_names: &output_names,
            domain: &domain,
        };

        let model = StandardModelConstructor::default()
            .build_model(&inputs, &data)
            .unwrap();
        let mean = model.posterior(&DMatrix::from_element(1, 1, 0.5)).mean_matrix();
        assert!(mean[(0, 0)].is_finite());
    }

    #[test]
    fn constructor_fails_without_output_data() {
        let domain: Domain = [(0.0, 1.0)].into_iter().collect();
        let mut data = Table::from_records(vec![vec![("x", 0.1), ("y", 1.0)]]);
        data.push_record(vec![("x", 0.2)]);
        let input_names = names(&["x"]);
        let output_names = names(&["y", "c"]);
        let inputs = ModelInputs {
            input_names: &input_names,
            output_names: &output_names,
            domain: &domain,
        };

        let result = StandardModelConstructor::default().build_model(&inputs, &data);
        assert!(matches!(result, Err(Error::InsufficientData(_))));
    }
}
