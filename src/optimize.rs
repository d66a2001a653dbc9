//! Maximization of acquisition functions over the bounded input domain.
//!
//! The optimizer evaluates the acquisition function at random raw samples,
//! starts a [Nelder-Mead](nelder_mead) local search from the best of them and
//! returns the best point found. A batch of `q` candidates is built either
//! jointly (one search in the `q·d` dimensional space) or sequentially (one
//! point at a time, with the previously chosen points fixed in the batch).

use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::acquisition::AcquisitionFunction;
use crate::core::{Domain, Error};
use crate::options::OptimOptions;

pub mod nelder_mead;

pub use nelder_mead::{CoefficientsFamily, NelderMead, NelderMeadError, NelderMeadOptions};

/// Standard deviation of nearby raw samples as a fraction of the range.
const NEARBY_SCALE: f64 = 0.05;

/// Finds `q` points maximizing the acquisition function over the domain.
///
/// `nearby` is the point around which part of the raw samples are drawn if
/// [`use_nearby_initial_points`](OptimOptions::use_nearby_initial_points) is
/// enabled. Returns a `q × d` matrix.
pub fn optimize_acquisition<A, R>(
    acq: &A,
    domain: &Domain,
    q: usize,
    options: &OptimOptions,
    nearby: Option<&DVector<f64>>,
    rng: &mut R,
) -> Result<DMatrix<f64>, Error>
where
    A: AcquisitionFunction + ?Sized,
    R: Rng + ?Sized,
{
    let d = domain.dim();
    let nearby = nearby.filter(|_| options.use_nearby_initial_points());

    if q == 0 {
        return Ok(DMatrix::zeros(0, d));
    }

    if options.sequential() || q == 1 {
        let mut fixed = DMatrix::<f64>::zeros(0, d);

        for k in 0..q {
            let (x, value) = maximize(
                |x| {
                    let mut batch = fixed.clone_owned().insert_row(k, 0.0);
                    batch.set_row(k, &x.transpose());
                    acq.evaluate(&batch)
                },
                domain,
                options,
                nearby.cloned(),
                rng,
            )?;

            debug!("sequential candidate {} with acquisition value {}", k, value);
            fixed = fixed.insert_row(k, 0.0);
            fixed.set_row(k, &x.transpose());
        }

        Ok(fixed)
    } else {
        let joint = repeat_domain(domain, q);
        let nearby = nearby.map(|x| {
            DVector::from_iterator(q * d, (0..q).flat_map(|_| x.iter().copied()))
        });

        let (x, value) = maximize(
            |x| acq.evaluate(&DMatrix::from_row_slice(q, d, x.as_slice())),
            &joint,
            options,
            nearby,
            rng,
        )?;

        debug!("joint batch of {} with acquisition value {}", q, value);
        Ok(DMatrix::from_row_slice(q, d, x.as_slice()))
    }
}

fn repeat_domain(domain: &Domain, q: usize) -> Domain {
    (0..q)
        .flat_map(|_| domain.lower().iter().copied().zip(domain.upper().iter().copied()))
        .collect()
}

fn maximize<F, R>(
    f: F,
    domain: &Domain,
    options: &OptimOptions,
    nearby: Option<DVector<f64>>,
    rng: &mut R,
) -> Result<(DVector<f64>, f64), Error>
where
    F: Fn(&DVector<f64>) -> f64,
    R: Rng + ?Sized,
{
    let n_raw = options.raw_samples();
    let n_nearby = if nearby.is_some() { n_raw / 2 } else { 0 };

    let mut raw = Vec::with_capacity(n_raw);
    if let Some(center) = nearby.as_ref() {
        let range = domain.range();
        for _ in 0..n_nearby {
            let mut x = DVector::from_iterator(
                domain.dim(),
                center.iter().zip(range.iter()).map(|(ci, ri)| {
                    let z: f64 = StandardNormal.sample(rng);
                    ci + NEARBY_SCALE * ri * z
                }),
            );
            domain.project(&mut x);
            raw.push(x);
        }
    }
    while raw.len() < n_raw {
        raw.push(domain.sample(rng));
    }

    let mut scored = raw
        .into_iter()
        .map(|x| {
            let value = f(&x);
            (x, if value.is_nan() { f64::NEG_INFINITY } else { value })
        })
        .collect::<Vec<_>>();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut best: Option<(DVector<f64>, f64)> = None;
    let mut last_error = None;
    let mut local = NelderMead::with_options(domain, options.local_search());

    for (x0, raw_value) in scored.into_iter().take(options.num_restarts()) {
        trace!("restart from raw sample with value {}", raw_value);

        match local.minimize(|x| -f(x), domain, x0, options.max_iterations()) {
            Ok((x, neg_value)) => {
                let value = -neg_value;
                if best.as_ref().map(|(_, v)| value > *v).unwrap_or(true) {
                    best = Some((x, value));
                }
            }
            Err(error) => {
                debug!("local search failed: {}", error);
                last_error = Some(error);
            }
        }
    }

    match (best, last_error) {
        (Some(best), _) => Ok(best),
        (None, Some(error)) => Err(error.into()),
        (None, None) => Err(Error::configuration("no restarts to optimize from")),
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    /// Negated distance of every point from a target, summed over the batch.
    struct Peak(DVector<f64>);

    impl AcquisitionFunction for Peak {
        fn evaluate(&self, x: &DMatrix<f64>) -> f64 {
            -x.row_iter()
                .map(|row| (row.transpose() - &self.0).norm_squared())
                .sum::<f64>()
        }
    }

    fn unit_square() -> Domain {
        [(0.0, 1.0), (0.0, 1.0)].into_iter().collect()
    }

    #[test]
    fn finds_single_maximum() {
        let acq = Peak(DVector::from_vec(vec![0.3, 0.8]));
        let mut rng = StdRng::seed_from_u64(7);

        let x = optimize_acquisition(&acq, &unit_square(), 1, &OptimOptions::default(), None, &mut rng)
            .unwrap();

        assert_eq!(x.shape(), (1, 2));
        assert_abs_diff_eq!(x[(0, 0)], 0.3, epsilon = 1e-3);
        assert_abs_diff_eq!(x[(0, 1)], 0.8, epsilon = 1e-3);
    }

    #[test]
    fn maximum_outside_is_projected() {
        let acq = Peak(DVector::from_vec(vec![1.5, 0.5]));
        let mut rng = StdRng::seed_from_u64(7);

        let x = optimize_acquisition(&acq, &unit_square(), 1, &OptimOptions::default(), None, &mut rng)
            .unwrap();

        assert!(unit_square().contains(&x.row(0).transpose()));
        assert_abs_diff_eq!(x[(0, 0)], 1.0, epsilon = 1e-2);
    }

    #[test]
    fn standard_coefficients() {
        let acq = Peak(DVector::from_vec(vec![0.3, 0.8]));
        let mut rng = StdRng::seed_from_u64(11);

        let mut local = NelderMeadOptions::default();
        local.set_family(CoefficientsFamily::Standard);
        let mut options = OptimOptions::default();
        options.set_local_search(local).unwrap();

        let x = optimize_acquisition(&acq, &unit_square(), 1, &options, None, &mut rng).unwrap();
        assert_abs_diff_eq!(x[(0, 0)], 0.3, epsilon = 1e-3);
        assert_abs_diff_eq!(x[(0, 1)], 0.8, epsilon = 1e-3);
    }

    #[test]
    fn joint_and_sequential_batches() {
        let acq = Peak(DVector::from_vec(vec![0.5, 0.5]));
        let mut rng = StdRng::seed_from_u64(3);
        let mut options = OptimOptions::default();

        let x = optimize_acquisition(&acq, &unit_square(), 3, &options, None, &mut rng).unwrap();
        assert_eq!(x.shape(), (3, 2));

        options.set_sequential(false).set_max_iterations(500).unwrap();
        let x = optimize_acquisition(&acq, &unit_square(), 2, &options, None, &mut rng).unwrap();
        assert_eq!(x.shape(), (2, 2));
        for row in x.row_iter() {
            assert!(unit_square().contains(&row.transpose()));
        }
    }

    #[test]
    fn zero_candidates() {
        let acq = Peak(DVector::from_vec(vec![0.5, 0.5]));
        let mut rng = StdRng::seed_from_u64(3);
        let x = optimize_acquisition(&acq, &unit_square(), 0, &OptimOptions::default(), None, &mut rng)
            .unwrap();
        assert_eq!(x.nrows(), 0);
    }
}
