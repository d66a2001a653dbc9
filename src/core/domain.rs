//! Bounded search domain of the input variables.

use std::iter::FromIterator;

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Rectangular domain of the variables.
///
/// Every variable has finite lower and upper bound with `lower < upper`. The
/// bounds are aligned with [`Vocs::variable_names`](super::Vocs::variable_names).
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl Domain {
    /// Creates rectangular domain with given bounds.
    ///
    /// # Panics
    ///
    /// Panics if the bounds are empty, have different size or some lower bound
    /// is not strictly less than the corresponding upper bound.
    pub fn rect(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        assert!(!lower.is_empty(), "empty domain");
        assert!(
            lower.len() == upper.len(),
            "lower and upper have different size"
        );
        assert!(
            lower
                .iter()
                .zip(upper.iter())
                .all(|(l, u)| l.is_finite() && u.is_finite() && l < u),
            "bounds must be finite with lower < upper"
        );

        Self {
            lower: DVector::from_vec(lower),
            upper: DVector::from_vec(upper),
        }
    }

    /// Gets the dimension of the domain.
    pub fn dim(&self) -> usize {
        self.lower.nrows()
    }

    /// Lower bounds.
    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    /// Upper bounds.
    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    /// The midpoint of the domain.
    pub fn center(&self) -> DVector<f64> {
        (&self.lower + &self.upper) * 0.5
    }

    /// The width of the domain in every dimension.
    pub fn range(&self) -> DVector<f64> {
        &self.upper - &self.lower
    }

    /// Tests whether the point lies in the domain (bounds inclusive).
    pub fn contains(&self, x: &DVector<f64>) -> bool {
        x.len() == self.dim()
            && x
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(xi, (li, ui))| li <= xi && xi <= ui)
    }

    /// Projects given point into the domain.
    ///
    /// Returns `true` if the point was not feasible before the projection.
    pub fn project(&self, x: &mut DVector<f64>) -> bool {
        let mut not_feasible = false;

        self.lower
            .iter()
            .zip(self.upper.iter())
            .zip(x.iter_mut())
            .for_each(|((li, ui), xi)| {
                if *xi < *li {
                    *xi = *li;
                    not_feasible = true;
                } else if *xi > *ui {
                    *xi = *ui;
                    not_feasible = true;
                }
            });

        not_feasible
    }

    /// Samples a point in the domain uniformly.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<f64> {
        DVector::from_iterator(
            self.dim(),
            self.lower
                .iter()
                .zip(self.upper.iter())
                .map(|(li, ui)| Uniform::new_inclusive(*li, *ui).sample(rng)),
        )
    }

    /// Samples `n` points in the domain uniformly, one point per row.
    pub fn sample_matrix<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> DMatrix<f64> {
        let mut x = DMatrix::zeros(n, self.dim());
        for i in 0..n {
            x.set_row(i, &self.sample(rng).transpose());
        }
        x
    }

    /// Maps a point from the domain to the unit cube.
    pub fn normalize(&self, x: &DVector<f64>) -> DVector<f64> {
        (x - &self.lower).component_div(&self.range())
    }

    /// Maps a point from the unit cube back to the domain.
    pub fn unnormalize(&self, x: &DVector<f64>) -> DVector<f64> {
        x.component_mul(&self.range()) + &self.lower
    }

    /// Restricts the domain to a box around `x` whose half-width in each
    /// dimension is the corresponding fraction of the domain range.
    pub fn restrict_around(&self, x: &DVector<f64>, fractions: &[f64]) -> Self {
        let range = self.range();

        let (lower, upper) = (0..self.dim())
            .map(|i| {
                let delta = fractions[i] * range[i];
                let li = (x[i] - delta).max(self.lower[i]).min(self.upper[i]);
                let ui = (x[i] + delta).min(self.upper[i]).max(self.lower[i]);

                // Keep the box non-degenerate for the local search.
                if ui - li > f64::EPSILON * range[i] {
                    (li, ui)
                } else {
                    let eps = 1e-6 * range[i];
                    ((li - eps).max(self.lower[i]), (ui + eps).min(self.upper[i]))
                }
            })
            .unzip();

        Self::rect(lower, upper)
    }

    /// Appends a new dimension with given bounds.
    pub fn extended(&self, lower: f64, upper: f64) -> Self {
        let mut l = self.lower.iter().copied().collect::<Vec<_>>();
        let mut u = self.upper.iter().copied().collect::<Vec<_>>();
        l.push(lower);
        u.push(upper);
        Self::rect(l, u)
    }
}

impl FromIterator<(f64, f64)> for Domain {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        let (lower, upper): (Vec<_>, Vec<_>) = iter.into_iter().unzip();
        Self::rect(lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn project_reports_infeasibility() {
        let dom: Domain = [(0.0, 1.0), (-1.0, 1.0)].into_iter().collect();

        let mut x = DVector::from_vec(vec![2.0, 0.5]);
        assert!(dom.project(&mut x));
        assert_eq!(x.as_slice(), &[1.0, 0.5]);

        assert!(!dom.project(&mut x));
    }

    #[test]
    fn samples_are_inside() {
        let dom: Domain = [(0.0, 1.0), (-5.0, -4.0), (10.0, 100.0)]
            .into_iter()
            .collect();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..100 {
            assert!(dom.contains(&dom.sample(&mut rng)));
        }
    }

    #[test]
    fn normalization_inverse() {
        let dom: Domain = [(2.0, 4.0), (-1.0, 3.0)].into_iter().collect();
        let x = DVector::from_vec(vec![3.0, 0.0]);

        let u = dom.normalize(&x);
        assert_relative_eq!(u[0], 0.5);
        assert_relative_eq!(u[1], 0.25);
        assert_relative_eq!(dom.unnormalize(&u), x);
    }

    #[test]
    fn restrict_stays_within_bounds() {
        let dom: Domain = [(0.0, 10.0), (0.0, 1.0)].into_iter().collect();
        let x = DVector::from_vec(vec![9.5, 0.5]);

        let local = dom.restrict_around(&x, &[0.1, 0.1]);
        assert_relative_eq!(local.lower()[0], 8.5);
        assert_relative_eq!(local.upper()[0], 10.0);
        assert_relative_eq!(local.lower()[1], 0.4);
        assert_relative_eq!(local.upper()[1], 0.6);
    }
}
