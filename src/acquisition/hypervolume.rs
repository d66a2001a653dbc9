//! Hypervolume computations and expected hypervolume improvement.
//!
//! All functions work in the maximization space: a point dominates another if
//! it is not worse in any objective and better in at least one, and the
//! hypervolume is the volume dominated by a set of points and bounded by the
//! reference point from below.
//!
//! # References
//!
//! \[1\] [A Faster Algorithm for Calculating
//! Hypervolume](https://ieeexplore.ieee.org/document/1583625)
//!
//! \[2\] [Parallel Bayesian Optimization of Multiple Noisy Objectives with
//! Expected Hypervolume Improvement](https://arxiv.org/abs/2105.08195)

use std::cmp::Ordering;

use nalgebra::{DMatrix, DVector};

use super::{ObjectiveTransform, SampleUtility};

/// Whether `a` dominates `b` (maximization).
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    a.iter().zip(b.iter()).all(|(ai, bi)| ai >= bi) && a.iter().zip(b.iter()).any(|(ai, bi)| ai > bi)
}

/// Non-dominated subset of the points. Duplicates are kept once.
pub fn pareto_front(points: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut front: Vec<Vec<f64>> = Vec::new();

    for (i, p) in points.iter().enumerate() {
        let dominated = points.iter().any(|q| dominates(q, p));
        let duplicate = points[..i].iter().any(|q| q == p);

        if !dominated && !duplicate {
            front.push(p.clone());
        }
    }

    front
}

/// Hypervolume dominated by the points and bounded by the reference point.
///
/// Points that do not strictly dominate the reference point in every objective
/// contribute nothing. Computed by recursive slicing along the last objective.
pub fn hypervolume(points: &[Vec<f64>], reference: &[f64]) -> f64 {
    let points = points
        .iter()
        .filter(|p| p.iter().zip(reference.iter()).all(|(pi, ri)| pi > ri))
        .cloned()
        .collect::<Vec<_>>();

    slice_volume(pareto_front(&points), reference)
}

fn slice_volume(mut points: Vec<Vec<f64>>, reference: &[f64]) -> f64 {
    let m = reference.len();

    if points.is_empty() {
        return 0.0;
    }

    if m == 1 {
        return points
            .iter()
            .map(|p| p[0])
            .fold(f64::NEG_INFINITY, f64::max)
            - reference[0];
    }

    points.sort_by(|a, b| b[m - 1].partial_cmp(&a[m - 1]).unwrap_or(Ordering::Equal));

    let mut volume = 0.0;
    for i in 0..points.len() {
        let lower = points
            .get(i + 1)
            .map(|p| p[m - 1])
            .unwrap_or(reference[m - 1]);
        let height = points[i][m - 1] - lower;

        if height > 0.0 {
            let projected = points[..=i]
                .iter()
                .map(|p| p[..m - 1].to_vec())
                .collect::<Vec<_>>();
            volume += height * slice_volume(pareto_front(&projected), &reference[..m - 1]);
        }
    }

    volume
}

/// Monte-Carlo expected hypervolume improvement over a baseline front.
///
/// The baseline front is formed by the posterior means at the observed inputs
/// that are predicted feasible. For each posterior sample, the improvement of
/// the batch is weighted by the product of feasibilities of its points.
#[derive(Debug, Clone)]
pub struct ExpectedHypervolumeImprovement {
    objective: ObjectiveTransform,
    reference: Vec<f64>,
    front: Vec<Vec<f64>>,
    baseline_volume: f64,
}

impl ExpectedHypervolumeImprovement {
    /// Creates the utility.
    ///
    /// `reference` is in the maximization space. `baseline` has one row per
    /// baseline outcome (model outputs, not transformed) and `feasible` tells
    /// which rows are kept for the front.
    pub fn new(
        objective: ObjectiveTransform,
        reference: Vec<f64>,
        baseline: &DMatrix<f64>,
        feasible: &[bool],
    ) -> Self {
        assert_eq!(objective.n_objectives(), reference.len(), "reference dimension mismatch");

        let values = objective.apply_rows(baseline);
        let points = (0..values.nrows())
            .filter(|i| feasible[*i])
            .map(|i| values.row(i).iter().copied().collect::<Vec<_>>())
            .collect::<Vec<_>>();

        let front = pareto_front(&points);
        let baseline_volume = hypervolume(&front, &reference);

        Self {
            objective,
            reference,
            front,
            baseline_volume,
        }
    }

    /// The current Pareto front in the maximization space.
    pub fn front(&self) -> &[Vec<f64>] {
        &self.front
    }

    /// Hypervolume of the baseline front.
    pub fn baseline_volume(&self) -> f64 {
        self.baseline_volume
    }

    /// Hypervolume improvement of adding the outcome vectors.
    pub fn improvement(&self, outcomes: &[DVector<f64>]) -> f64 {
        let mut points = self.front.clone();
        points.extend(
            outcomes
                .iter()
                .map(|y| self.objective.apply(y).iter().copied().collect::<Vec<_>>()),
        );

        (hypervolume(&points, &self.reference) - self.baseline_volume).max(0.0)
    }
}

impl SampleUtility for ExpectedHypervolumeImprovement {
    fn value(&self, sample: &DMatrix<f64>, _mean: &DMatrix<f64>, feasibility: &[f64]) -> f64 {
        let outcomes = (0..sample.nrows())
            .map(|i| sample.row(i).transpose())
            .collect::<Vec<_>>();

        self.improvement(&outcomes) * feasibility.iter().product::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::acquisition::create_multi_objective;
    use crate::core::{ObjectiveDirection, Vocs};

    #[test]
    fn front_filters_dominated() {
        let points = vec![
            vec![1.0, 1.0],
            vec![2.0, 0.5],
            vec![0.5, 0.5],
            vec![1.0, 1.0],
        ];
        let front = pareto_front(&points);
        assert_eq!(front, vec![vec![1.0, 1.0], vec![2.0, 0.5]]);
    }

    #[test]
    fn hypervolume_2d() {
        let points = vec![vec![1.0, 3.0], vec![2.0, 2.0], vec![3.0, 1.0]];
        // Staircase of three unit-width steps.
        assert_relative_eq!(hypervolume(&points, &[0.0, 0.0]), 6.0);
    }

    #[test]
    fn hypervolume_3d_box() {
        let points = vec![vec![1.0, 2.0, 3.0]];
        assert_relative_eq!(hypervolume(&points, &[0.0, 0.0, 0.0]), 6.0);

        let points = vec![vec![1.0, 1.0, 2.0], vec![2.0, 2.0, 1.0]];
        // 1*1*2 + 2*2*1 - overlap 1*1*1
        assert_relative_eq!(hypervolume(&points, &[0.0, 0.0, 0.0]), 5.0);
    }

    #[test]
    fn points_below_reference_are_ignored() {
        let points = vec![vec![-1.0, 5.0]];
        assert_relative_eq!(hypervolume(&points, &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn improvement_of_dominating_point() {
        let vocs = Vocs::builder()
            .variable("x", 0.0, 1.0)
            .objective("f1", ObjectiveDirection::Maximize)
            .objective("f2", ObjectiveDirection::Minimize)
            .build()
            .unwrap();
        let objective = create_multi_objective(&vocs);

        // f2 is minimized, so in the maximization space the reference is
        // (0, -4) and the baseline point (1, 2) maps to (1, -2).
        let baseline = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
        let ehvi = ExpectedHypervolumeImprovement::new(objective, vec![0.0, -4.0], &baseline, &[true]);
        assert_relative_eq!(ehvi.baseline_volume(), 2.0);

        let better = DVector::from_vec(vec![2.0, 1.0]);
        assert_relative_eq!(ehvi.improvement(&[better]), 4.0);

        let worse = DVector::from_vec(vec![0.5, 3.0]);
        assert_relative_eq!(ehvi.improvement(&[worse]), 0.0);
    }
}
