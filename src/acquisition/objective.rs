use nalgebra::{DMatrix, DVector};

use crate::core::{Constraint, Vocs};

/// Maps model outputs to objective values to be maximized.
///
/// Model outputs are ordered as [`Vocs::output_names`]: objectives first, then
/// constraints. Minimized objectives are negated.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveTransform {
    weights: Vec<(usize, f64)>,
}

impl ObjectiveTransform {
    /// Number of objectives produced by the transform.
    pub fn n_objectives(&self) -> usize {
        self.weights.len()
    }

    /// Objective values of one outcome vector.
    pub fn apply(&self, y: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.weights.len(),
            self.weights.iter().map(|(index, weight)| weight * y[*index]),
        )
    }

    /// Objective values of every row of `y`.
    pub fn apply_rows(&self, y: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(y.nrows(), self.weights.len(), |i, j| {
            let (index, weight) = self.weights[j];
            weight * y[(i, index)]
        })
    }

    /// Sign-adjusts a value of the objective with given position.
    pub fn weight(&self, objective: usize) -> f64 {
        self.weights[objective].1
    }
}

/// Creates the scalar objective of a single-objective problem.
///
/// # Panics
///
/// Panics if the problem does not have exactly one objective. Generators
/// check this at construction.
pub fn create_scalar_objective(vocs: &Vocs) -> ObjectiveTransform {
    assert_eq!(vocs.n_objectives(), 1, "expected single objective");
    create_multi_objective(vocs)
}

/// Creates the vector objective of a (possibly) multi-objective problem.
pub fn create_multi_objective(vocs: &Vocs) -> ObjectiveTransform {
    ObjectiveTransform {
        weights: vocs
            .objectives()
            .iter()
            .enumerate()
            .map(|(index, (_, direction))| (index, direction.sign()))
            .collect(),
    }
}

/// Signed feasibility margin of one model output. Negative means feasible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintTransform {
    index: usize,
    constraint: Constraint,
}

impl ConstraintTransform {
    /// Margin of an outcome vector.
    pub fn margin(&self, y: &DVector<f64>) -> f64 {
        self.constraint.margin(y[self.index])
    }

    /// Index of the constrained model output.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Creates one transform per constraint of the problem.
pub fn create_constraints(vocs: &Vocs) -> Vec<ConstraintTransform> {
    let offset = vocs.n_objectives();
    vocs.constraints()
        .iter()
        .enumerate()
        .map(|(i, (_, constraint))| ConstraintTransform {
            index: offset + i,
            constraint: *constraint,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConstraintRelation, ObjectiveDirection};

    #[test]
    fn signs_and_margins() {
        let vocs = Vocs::builder()
            .variable("x", 0.0, 1.0)
            .objective("f1", ObjectiveDirection::Minimize)
            .objective("f2", ObjectiveDirection::Maximize)
            .constraint("c1", ConstraintRelation::GreaterThan, 0.5)
            .constraint("c2", ConstraintRelation::LessThan, 2.0)
            .build()
            .unwrap();

        let y = DVector::from_vec(vec![1.0, 2.0, 0.7, 3.0]);

        let objective = create_multi_objective(&vocs);
        assert_eq!(objective.apply(&y).as_slice(), &[-1.0, 2.0]);

        let constraints = create_constraints(&vocs);
        assert_eq!(constraints.len(), 2);
        assert!(constraints[0].margin(&y) < 0.0);
        assert!(constraints[1].margin(&y) > 0.0);
        assert_eq!(constraints[1].index(), 3);
    }
}
