use nalgebra::DMatrix;

use super::{half_pi_sqrt, ObjectiveTransform, SampleUtility};

/// Monte-Carlo upper confidence bound.
///
/// For each point the sample utility is `μ + sqrt(β·π/2)·|y − μ|` of the
/// scalar objective, which in expectation equals `μ + sqrt(β)·σ`. Infeasible
/// points are pulled towards `floor`, a value dominated by every observed
/// utility. The batch value is the maximum over its points.
#[derive(Debug, Clone)]
pub struct UpperConfidenceBoundUtility {
    objective: ObjectiveTransform,
    beta_prime: f64,
    floor: f64,
}

impl UpperConfidenceBoundUtility {
    /// Creates the utility with exploration weight `beta`.
    pub fn new(objective: ObjectiveTransform, beta: f64, floor: f64) -> Self {
        Self {
            objective,
            beta_prime: beta.sqrt() * half_pi_sqrt(),
            floor,
        }
    }
}

impl SampleUtility for UpperConfidenceBoundUtility {
    fn value(&self, sample: &DMatrix<f64>, mean: &DMatrix<f64>, feasibility: &[f64]) -> f64 {
        let y = self.objective.apply_rows(sample);
        let mu = self.objective.apply_rows(mean);

        (0..y.nrows())
            .map(|i| {
                let u = mu[(i, 0)] + self.beta_prime * (y[(i, 0)] - mu[(i, 0)]).abs();
                let w = feasibility[i];
                w * u + (1.0 - w) * self.floor
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// A value dominated by all observed objective values.
pub(crate) fn dominated_value(values: impl Iterator<Item = f64>) -> f64 {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    });

    if min.is_finite() && max.is_finite() {
        min - (max - min) - 1.0
    } else {
        -1.0
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::acquisition::create_scalar_objective;
    use crate::core::{ObjectiveDirection, Vocs};

    fn objective(direction: ObjectiveDirection) -> ObjectiveTransform {
        let vocs = Vocs::builder()
            .variable("x", 0.0, 1.0)
            .objective("y", direction)
            .build()
            .unwrap();
        create_scalar_objective(&vocs)
    }

    #[test]
    fn rewards_uncertainty() {
        let utility = UpperConfidenceBoundUtility::new(objective(ObjectiveDirection::Maximize), 2.0, -10.0);
        let mean = DMatrix::from_element(1, 1, 1.0);

        let exact = utility.value(&mean, &mean, &[1.0]);
        let deviated = utility.value(&DMatrix::from_element(1, 1, 0.5), &mean, &[1.0]);

        assert_relative_eq!(exact, 1.0);
        assert!(deviated > exact);
    }

    #[test]
    fn minimization_is_negated() {
        let utility = UpperConfidenceBoundUtility::new(objective(ObjectiveDirection::Minimize), 0.0, -10.0);
        let mean = DMatrix::from_element(1, 1, 3.0);
        assert_relative_eq!(utility.value(&mean, &mean, &[1.0]), -3.0);
    }

    #[test]
    fn infeasible_points_are_dominated() {
        let utility = UpperConfidenceBoundUtility::new(objective(ObjectiveDirection::Maximize), 0.0, -10.0);
        let mean = DMatrix::from_column_slice(2, 1, &[5.0, 1.0]);

        // The better point is infeasible, the batch value comes from the other.
        assert_relative_eq!(utility.value(&mean, &mean, &[0.0, 1.0]), 1.0);
        assert_relative_eq!(utility.value(&mean, &mean, &[0.0, 0.0]), -10.0);
    }

    #[test]
    fn dominated_value_is_below_all() {
        let floor = dominated_value([1.0, 3.0, -2.0].into_iter());
        assert!(floor < -2.0);
        assert_relative_eq!(dominated_value(std::iter::empty()), -1.0);
    }
}
