//! Problem definition: variables, objectives, constraints and constants.

use nalgebra::DMatrix;
use rand::Rng;

use super::{Domain, Error, Table};

/// Direction of an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveDirection {
    /// Lower values are better.
    Minimize,
    /// Higher values are better.
    Maximize,
}

impl ObjectiveDirection {
    /// Multiplier that turns the objective into one to be maximized.
    pub fn sign(&self) -> f64 {
        match self {
            ObjectiveDirection::Minimize => -1.0,
            ObjectiveDirection::Maximize => 1.0,
        }
    }
}

/// Relation of a constraint to its threshold that must hold for a feasible
/// point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintRelation {
    /// The value must be less than the threshold.
    LessThan,
    /// The value must be greater than the threshold.
    GreaterThan,
}

/// Output constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    /// Relation that must hold.
    pub relation: ConstraintRelation,
    /// Threshold value.
    pub threshold: f64,
}

impl Constraint {
    /// Signed distance from the feasibility boundary. Negative means
    /// feasible.
    pub fn margin(&self, value: f64) -> f64 {
        match self.relation {
            ConstraintRelation::LessThan => value - self.threshold,
            ConstraintRelation::GreaterThan => self.threshold - value,
        }
    }

    /// Whether the value satisfies the constraint.
    pub fn is_satisfied(&self, value: f64) -> bool {
        self.margin(value) <= 0.0
    }
}

/// Variables, objectives, constraints and constants (statics) of an
/// optimization problem.
///
/// The definition is immutable once built. All name lists keep the declaration
/// order, which is the order used for every matrix exchanged with models and
/// optimizers.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocs {
    variables: Vec<String>,
    domain: Domain,
    objectives: Vec<(String, ObjectiveDirection)>,
    constraints: Vec<(String, Constraint)>,
    constants: Vec<(String, f64)>,
}

impl Vocs {
    /// Returns the builder.
    pub fn builder() -> VocsBuilder {
        VocsBuilder::default()
    }

    /// Names of the variables.
    pub fn variable_names(&self) -> &[String] {
        &self.variables
    }

    /// Names of the objectives.
    pub fn objective_names(&self) -> Vec<String> {
        self.objectives.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Names of the constraints.
    pub fn constraint_names(&self) -> Vec<String> {
        self.constraints.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Names of the constants.
    pub fn constant_names(&self) -> Vec<String> {
        self.constants.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Names of objectives followed by names of constraints.
    pub fn output_names(&self) -> Vec<String> {
        let mut names = self.objective_names();
        names.extend(self.constraint_names());
        names
    }

    /// Bounds of the variables.
    pub fn bounds(&self) -> &Domain {
        &self.domain
    }

    /// Objectives with their directions.
    pub fn objectives(&self) -> &[(String, ObjectiveDirection)] {
        &self.objectives
    }

    /// Constraints.
    pub fn constraints(&self) -> &[(String, Constraint)] {
        &self.constraints
    }

    /// Constants with their values.
    pub fn constants(&self) -> &[(String, f64)] {
        &self.constants
    }

    /// Direction of the objective with given name.
    pub fn objective_direction(&self, name: &str) -> Option<ObjectiveDirection> {
        self.objectives
            .iter()
            .find(|(objective, _)| objective == name)
            .map(|(_, direction)| *direction)
    }

    /// Number of variables.
    pub fn n_variables(&self) -> usize {
        self.variables.len()
    }

    /// Number of objectives.
    pub fn n_objectives(&self) -> usize {
        self.objectives.len()
    }

    /// Number of constraints.
    pub fn n_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Number of outputs (objectives and constraints).
    pub fn n_outputs(&self) -> usize {
        self.n_objectives() + self.n_constraints()
    }

    /// Samples `n` input points uniformly within the bounds. Constants are
    /// included.
    pub fn random_inputs<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Table {
        self.inputs_from_matrix(&self.domain.sample_matrix(n, rng))
    }

    /// Converts a matrix with one point per row (columns in the variable
    /// order) into a table of input points. Constants are appended.
    pub fn inputs_from_matrix(&self, x: &DMatrix<f64>) -> Table {
        let mut table = Table::new(self.variables.iter().chain(self.constant_names().iter()));

        for row in x.row_iter() {
            let variables = self.variables.iter().cloned().zip(row.iter().copied());
            let constants = self.constants.iter().cloned();
            table.push_record(variables.chain(constants));
        }

        table
    }
}

/// Builder for [`Vocs`].
#[derive(Debug, Clone, Default)]
pub struct VocsBuilder {
    variables: Vec<(String, f64, f64)>,
    objectives: Vec<(String, ObjectiveDirection)>,
    constraints: Vec<(String, Constraint)>,
    constants: Vec<(String, f64)>,
}

impl VocsBuilder {
    /// Adds a variable with its bounds.
    pub fn variable(mut self, name: impl Into<String>, lower: f64, upper: f64) -> Self {
        self.variables.push((name.into(), lower, upper));
        self
    }

    /// Adds an objective.
    pub fn objective(mut self, name: impl Into<String>, direction: ObjectiveDirection) -> Self {
        self.objectives.push((name.into(), direction));
        self
    }

    /// Adds a constraint.
    pub fn constraint(
        mut self,
        name: impl Into<String>,
        relation: ConstraintRelation,
        threshold: f64,
    ) -> Self {
        self.constraints.push((
            name.into(),
            Constraint {
                relation,
                threshold,
            },
        ));
        self
    }

    /// Adds a constant passed to the evaluator with every point.
    pub fn constant(mut self, name: impl Into<String>, value: f64) -> Self {
        self.constants.push((name.into(), value));
        self
    }

    /// Validates and builds the definition.
    pub fn build(self) -> Result<Vocs, Error> {
        if self.variables.is_empty() {
            return Err(Error::configuration("at least one variable is required"));
        }

        for (name, lower, upper) in self.variables.iter() {
            if !lower.is_finite() || !upper.is_finite() || lower >= upper {
                return Err(Error::configuration(format!(
                    "bounds of `{}` must be finite with lower < upper, got [{}, {}]",
                    name, lower, upper
                )));
            }
        }

        if let Some((name, _)) = self.constraints.iter().find(|(_, c)| !c.threshold.is_finite()) {
            return Err(Error::configuration(format!(
                "threshold of `{}` must be finite",
                name
            )));
        }

        let mut all = self
            .variables
            .iter()
            .map(|(name, _, _)| name)
            .chain(self.objectives.iter().map(|(name, _)| name))
            .chain(self.constraints.iter().map(|(name, _)| name))
            .chain(self.constants.iter().map(|(name, _)| name))
            .collect::<Vec<_>>();
        all.sort();
        if let Some(pair) = all.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(Error::configuration(format!(
                "name `{}` is declared more than once",
                pair[0]
            )));
        }

        let (variables, bounds): (Vec<_>, Vec<_>) = self
            .variables
            .into_iter()
            .map(|(name, lower, upper)| (name, (lower, upper)))
            .unzip();

        Ok(Vocs {
            variables,
            domain: bounds.into_iter().collect(),
            objectives: self.objectives,
            constraints: self.constraints,
            constants: self.constants,
        })
    }
}
