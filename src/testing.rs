//! Test problems and utilities useful for examples, benchmarking and smoke
//! testing of the generators.
//!
//! [`ConstrainedQuadratic`] is the problem behind [`test_vocs`] and
//! [`test_data`], [`Sphere`] is recommended for single-objective tests of
//! unconstrained generators and [`TwoQuadratics`] for multi-objective ones.
//!
//! # References
//!
//! \[1\] [A Literature Survey of Benchmark Functions For Global Optimization
//! Problems](https://arxiv.org/abs/1308.4008)

#![allow(unused)]

use log::debug;

use crate::core::{ConstraintRelation, Error, Generator, ObjectiveDirection, Record, Table, Vocs};

/// Black-box function with a known problem definition.
pub trait TestFunction {
    /// Problem definition of the function.
    fn vocs(&self) -> Vocs;

    /// Evaluates the outputs (objectives and constraints) at the input point.
    fn evaluate(&self, inputs: &Record) -> Record;

    /// A global optimum, if known and unique.
    fn optimum(&self) -> Option<Vec<f64>> {
        None
    }
}

/// Sphere function `Σ xᵢ²` on `[-1, 1]ⁿ` with a minimum at the origin.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    n: usize,
}

impl Sphere {
    /// Initializes the function with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n }
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(2)
    }
}

impl TestFunction for Sphere {
    fn vocs(&self) -> Vocs {
        (0..self.n)
            .fold(Vocs::builder(), |builder, i| {
                builder.variable(format!("x{}", i + 1), -1.0, 1.0)
            })
            .objective("f", ObjectiveDirection::Minimize)
            .build()
            .expect("sphere problem definition is valid")
    }

    fn evaluate(&self, inputs: &Record) -> Record {
        let f = (0..self.n)
            .map(|i| inputs[&format!("x{}", i + 1)].powi(2))
            .sum::<f64>();
        Record::from([("f".to_string(), f)])
    }

    fn optimum(&self) -> Option<Vec<f64>> {
        Some(vec![0.0; self.n])
    }
}

/// Quadratic function of two variables with one inequality constraint.
///
/// Minimizes `y1 = (x1 - 0.75)² + ((x2 - 2) / 10)²` subject to
/// `c1 = x1 + x2 / 10 > 0.5` on `[0, 1] × [0, 10]`. The problem carries a
/// constant `constant1 = 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstrainedQuadratic;

impl TestFunction for ConstrainedQuadratic {
    fn vocs(&self) -> Vocs {
        Vocs::builder()
            .variable("x1", 0.0, 1.0)
            .variable("x2", 0.0, 10.0)
            .objective("y1", ObjectiveDirection::Minimize)
            .constraint("c1", ConstraintRelation::GreaterThan, 0.5)
            .constant("constant1", 1.0)
            .build()
            .expect("quadratic problem definition is valid")
    }

    fn evaluate(&self, inputs: &Record) -> Record {
        let x1 = inputs["x1"];
        let x2 = inputs["x2"];

        Record::from([
            (
                "y1".to_string(),
                (x1 - 0.75).powi(2) + ((x2 - 2.0) / 10.0).powi(2),
            ),
            ("c1".to_string(), x1 + x2 / 10.0),
        ])
    }

    fn optimum(&self) -> Option<Vec<f64>> {
        Some(vec![0.75, 2.0])
    }
}

/// Two conflicting quadratic objectives on `[0, 1]²`.
///
/// Minimizes `f1 = x1² + x2²` and `f2 = (x1 - 1)² + (x2 - 1)²`. The Pareto set
/// is the diagonal between the two minima.
#[derive(Debug, Clone, Copy, Default)]
pub struct TwoQuadratics;

impl TestFunction for TwoQuadratics {
    fn vocs(&self) -> Vocs {
        Vocs::builder()
            .variable("x1", 0.0, 1.0)
            .variable("x2", 0.0, 1.0)
            .objective("f1", ObjectiveDirection::Minimize)
            .objective("f2", ObjectiveDirection::Minimize)
            .build()
            .expect("two quadratics problem definition is valid")
    }

    fn evaluate(&self, inputs: &Record) -> Record {
        let x1 = inputs["x1"];
        let x2 = inputs["x2"];

        Record::from([
            ("f1".to_string(), x1.powi(2) + x2.powi(2)),
            ("f2".to_string(), (x1 - 1.0).powi(2) + (x2 - 1.0).powi(2)),
        ])
    }
}

/// Problem definition of [`ConstrainedQuadratic`].
pub fn test_vocs() -> Vocs {
    ConstrainedQuadratic.vocs()
}

/// Ten evaluated observations of [`ConstrainedQuadratic`] spread over the
/// bounds.
pub fn test_data() -> Table {
    let candidates = Table::from_records((0..10).map(|i| {
        let x1 = i as f64 / 9.0;
        let x2 = 10.0 * ((3 * i) % 10) as f64 / 9.0;
        vec![("x1", x1), ("x2", x2), ("constant1", 1.0)]
    }));

    evaluate(&ConstrainedQuadratic, &candidates)
}

/// Evaluates the candidates and returns them together with the outputs.
pub fn evaluate<F: TestFunction + ?Sized>(f: &F, candidates: &Table) -> Table {
    Table::from_records(candidates.records().map(|inputs| {
        let outputs = f.evaluate(&inputs);
        inputs.into_iter().chain(outputs)
    }))
}

/// Runs `steps` generate-evaluate-add cycles with `batch` candidates each.
pub fn run<G, F>(generator: &mut G, f: &F, steps: usize, batch: usize) -> Result<(), Error>
where
    G: Generator + ?Sized,
    F: TestFunction + ?Sized,
{
    for step in 0..steps {
        let candidates = generator.generate(batch)?;
        let observations = evaluate(f, &candidates);
        debug!("step {}: {} new observations", step, observations.len());
        generator.add_data(&observations)?;
    }

    Ok(())
}

/// Best feasible objective value (in the direction of the single objective)
/// observed so far.
pub fn best_value(vocs: &Vocs, data: &Table) -> Option<f64> {
    let (name, direction) = vocs.objectives().first()?;
    let sign = direction.sign();

    data.records()
        .filter(|record| {
            vocs.constraints().iter().all(|(name, constraint)| {
                record
                    .get(name)
                    .map(|value| constraint.is_satisfied(*value))
                    .unwrap_or(false)
            })
        })
        .filter_map(|record| record.get(name).copied())
        .max_by(|a, b| {
            (sign * a)
                .partial_cmp(&(sign * b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}
