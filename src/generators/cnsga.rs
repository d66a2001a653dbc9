//! Constrained non-dominated sorting genetic algorithm.
//!
//! Each call to [`generate`](Generator::generate) selects a parent population
//! from all evaluated observations and breeds the requested number of children
//! from it. The parents are the best [`population_size`] observations by
//! constrained non-dominated sorting, ties broken by crowding distance.
//! Children are produced by binary tournament selection, simulated binary
//! crossover and polynomial mutation, all within the variable bounds.
//!
//! Constrained domination prefers feasible points over infeasible ones and
//! infeasible points with smaller total constraint violation over those with
//! larger.
//!
//! # References
//!
//! \[1\] [A fast and elitist multiobjective genetic algorithm:
//! NSGA-II](https://ieeexplore.ieee.org/document/996017)
//!
//! \[2\] [Simulated Binary Crossover for Continuous Search
//! Space](https://www.complex-systems.com/abstracts/v09_i02_a02/)
//!
//! [`population_size`]: CnsgaOptions::population_size

use std::cmp::Ordering;

use getset::CopyGetters;
use log::debug;
use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::acquisition::{create_constraints, create_multi_objective, hypervolume::dominates};
use crate::core::{append_observations, Domain, Error, Generator, Table, Vocs};
use crate::options::{check_at_least, check_positive, ValidationError};

/// Options for [`CnsgaGenerator`].
#[derive(Debug, Clone, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct CnsgaOptions {
    /// Number of parents selected from the observations. Default: `64`.
    population_size: usize,
    /// Probability that a pair of parents is recombined. Default: `0.9`.
    crossover_probability: f64,
    /// Distribution index of the simulated binary crossover. Default: `20`.
    crossover_eta: f64,
    /// Distribution index of the polynomial mutation. Default: `20`.
    mutation_eta: f64,
}

impl Default for CnsgaOptions {
    fn default() -> Self {
        Self {
            population_size: 64,
            crossover_probability: 0.9,
            crossover_eta: 20.0,
            mutation_eta: 20.0,
        }
    }
}

impl CnsgaOptions {
    /// Sets the population size.
    pub fn set_population_size(&mut self, value: usize) -> Result<&mut Self, ValidationError> {
        self.population_size = check_at_least("population_size", value, 2)?;
        Ok(self)
    }

    /// Sets the crossover probability.
    pub fn set_crossover_probability(&mut self, value: f64) -> Result<&mut Self, ValidationError> {
        self.crossover_probability = check_probability("crossover_probability", value)?;
        Ok(self)
    }

    /// Sets the crossover distribution index.
    pub fn set_crossover_eta(&mut self, value: f64) -> Result<&mut Self, ValidationError> {
        self.crossover_eta = check_positive("crossover_eta", value)?;
        Ok(self)
    }

    /// Sets the mutation distribution index.
    pub fn set_mutation_eta(&mut self, value: f64) -> Result<&mut Self, ValidationError> {
        self.mutation_eta = check_positive("mutation_eta", value)?;
        Ok(self)
    }

    /// Validates all fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_at_least("population_size", self.population_size, 2)?;
        check_probability("crossover_probability", self.crossover_probability)?;
        check_positive("crossover_eta", self.crossover_eta)?;
        check_positive("mutation_eta", self.mutation_eta)?;
        Ok(())
    }
}

fn check_probability(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            expected: "in [0, 1]",
            value,
        })
    }
}

/// Evaluated individual.
#[derive(Debug, Clone)]
struct Individual {
    x: DVector<f64>,
    /// Objective values in the maximization space.
    objectives: Vec<f64>,
    /// Sum of positive constraint margins.
    violation: f64,
    rank: usize,
    crowding: f64,
}

impl Individual {
    fn constrained_dominates(&self, other: &Individual) -> bool {
        match (self.violation > 0.0, other.violation > 0.0) {
            (false, true) => true,
            (true, false) => false,
            (true, true) => self.violation < other.violation,
            (false, false) => dominates(&self.objectives, &other.objectives),
        }
    }

    /// Ordering by rank and then crowding distance, better first.
    fn compare(&self, other: &Individual) -> Ordering {
        self.rank.cmp(&other.rank).then_with(|| {
            other
                .crowding
                .partial_cmp(&self.crowding)
                .unwrap_or(Ordering::Equal)
        })
    }
}

/// Assigns ranks of the non-dominated fronts (starting at zero) and crowding
/// distances within each front.
fn rank_and_crowd(population: &mut [Individual]) {
    let n = population.len();
    let mut dominated_by = vec![0usize; n];
    let mut dominating = vec![Vec::new(); n];

    for i in 0..n {
        for j in 0..n {
            if i != j && population[i].constrained_dominates(&population[j]) {
                dominating[i].push(j);
                dominated_by[j] += 1;
            }
        }
    }

    let mut front = (0..n).filter(|&i| dominated_by[i] == 0).collect::<Vec<_>>();
    let mut rank = 0;

    while !front.is_empty() {
        for &i in front.iter() {
            population[i].rank = rank;
        }
        assign_crowding(population, &front);

        let mut next = Vec::new();
        for &i in front.iter() {
            for &j in dominating[i].iter() {
                dominated_by[j] -= 1;
                if dominated_by[j] == 0 {
                    next.push(j);
                }
            }
        }

        front = next;
        rank += 1;
    }
}

fn assign_crowding(population: &mut [Individual], front: &[usize]) {
    for &i in front {
        population[i].crowding = 0.0;
    }

    let m = front
        .first()
        .map(|&i| population[i].objectives.len())
        .unwrap_or(0);

    for k in 0..m {
        let mut sorted = front.to_vec();
        sorted.sort_by(|&a, &b| {
            population[a].objectives[k]
                .partial_cmp(&population[b].objectives[k])
                .unwrap_or(Ordering::Equal)
        });

        let first = sorted[0];
        let last = sorted[sorted.len() - 1];
        let span = population[last].objectives[k] - population[first].objectives[k];

        population[first].crowding = f64::INFINITY;
        population[last].crowding = f64::INFINITY;

        if span <= 0.0 {
            continue;
        }

        for w in sorted.windows(3) {
            let gap = population[w[2]].objectives[k] - population[w[0]].objectives[k];
            population[w[1]].crowding += gap / span;
        }
    }
}

/// Simulated binary crossover of two parents.
fn crossover<R: Rng + ?Sized>(
    a: &DVector<f64>,
    b: &DVector<f64>,
    eta: f64,
    rng: &mut R,
) -> (DVector<f64>, DVector<f64>) {
    let mut c1 = a.clone_owned();
    let mut c2 = b.clone_owned();

    for i in 0..a.len() {
        if rng.gen_bool(0.5) || (a[i] - b[i]).abs() < 1e-14 {
            continue;
        }

        let u: f64 = rng.gen();
        let beta = if u <= 0.5 {
            (2.0 * u).powf(1.0 / (eta + 1.0))
        } else {
            (1.0 / (2.0 * (1.0 - u))).powf(1.0 / (eta + 1.0))
        };

        c1[i] = 0.5 * ((1.0 + beta) * a[i] + (1.0 - beta) * b[i]);
        c2[i] = 0.5 * ((1.0 - beta) * a[i] + (1.0 + beta) * b[i]);
    }

    (c1, c2)
}

/// Polynomial mutation with per-variable probability `1 / n`.
fn mutate<R: Rng + ?Sized>(x: &mut DVector<f64>, dom: &Domain, eta: f64, rng: &mut R) {
    let p = 1.0 / x.len() as f64;
    let range = dom.range();

    for i in 0..x.len() {
        if !rng.gen_bool(p) {
            continue;
        }

        let u: f64 = rng.gen();
        let delta = if u < 0.5 {
            (2.0 * u).powf(1.0 / (eta + 1.0)) - 1.0
        } else {
            1.0 - (2.0 * (1.0 - u)).powf(1.0 / (eta + 1.0))
        };

        x[i] += delta * range[i];
    }

    dom.project(x);
}

/// Genetic algorithm generator. See [module](self) documentation for more
/// details.
pub struct CnsgaGenerator {
    vocs: Vocs,
    options: CnsgaOptions,
    data: Table,
    rng: StdRng,
}

impl CnsgaGenerator {
    /// Initializes the generator with default options.
    pub fn new(vocs: Vocs) -> Result<Self, Error> {
        Self::with_options(vocs, CnsgaOptions::default())
    }

    /// Initializes the generator with given options.
    pub fn with_options(vocs: Vocs, options: CnsgaOptions) -> Result<Self, Error> {
        options.validate()?;

        if vocs.n_objectives() == 0 {
            return Err(Error::configuration(
                "genetic algorithm requires at least one objective",
            ));
        }

        Ok(Self {
            vocs,
            options,
            data: Table::default(),
            rng: StdRng::from_entropy(),
        })
    }

    /// Makes the random choices of the generator reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn individuals(&self) -> Result<Vec<Individual>, Error> {
        let variables = self.vocs.variable_names();
        let outputs = self.vocs.output_names();
        let all = variables
            .iter()
            .chain(outputs.iter())
            .cloned()
            .collect::<Vec<_>>();

        let rows = self.data.complete_rows(&all);
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let x = self.data.matrix(&rows, variables)?;
        let y = self.data.matrix(&rows, &outputs)?;
        let objective = create_multi_objective(&self.vocs);
        let constraints = create_constraints(&self.vocs);

        Ok((0..rows.len())
            .map(|i| {
                let yi = y.row(i).transpose();
                Individual {
                    x: x.row(i).transpose(),
                    objectives: objective.apply(&yi).iter().copied().collect(),
                    violation: constraints
                        .iter()
                        .map(|constraint| constraint.margin(&yi).max(0.0))
                        .sum(),
                    rank: 0,
                    crowding: 0.0,
                }
            })
            .collect())
    }

    /// Selects the parent population from the observations.
    fn select_population(&self) -> Result<Vec<Individual>, Error> {
        let mut population = self.individuals()?;
        rank_and_crowd(&mut population);
        population.sort_by(|a, b| a.compare(b));
        population.truncate(self.options.population_size);
        Ok(population)
    }

    fn tournament<'a>(&mut self, population: &'a [Individual]) -> &'a Individual {
        let a = &population[self.rng.gen_range(0..population.len())];
        let b = &population[self.rng.gen_range(0..population.len())];

        if b.compare(a) == Ordering::Less {
            b
        } else {
            a
        }
    }
}

impl Generator for CnsgaGenerator {
    const NAME: &'static str = "cnsga";
    type Options = CnsgaOptions;

    fn default_options() -> Self::Options {
        CnsgaOptions::default()
    }

    fn vocs(&self) -> &Vocs {
        &self.vocs
    }

    fn options(&self) -> &Self::Options {
        &self.options
    }

    fn data(&self) -> &Table {
        &self.data
    }

    fn add_data(&mut self, new_data: &Table) -> Result<(), Error> {
        append_observations(&self.vocs, &mut self.data, new_data)
    }

    fn generate(&mut self, n_candidates: usize) -> Result<Table, Error> {
        let population = self.select_population()?;

        if population.len() < 2 {
            debug!("not enough evaluated observations, sampling {} random points", n_candidates);
            return Ok(self.vocs.random_inputs(n_candidates, &mut self.rng));
        }

        debug!(
            "breeding {} children from population of {}",
            n_candidates,
            population.len()
        );

        let dom = self.vocs.bounds().clone();
        let mut children = Vec::with_capacity(n_candidates + 1);

        while children.len() < n_candidates {
            let a = self.tournament(&population).x.clone_owned();
            let b = self.tournament(&population).x.clone_owned();

            let (mut c1, mut c2) = if self.rng.gen_bool(self.options.crossover_probability) {
                crossover(&a, &b, self.options.crossover_eta, &mut self.rng)
            } else {
                (a, b)
            };

            mutate(&mut c1, &dom, self.options.mutation_eta, &mut self.rng);
            mutate(&mut c2, &dom, self.options.mutation_eta, &mut self.rng);

            children.push(c1);
            children.push(c2);
        }

        children.truncate(n_candidates);

        let d = self.vocs.n_variables();
        let x = DMatrix::from_fn(children.len(), d, |i, j| children[i][j]);
        Ok(self.vocs.inputs_from_matrix(&x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{run, TestFunction, TwoQuadratics};

    fn individual(objectives: Vec<f64>, violation: f64) -> Individual {
        Individual {
            x: DVector::zeros(1),
            objectives,
            violation,
            rank: 0,
            crowding: 0.0,
        }
    }

    #[test]
    fn ranks_fronts() {
        let mut population = vec![
            individual(vec![1.0, 1.0], 0.0),
            individual(vec![2.0, 0.0], 0.0),
            individual(vec![0.5, 0.5], 0.0),
            individual(vec![3.0, 3.0], 1.0),
            individual(vec![0.0, 0.0], 0.5),
        ];
        rank_and_crowd(&mut population);

        let ranks = population.iter().map(|i| i.rank).collect::<Vec<_>>();
        assert_eq!(ranks, vec![0, 0, 1, 3, 2]);

        // Boundary points of a front are preferred.
        assert!(population[0].crowding.is_infinite());
        assert!(population[1].crowding.is_infinite());
    }

    #[test]
    fn crowding_of_interior_point() {
        let mut population = vec![
            individual(vec![0.0, 4.0], 0.0),
            individual(vec![1.0, 3.0], 0.0),
            individual(vec![4.0, 0.0], 0.0),
        ];
        rank_and_crowd(&mut population);

        // (4 - 0) / 4 in both objectives.
        assert_eq!(population[1].crowding, 2.0);
    }

    #[test]
    fn random_without_observations() {
        let f = TwoQuadratics;
        let mut generator = CnsgaGenerator::new(f.vocs()).unwrap().with_seed(1);

        let candidates = generator.generate(5).unwrap();
        assert_eq!(candidates.len(), 5);
    }

    #[test]
    fn children_within_bounds() {
        let f = TwoQuadratics;
        let mut options = CnsgaOptions::default();
        options.set_population_size(8).unwrap();

        let mut generator = CnsgaGenerator::with_options(f.vocs(), options)
            .unwrap()
            .with_seed(2);
        run(&mut generator, &f, 5, 7).unwrap();
        assert_eq!(generator.data().len(), 35);

        let candidates = generator.generate(9).unwrap();
        assert_eq!(candidates.len(), 9);

        let bounds = generator.vocs().bounds();
        for record in candidates.records() {
            let x = DVector::from_vec(vec![record["x1"], record["x2"]]);
            assert!(bounds.contains(&x));
        }
    }

    #[test]
    fn failed_evaluations_are_not_individuals() {
        let f = TwoQuadratics;
        let mut generator = CnsgaGenerator::new(f.vocs()).unwrap().with_seed(3);
        generator
            .add_data(&Table::from_records(vec![
                vec![("x1", 0.2), ("x2", 0.3), ("f1", 1.0), ("f2", 2.0)],
                vec![("x1", 0.4), ("x2", 0.5), ("f1", f64::NAN), ("f2", 1.0)],
                vec![("x1", 0.6), ("x2", 0.7), ("f1", 2.0), ("f2", 0.5)],
            ]))
            .unwrap();

        let individuals = generator.individuals().unwrap();
        assert_eq!(individuals.len(), 2);
        assert!(individuals
            .iter()
            .all(|individual| individual.objectives.iter().all(|v| v.is_finite())));

        assert_eq!(generator.generate(4).unwrap().len(), 4);
    }

    #[test]
    fn options_validation() {
        let mut options = CnsgaOptions::default();
        assert!(options.set_population_size(1).is_err());
        assert!(options.set_crossover_probability(1.5).is_err());
        assert!(options.set_mutation_eta(0.0).is_err());
        assert_eq!(options, CnsgaOptions::default());
    }
}
