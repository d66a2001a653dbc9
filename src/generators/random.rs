//! Uniform random sampling of the variable bounds.

use rand::{rngs::StdRng, SeedableRng};

use crate::core::{append_observations, Error, Generator, Table, Vocs};

/// Generator sampling uniformly from the variable bounds. It ignores the
/// observations.
pub struct RandomGenerator {
    vocs: Vocs,
    data: Table,
    rng: StdRng,
}

impl RandomGenerator {
    /// Initializes the generator.
    pub fn new(vocs: Vocs) -> Self {
        Self {
            vocs,
            data: Table::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Makes the samples reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl Generator for RandomGenerator {
    const NAME: &'static str = "random";
    type Options = ();

    fn default_options() -> Self::Options {}

    fn vocs(&self) -> &Vocs {
        &self.vocs
    }

    fn options(&self) -> &Self::Options {
        &()
    }

    fn data(&self) -> &Table {
        &self.data
    }

    fn add_data(&mut self, new_data: &Table) -> Result<(), Error> {
        append_observations(&self.vocs, &mut self.data, new_data)
    }

    fn generate(&mut self, n_candidates: usize) -> Result<Table, Error> {
        Ok(self.vocs.random_inputs(n_candidates, &mut self.rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{run, test_vocs, ConstrainedQuadratic};

    #[test]
    fn any_batch_size() {
        let mut generator = RandomGenerator::new(test_vocs()).with_seed(3);

        assert_eq!(generator.generate(0).unwrap().len(), 0);
        assert_eq!(generator.generate(17).unwrap().len(), 17);

        run(&mut generator, &ConstrainedQuadratic, 3, 4).unwrap();
        assert_eq!(generator.data().len(), 12);
    }

    #[test]
    fn reproducible() {
        let a = RandomGenerator::new(test_vocs()).with_seed(5).generate(4).unwrap();
        let b = RandomGenerator::new(test_vocs()).with_seed(5).generate(4).unwrap();
        assert_eq!(a, b);
    }
}
