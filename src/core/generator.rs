use super::{Error, Table, Vocs};

/// Common interface for all generators.
///
/// A generator holds the problem definition, its options and all observations
/// it was given so far. The essential method is
/// [`generate`](Generator::generate) which proposes new input points given the
/// current data. The caller evaluates the points and hands the results back
/// through [`add_data`](Generator::add_data). Thus one generate/add cycle
/// represents one step of the sequential optimization.
///
/// Generators are plain single-owner state machines. Calls on one instance
/// must be serialized by the caller; there is no internal locking.
///
/// ## Implementing a generator
///
/// Here is an implementation of a generator that always proposes the center of
/// the domain (if such a thing can be called a generator).
///
/// ```rust
/// use seqopt::{Error, Generator, Table, Vocs};
///
/// struct Center {
///     vocs: Vocs,
///     data: Table,
/// }
///
/// impl Generator for Center {
///     const NAME: &'static str = "Center";
///     type Options = ();
///
///     fn default_options() -> Self::Options {}
///
///     fn vocs(&self) -> &Vocs {
///         &self.vocs
///     }
///
///     fn options(&self) -> &Self::Options {
///         &()
///     }
///
///     fn data(&self) -> &Table {
///         &self.data
///     }
///
///     fn add_data(&mut self, new_data: &Table) -> Result<(), Error> {
///         self.data.append(new_data);
///         Ok(())
///     }
///
///     fn generate(&mut self, n_candidates: usize) -> Result<Table, Error> {
///         let center = self.vocs.bounds().center().transpose();
///         let x = seqopt::nalgebra::DMatrix::from_fn(n_candidates, center.len(), |_, j| center[j]);
///         Ok(self.vocs.inputs_from_matrix(&x))
///     }
/// }
/// ```
pub trait Generator {
    /// Name of the generator.
    const NAME: &'static str;

    /// Options type of the generator.
    type Options;

    /// Returns a fresh instance of the default options.
    fn default_options() -> Self::Options;

    /// The problem definition.
    fn vocs(&self) -> &Vocs;

    /// The options the generator was constructed with.
    fn options(&self) -> &Self::Options;

    /// All observations added so far, in the order of arrival.
    fn data(&self) -> &Table;

    /// Appends new observations.
    ///
    /// Adding an empty table is a no-op. Otherwise the only check is that all
    /// variable columns are present.
    fn add_data(&mut self, new_data: &Table) -> Result<(), Error>;

    /// Proposes `n_candidates` new input points as a table with one row per
    /// point and a column per variable (plus constants).
    ///
    /// The accumulated data is never modified by this method. Generators that
    /// cannot produce a batch of the requested size return
    /// [`Error::UnsupportedBatchSize`].
    fn generate(&mut self, n_candidates: usize) -> Result<Table, Error>;
}

/// Appends `new_data` to `data` after checking the presence of the variable
/// columns.
pub(crate) fn append_observations(vocs: &Vocs, data: &mut Table, new_data: &Table) -> Result<(), Error> {
    if new_data.is_empty() {
        return Ok(());
    }

    new_data.require_columns(vocs.variable_names())?;
    data.append(new_data);
    Ok(())
}
