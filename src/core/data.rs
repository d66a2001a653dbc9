//! Observation table shared between the evaluator loop and the generators.

use std::collections::BTreeMap;

use nalgebra::DMatrix;

use super::Error;

/// A single row of a [`Table`] with missing cells left out.
pub type Record = BTreeMap<String, f64>;

/// Ordered, append-only table of observations.
///
/// Every row maps the column names to a value or to a missing cell (a point
/// that was generated but not evaluated yet, or an output that the evaluator
/// did not report). The order of rows is the order of arrival. Some
/// generators (extremum seeking, time-dependent Bayesian optimization) depend
/// on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

impl Table {
    /// Creates an empty table with given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for name in columns {
            table.ensure_column(&name.into());
        }
        table
    }

    /// Creates a table from records. Columns are ordered by their first
    /// appearance.
    pub fn from_records<I, R, S>(records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for record in records {
            table.push_record(record);
        }
        table
    }

    /// Creates a table from a matrix with one row per observation.
    pub fn from_matrix(columns: &[String], values: &DMatrix<f64>) -> Self {
        assert_eq!(columns.len(), values.ncols(), "column count mismatch");

        let rows = values
            .row_iter()
            .map(|row| row.iter().copied().map(Some).collect())
            .collect();

        Self {
            columns: columns.to_vec(),
            rows,
        }
    }

    /// Appends a row given as pairs of column name and value. Columns not
    /// present in the table are added, cells of columns not mentioned are
    /// missing.
    pub fn push_record<R, S>(&mut self, record: R)
    where
        R: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut row = vec![None; self.columns.len()];

        for (name, value) in record {
            let index = self.ensure_column(&name.into());
            if index >= row.len() {
                row.resize(index + 1, None);
            }
            row[index] = Some(value);
        }

        self.rows.push(row);
    }

    /// Appends all rows of another table. The resulting columns are the union
    /// of both tables' columns.
    pub fn append(&mut self, other: &Table) {
        let mapping = other
            .columns
            .iter()
            .map(|name| self.ensure_column(name))
            .collect::<Vec<_>>();

        let width = self.columns.len();
        for row in other.rows.iter() {
            let mut new_row = vec![None; width];
            for (value, &index) in row.iter().zip(mapping.iter()) {
                new_row[index] = *value;
            }
            self.rows.push(new_row);
        }
    }

    fn ensure_column(&mut self, name: &str) -> usize {
        match self.column_index(name) {
            Some(index) => index,
            None => {
                self.columns.push(name.to_string());
                for row in self.rows.iter_mut() {
                    row.push(None);
                }
                self.columns.len() - 1
            }
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in their order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Index of the column with given name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Whether a column with given name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Value of a cell. Returns `None` for unknown column, row out of range or
    /// missing cell.
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let index = self.column_index(name)?;
        self.rows.get(row).and_then(|row| row[index])
    }

    /// All cells of a column.
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }

    /// Row as a record, missing cells omitted.
    pub fn record(&self, row: usize) -> Option<Record> {
        self.rows.get(row).map(|row| {
            self.columns
                .iter()
                .zip(row.iter())
                .filter_map(|(name, value)| value.map(|value| (name.clone(), value)))
                .collect()
        })
    }

    /// Iterates over the rows as records.
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        (0..self.len()).filter_map(move |row| self.record(row))
    }

    /// Values of the given columns in the last row.
    ///
    /// Fails if the table is empty, a column is absent or the cell is missing.
    pub fn last_values(&self, names: &[String]) -> Result<Vec<f64>, Error> {
        let last = self
            .len()
            .checked_sub(1)
            .ok_or_else(|| Error::InvalidData("table is empty".to_string()))?;

        names
            .iter()
            .map(|name| {
                self.value(last, name).ok_or_else(|| {
                    Error::InvalidData(format!("last row has no value for `{}`", name))
                })
            })
            .collect()
    }

    /// Checks that all given columns exist.
    pub fn require_columns(&self, names: &[String]) -> Result<(), Error> {
        match names.iter().find(|name| !self.has_column(name)) {
            Some(name) => Err(Error::InvalidData(format!("missing column `{}`", name))),
            None => Ok(()),
        }
    }

    /// Indices of rows that have a finite value in all given columns. NaN and
    /// infinite cells count as missing.
    pub fn complete_rows(&self, names: &[String]) -> Vec<usize> {
        let indices = names
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Option<Vec<_>>>();

        match indices {
            Some(indices) => (0..self.len())
                .filter(|&row| {
                    indices
                        .iter()
                        .all(|&index| self.rows[row][index].map_or(false, f64::is_finite))
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Extracts given rows and columns (in the requested order) into a matrix.
    ///
    /// Fails if some cell is missing or a column is absent.
    pub fn matrix(&self, rows: &[usize], names: &[String]) -> Result<DMatrix<f64>, Error> {
        self.require_columns(names)?;

        let mut m = DMatrix::zeros(rows.len(), names.len());
        for (j, name) in names.iter().enumerate() {
            for (i, &row) in rows.iter().enumerate() {
                m[(i, j)] = self.value(row, name).ok_or_else(|| {
                    Error::InvalidData(format!("missing value of `{}` in row {}", name, row))
                })?;
            }
        }

        Ok(m)
    }

    /// Returns a table with only the given columns. Absent columns are
    /// created with missing cells.
    pub fn select(&self, names: &[String]) -> Table {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                names
                    .iter()
                    .map(|name| self.column_index(name).and_then(|index| row[index]))
                    .collect()
            })
            .collect();

        Table {
            columns: names.to_vec(),
            rows,
        }
    }
}
