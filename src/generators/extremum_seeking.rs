//! Extremum seeking control.
//!
//! A model-free algorithm that dithers the variables sinusoidally around the
//! current point. The phase of the dither is shifted by the observed objective
//! value, so that on average the point drifts towards the minimum of the
//! objective. Variables are paired: variables `2k` and `2k + 1` share a
//! frequency and are driven by cosine and sine respectively, tracing a
//! two-dimensional Lissajous-like figure.
//!
//! All computations happen in the normalized space `[-1, 1]ⁿ` of the variable
//! bounds. Every step is clamped to this box, so the candidates never leave
//! the bounds.
//!
//! The algorithm must be stepped serially: every call to
//! [`generate`](Generator::generate) produces exactly one point from the most
//! recent observation. The very first point is the center of the bounds.
//!
//! # References
//!
//! \[1\] [Bounded extremum seeking with discontinuous dithers for
//! tuning](https://doi.org/10.1016/j.automatica.2016.02.023)

use std::f64::consts::PI;

use getset::CopyGetters;
use log::{debug, trace};
use nalgebra::{DMatrix, DVector};

use crate::core::{append_observations, Error, Generator, Table, Vocs};
use crate::options::{check_finite, check_positive, ValidationError};

/// Options for [`ExtremumSeekingGenerator`].
#[derive(Debug, Clone, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct ExtremumSeekingOptions {
    /// Feedback gain of the objective value in the dither phase. Default:
    /// `2.0`.
    k: f64,
    /// Size of the dither in the normalized space. Default: `0.1`.
    oscillation_size: f64,
    /// Geometric decay of the dither amplitude per step. Default: `1.0` (no
    /// decay).
    decay_rate: f64,
}

impl Default for ExtremumSeekingOptions {
    fn default() -> Self {
        Self {
            k: 2.0,
            oscillation_size: 0.1,
            decay_rate: 1.0,
        }
    }
}

impl ExtremumSeekingOptions {
    /// Sets the feedback gain.
    pub fn set_k(&mut self, value: f64) -> Result<&mut Self, ValidationError> {
        self.k = check_finite("k", value)?;
        Ok(self)
    }

    /// Sets the dither size.
    pub fn set_oscillation_size(&mut self, value: f64) -> Result<&mut Self, ValidationError> {
        self.oscillation_size = check_positive("oscillation_size", value)?;
        Ok(self)
    }

    /// Sets the amplitude decay rate.
    pub fn set_decay_rate(&mut self, value: f64) -> Result<&mut Self, ValidationError> {
        self.decay_rate = check_decay_rate(value)?;
        Ok(self)
    }

    /// Validates all fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_finite("k", self.k)?;
        check_positive("oscillation_size", self.oscillation_size)?;
        check_decay_rate(self.decay_rate)?;
        Ok(())
    }
}

fn check_decay_rate(value: f64) -> Result<f64, ValidationError> {
    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field: "decay_rate",
            expected: "in (0, 1]",
            value,
        })
    }
}

/// Extremum seeking generator. See [module](self) documentation for more
/// details.
pub struct ExtremumSeekingGenerator {
    vocs: Vocs,
    options: ExtremumSeekingOptions,
    data: Table,
    frequencies: Vec<f64>,
    dt: f64,
    amplitudes: Vec<f64>,
    center: DVector<f64>,
    half_range: DVector<f64>,
}

/// `n` evenly spaced values from `start` to `end` inclusive.
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..n)
            .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

impl ExtremumSeekingGenerator {
    /// Initializes the generator with default options.
    pub fn new(vocs: Vocs) -> Result<Self, Error> {
        Self::with_options(vocs, ExtremumSeekingOptions::default())
    }

    /// Initializes the generator with given options.
    pub fn with_options(vocs: Vocs, options: ExtremumSeekingOptions) -> Result<Self, Error> {
        options.validate()?;

        if vocs.n_objectives() != 1 {
            return Err(Error::configuration(format!(
                "extremum seeking requires exactly one objective, got {}",
                vocs.n_objectives()
            )));
        }

        let n = vocs.n_variables();
        let frequencies = linspace(1.0, 1.75, (n + 1) / 2);
        let max_frequency = frequencies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let dt = 2.0 * PI / (10.0 * max_frequency);
        let amplitudes = (0..n)
            .map(|j| frequencies[j / 2] * options.oscillation_size.powi(2))
            .collect();

        let bounds = vocs.bounds();
        let center = bounds.center();
        let half_range = bounds.range() / 2.0;

        Ok(Self {
            vocs,
            options,
            data: Table::default(),
            frequencies,
            dt,
            amplitudes,
            center,
            half_range,
        })
    }

    /// Dither frequency of each pair of variables.
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Time step of the dither.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Dither amplitude of each variable.
    pub fn amplitudes(&self) -> &[f64] {
        &self.amplitudes
    }

    fn normalize(&self, p: &DVector<f64>) -> DVector<f64> {
        (p - &self.center).component_div(&self.half_range)
    }

    fn unnormalize(&self, p: &DVector<f64>) -> DVector<f64> {
        p.component_mul(&self.half_range) + &self.center
    }

    /// Computes the next point from the most recent observation.
    fn step(&self) -> Result<DVector<f64>, Error> {
        let last = self.data.last_values(self.vocs.variable_names())?;
        let cost = self.data.last_values(&self.vocs.objective_names())?[0];

        let p = self.normalize(&DVector::from_vec(last));
        let i = self.data.len() - 1;
        let decay = self.options.decay_rate.powi(i as i32);
        let t = self.dt * i as f64;
        let phase_shift = self.options.k * cost;

        trace!("step {}: amplitude {}, cost {}", i, decay, cost);

        let next = DVector::from_iterator(
            p.len(),
            p.iter().enumerate().map(|(j, pj)| {
                let w = self.frequencies[j / 2];
                let phase = t * w + phase_shift;
                let dither = if j % 2 == 0 { phase.cos() } else { phase.sin() };

                let pj = pj + decay * self.dt * dither * (self.amplitudes[j] * w).sqrt();
                pj.clamp(-1.0, 1.0)
            }),
        );

        Ok(self.unnormalize(&next))
    }
}

impl Generator for ExtremumSeekingGenerator {
    const NAME: &'static str = "extremum_seeking";
    type Options = ExtremumSeekingOptions;

    fn default_options() -> Self::Options {
        ExtremumSeekingOptions::default()
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
        if n_candidates != 1 {
            return Err(Error::UnsupportedBatchSize {
                generator: Self::NAME,
                requested: n_candidates,
            });
        }

        let x = if self.data.is_empty() {
            debug!("no observations, starting from the center");
            self.center.clone_owned()
        } else {
            self.step()?
        };

        Ok(self
            .vocs
            .inputs_from_matrix(&DMatrix::from_row_slice(1, x.len(), x.as_slice())))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::core::ObjectiveDirection;
    use crate::testing::{run, Sphere, TestFunction};

    fn vocs(n: usize) -> Vocs {
        (0..n)
            .fold(Vocs::builder(), |builder, i| {
                builder.variable(format!("p{}", i), -1.0 - i as f64, 3.0 + 2.0 * i as f64)
            })
            .objective("f", ObjectiveDirection::Minimize)
            .build()
            .unwrap()
    }

    #[test]
    fn first_point_is_center() {
        let vocs = vocs(3);
        let mut generator = ExtremumSeekingGenerator::new(vocs.clone()).unwrap();

        let candidates = generator.generate(1).unwrap();
        let record = candidates.record(0).unwrap();

        assert_eq!(record["p0"], 1.0);
        assert_eq!(record["p1"], 1.5);
        assert_eq!(record["p2"], 2.0);
    }

    #[test]
    fn serial_only() {
        let mut generator = ExtremumSeekingGenerator::new(vocs(2)).unwrap();

        assert!(matches!(
            generator.generate(2),
            Err(Error::UnsupportedBatchSize { requested: 2, .. })
        ));
        assert!(matches!(
            generator.generate(0),
            Err(Error::UnsupportedBatchSize { requested: 0, .. })
        ));
    }

    #[test]
    fn frequencies_are_paired() {
        let generator = ExtremumSeekingGenerator::new(vocs(5)).unwrap();

        assert_eq!(generator.frequencies().len(), 3);
        assert_relative_eq!(generator.frequencies()[0], 1.0);
        assert_relative_eq!(generator.frequencies()[1], 1.375);
        assert_relative_eq!(generator.frequencies()[2], 1.75);
        assert_relative_eq!(generator.dt(), 2.0 * PI / 17.5);

        let a = generator.amplitudes();
        assert_relative_eq!(a[0], 0.01);
        assert_relative_eq!(a[1], a[0]);
        assert_relative_eq!(a[2], 1.375 * 0.01);
        assert_relative_eq!(a[4], 1.75 * 0.01);
    }

    #[test]
    fn single_step() {
        let vocs = Vocs::builder()
            .variable("x", 0.0, 2.0)
            .variable("y", 0.0, 4.0)
            .objective("f", ObjectiveDirection::Maximize)
            .build()
            .unwrap();
        let mut generator = ExtremumSeekingGenerator::new(vocs).unwrap();

        generator
            .add_data(&Table::from_records(vec![vec![
                ("x", 1.5),
                ("y", 2.0),
                ("f", 0.5),
            ]]))
            .unwrap();

        let record = generator.generate(1).unwrap().record(0).unwrap();

        // Step 0: no decay, time zero, phase k * f = 1.
        let dt = 2.0 * PI / 10.0;
        let step = dt * (0.01f64).sqrt();
        assert_relative_eq!(record["x"], (0.5 + step * 1.0f64.cos()) * 1.0 + 1.0);
        assert_relative_eq!(record["y"], (0.0 + step * 1.0f64.sin()) * 2.0 + 2.0);
    }

    #[test]
    fn decaying_amplitude() {
        let vocs = Vocs::builder()
            .variable("x", -1.0, 1.0)
            .objective("f", ObjectiveDirection::Minimize)
            .build()
            .unwrap();

        let mut options = ExtremumSeekingOptions::default();
        options.set_decay_rate(0.5).unwrap().set_k(0.0).unwrap();
        let mut generator = ExtremumSeekingGenerator::with_options(vocs, options).unwrap();

        generator
            .add_data(&Table::from_records(vec![
                vec![("x", 0.0), ("f", 1.0)],
                vec![("x", 0.0), ("f", 1.0)],
            ]))
            .unwrap();

        // Step 1: amplitude 0.5, phase dt.
        let dt = 2.0 * PI / 10.0;
        let expected = 0.5 * dt * dt.cos() * 0.1;
        let record = generator.generate(1).unwrap().record(0).unwrap();
        assert_relative_eq!(record["x"], expected, epsilon = 1e-12);
    }

    #[test]
    fn stays_within_bounds() {
        let f = Sphere::new(3);
        let mut options = ExtremumSeekingOptions::default();
        options.set_oscillation_size(5.0).unwrap().set_k(10.0).unwrap();

        let mut generator = ExtremumSeekingGenerator::with_options(f.vocs(), options).unwrap();
        run(&mut generator, &f, 200, 1).unwrap();

        let bounds = generator.vocs().bounds();
        for record in generator.data().records() {
            let x = DVector::from_vec(vec![record["x1"], record["x2"], record["x3"]]);
            assert!(bounds.contains(&x));
        }
    }

    #[test]
    fn requires_objective_value() {
        let mut generator = ExtremumSeekingGenerator::new(vocs(1)).unwrap();
        generator
            .add_data(&Table::from_records(vec![vec![("p0", 0.5)]]))
            .unwrap();

        assert!(matches!(generator.generate(1), Err(Error::InvalidData(_))));
    }

    #[test]
    fn rejects_invalid_configuration() {
        let vocs = Vocs::builder()
            .variable("x", 0.0, 1.0)
            .objective("f1", ObjectiveDirection::Minimize)
            .objective("f2", ObjectiveDirection::Minimize)
            .build()
            .unwrap();
        assert!(matches!(
            ExtremumSeekingGenerator::new(vocs),
            Err(Error::Configuration(_))
        ));

        let mut options = ExtremumSeekingOptions::default();
        assert!(options.set_oscillation_size(0.0).is_err());
        assert!(options.set_decay_rate(1.5).is_err());
        assert!(options.set_decay_rate(0.0).is_err());
        assert_eq!(options, ExtremumSeekingOptions::default());
    }
}
