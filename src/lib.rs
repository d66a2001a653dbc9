#![allow(clippy::many_single_char_names)]
#![allow(clippy::type_complexity)]
#![warn(missing_docs)]

//! # Seqopt
//!
//! A pure Rust framework of generators for sequential black-box optimization.
//!
//! A black-box objective is expensive to evaluate (an experiment, a particle
//! accelerator, a long simulation) and offers nothing but its outputs. The
//! optimization thus proceeds in steps: a generator proposes new input points
//! given all observations so far, the caller evaluates them, and hands the
//! results back. All generators implement the same [`Generator`] interface,
//! which makes them interchangeable in the loop driving the evaluations.
//!
//! ## Generators
//!
//! * [Upper confidence bound](generators::upper_confidence_bound) --
//!   Bayesian optimization of a single objective with Gaussian process
//!   models. Recommended default for expensive problems. Supports a
//!   time-dependent variant tracking drifting objectives.
//! * [MGGPO](generators::mggpo) -- Multi-objective Bayesian optimization
//!   maximizing the expected hypervolume improvement of candidates proposed by
//!   a genetic algorithm.
//! * [Extremum seeking](generators::extremum_seeking) -- Model-free serial
//!   tuning by bounded sinusoidal dithering. Useful for tracking a slowly
//!   moving optimum of a noisy system.
//! * [CNSGA](generators::cnsga) -- Constrained non-dominated sorting genetic
//!   algorithm.
//! * [Random](generators::random) -- Uniform sampling of the bounds.
//!
//! ## Problem
//!
//! The problem is described by [`Vocs`], which names the *v*ariables with
//! their bounds, the *o*bjectives with their directions, the *c*onstraints
//! with their thresholds and the *s*tatic constants passed along with every
//! point.
//!
//! ```rust
//! use seqopt::{ConstraintRelation, ObjectiveDirection, Vocs};
//!
//! let vocs = Vocs::builder()
//!     .variable("x1", 0.0, 1.0)
//!     .variable("x2", 0.0, 10.0)
//!     .objective("y1", ObjectiveDirection::Minimize)
//!     .constraint("c1", ConstraintRelation::GreaterThan, 0.5)
//!     .constant("constant1", 1.0)
//!     .build()
//!     .expect("invalid problem definition");
//!
//! assert_eq!(vocs.n_variables(), 2);
//! ```
//!
//! ## Optimizing
//!
//! Observations are exchanged through [`Table`], a column-oriented table of
//! named values. Candidates returned by generators contain the variables and
//! constants; observations handed back additionally contain the objectives
//! and constraints.
//!
//! ```rust
//! use seqopt::generators::ExtremumSeekingGenerator;
//! use seqopt::{Generator, ObjectiveDirection, Table, Vocs};
//!
//! let vocs = Vocs::builder()
//!     .variable("x", -1.0, 1.0)
//!     .objective("f", ObjectiveDirection::Minimize)
//!     .build()
//!     .expect("invalid problem definition");
//!
//! let mut generator = ExtremumSeekingGenerator::new(vocs).expect("invalid options");
//!
//! for _ in 0..100 {
//!     let candidates = generator.generate(1).expect("generator encountered an error");
//!
//!     let observations = Table::from_records(candidates.records().map(|mut record| {
//!         let x = record["x"];
//!         record.insert("f".to_string(), (x - 0.2).powi(2));
//!         record
//!     }));
//!
//!     generator.add_data(&observations).expect("invalid observations");
//! }
//!
//! assert_eq!(generator.data().len(), 100);
//! ```
//!
//! ## License
//!
//! Licensed under MIT.

pub mod acquisition;
mod core;
pub mod generators;
pub mod model;
pub mod optimize;
pub mod options;

pub use crate::core::*;

#[cfg(feature = "testing")]
pub mod testing;

#[cfg(not(feature = "testing"))]
pub(crate) mod testing;

pub use nalgebra;
