//! Core abstractions and types.
//!
//! *Users* are mainly interested in describing their problem with [`Vocs`],
//! exchanging observations through [`Table`] and driving any of the
//! [generators](crate::generators) through the [`Generator`] trait.
//!
//! Algorithm *developers* implement the [`Generator`] trait and use the
//! [`Domain`] helpers for sampling and projecting candidates.

mod data;
mod domain;
mod error;
mod generator;
mod vocs;

pub use data::*;
pub use domain::*;
pub use error::*;
pub use generator::*;
pub use vocs::*;
