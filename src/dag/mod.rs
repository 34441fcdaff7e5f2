// src/dag/mod.rs

//! Pipeline definition.
//!
//! - [`step`] holds the [`Step`] node type and its shape validation.
//! - [`graph`] holds the per-project [`StepGraph`] used for ordering,
//!   cascades and lineage.

pub mod graph;
pub mod step;

pub use graph::StepGraph;
pub use step::{Step, StepDefinition};
