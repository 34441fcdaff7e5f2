// src/processor/mod.rs

//! Processor bodies, their registry, and the runtime that executes them.
//!
//! - [`body`] defines the [`ProcessorBody`] trait plus the role-specific
//!   propagation rules ([`Exposure::of`]) and input merging
//!   ([`ProcessorInput::freeze`]).
//! - [`registry`] maps processor names to roles and factories.
//! - [`runtime`] holds the state machine driving one processing.
//! - [`builtin`] provides the stock processors.

pub mod body;
pub mod builtin;
pub mod registry;
pub mod runtime;

pub use body::{Exposure, ProcessorBody, ProcessorInput};
pub use registry::{ProcessorFactory, ProcessorRegistry};
pub use runtime::{ProcessorRuntime, RunReport, RuntimeHandle, RuntimeState, Upstream};
