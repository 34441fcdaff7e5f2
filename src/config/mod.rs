// src/config/mod.rs

pub mod loader;
pub mod model;
pub mod validate;

pub use model::{ConfigFile, ExecutionSection, ProjectSection, RawConfigFile, StepConfig, StoreSection};
