// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::processing::{ErrorRecord, ProcessingId};
use crate::store::ModelHash;

#[derive(Error, Debug)]
pub enum KbflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid step definition: {0}")]
    Definition(String),

    #[error("Cycle detected in step graph: {0}")]
    DagCycle(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Processing not found: {0}")]
    ProcessingNotFound(ProcessingId),

    #[error("Project '{0}' already has an execution in progress")]
    ProjectBusy(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Cannot instantiate processor '{processor}' for step '{step}': {message}")]
    Instantiation {
        step: String,
        processor: String,
        message: String,
    },

    #[error("Processor of step '{step}' failed")]
    Compute {
        step: String,
        #[source]
        cause: ErrorRecord,
    },

    #[error("Upstream step '{upstream}' of step '{step}' failed")]
    UpstreamFailed {
        step: String,
        upstream: String,
        #[source]
        cause: ErrorRecord,
    },

    #[error("Timed out waiting for upstream step '{upstream}' of step '{step}'")]
    UpstreamTimeout { step: String, upstream: String },

    #[error("Cannot record processing of step '{step}'")]
    Persistence {
        step: String,
        #[source]
        cause: ErrorRecord,
    },

    #[error("Pipeline construction failed")]
    Construction(#[source] ErrorRecord),

    #[error("Processing {0} has not succeeded")]
    NotSucceeded(ProcessingId),

    #[error("Model not found in store: {0}")]
    ModelNotFound(ModelHash),

    #[error("N-Triples parsing error: {0}")]
    ModelParse(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, KbflowError>;
