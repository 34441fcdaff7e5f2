// src/processor/builtin/mod.rs

pub mod mapping;
pub mod meta;
pub mod source;
pub mod transformation;

use std::sync::Arc;

use anyhow::Context;
use serde::de::DeserializeOwned;

use crate::processor::{ProcessorBody, ProcessorRegistry};
use crate::types::Role;

pub use mapping::{EquivalentValue, ManualMapping};
pub use meta::CorrespondenceCount;
pub use source::{NTriplesFile, NTriplesInline};
pub use transformation::PropertyAlias;

pub(crate) fn register_all(registry: &mut ProcessorRegistry) {
    registry.register(NTriplesFile::NAME, Role::Source, |params| {
        Ok(Arc::new(NTriplesFile::new(parse_params(params)?)) as Arc<dyn ProcessorBody>)
    });
    registry.register(NTriplesInline::NAME, Role::Source, |params| {
        Ok(Arc::new(NTriplesInline::new(parse_params(params)?)?) as Arc<dyn ProcessorBody>)
    });
    registry.register(PropertyAlias::NAME, Role::Transformation, |params| {
        Ok(Arc::new(PropertyAlias::new(parse_params(params)?)?) as Arc<dyn ProcessorBody>)
    });
    registry.register(EquivalentValue::NAME, Role::Mapping, |params| {
        Ok(Arc::new(EquivalentValue::new(parse_params(params)?)?) as Arc<dyn ProcessorBody>)
    });
    registry.register(ManualMapping::NAME, Role::Mapping, |params| {
        Ok(Arc::new(ManualMapping::new(parse_params(params)?)?) as Arc<dyn ProcessorBody>)
    });
    registry.register(CorrespondenceCount::NAME, Role::Meta, |_| {
        Ok(Arc::new(CorrespondenceCount) as Arc<dyn ProcessorBody>)
    });
}

fn parse_params<T: DeserializeOwned>(params: &serde_json::Value) -> anyhow::Result<T> {
    serde_json::from_value(params.clone()).context("invalid processor parameters")
}
