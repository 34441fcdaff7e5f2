// src/model/vocab.rs

//! IRIs used by the built-in processors for meta-model statements.

use oxrdf::NamedNodeRef;

/// `a correspondsTo b`: both resources describe the same entity.
pub const CORRESPONDS_TO: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("urn:kbflow:vocab#correspondsTo");

/// `a correspondsNotTo b`: the resources are known to be different entities.
pub const CORRESPONDS_NOT_TO: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("urn:kbflow:vocab#correspondsNotTo");

/// Subject of statistics emitted by meta processors.
pub const PIPELINE_SUMMARY: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("urn:kbflow:vocab#pipelineSummary");

pub const CORRESPONDENCE_COUNT: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("urn:kbflow:vocab#correspondenceCount");
