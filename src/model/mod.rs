// src/model/mod.rs

//! Immutable RDF graph values exchanged between processors.
//!
//! A [`Model`] wraps an [`oxrdf::Graph`] behind an `Arc`, so cloning is
//! cheap and the store can hand out the same graph to many readers.

pub mod vocab;

use std::fmt;
use std::sync::Arc;

use oxrdf::dataset::CanonicalizationAlgorithm;
use oxrdf::{Graph, Triple, TripleRef};
use oxttl::NTriplesParser;

use crate::errors::{KbflowError, Result};

#[derive(Clone, Default)]
pub struct Model {
    graph: Arc<Graph>,
}

impl Model {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_graph(graph: Graph) -> Self {
        Self {
            graph: Arc::new(graph),
        }
    }

    pub fn from_triples<I>(triples: I) -> Self
    where
        I: IntoIterator<Item = Triple>,
    {
        let mut graph = Graph::new();
        for triple in triples {
            graph.insert(&triple);
        }
        Self::from_graph(graph)
    }

    pub(crate) fn from_shared(graph: Arc<Graph>) -> Self {
        Self { graph }
    }

    pub(crate) fn shared(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn contains<'a>(&self, triple: impl Into<TripleRef<'a>>) -> bool {
        self.graph.contains(triple)
    }

    pub fn iter(&self) -> impl Iterator<Item = TripleRef<'_>> {
        self.graph.iter()
    }

    /// Set union of several models.
    ///
    /// Empty inputs are skipped; when only one non-empty model remains its
    /// graph is shared instead of copied.
    pub fn union<'a, I>(models: I) -> Model
    where
        I: IntoIterator<Item = &'a Model>,
    {
        let non_empty: Vec<&Model> = models.into_iter().filter(|m| !m.is_empty()).collect();
        match non_empty.as_slice() {
            [] => Model::empty(),
            [single] => (*single).clone(),
            many => {
                let mut graph = Graph::new();
                for model in many {
                    for triple in model.iter() {
                        graph.insert(triple);
                    }
                }
                Model::from_graph(graph)
            }
        }
    }

    /// Deterministic N-Triples serialization.
    ///
    /// Blank nodes are relabelled canonically and lines are sorted, so two
    /// equal graphs always yield the same bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut graph = (*self.graph).clone();
        graph.canonicalize(CanonicalizationAlgorithm::Unstable);

        let mut lines: Vec<String> = graph.iter().map(|t| format!("{t} .\n")).collect();
        lines.sort_unstable();
        lines.concat().into_bytes()
    }

    /// Parse an N-Triples document.
    pub fn parse_ntriples(bytes: &[u8]) -> Result<Model> {
        let mut graph = Graph::new();
        for triple in NTriplesParser::new().for_reader(bytes) {
            let triple = triple.map_err(|e| KbflowError::ModelParse(e.to_string()))?;
            graph.insert(&triple);
        }
        Ok(Model::from_graph(graph))
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph)
            || (self.len() == other.len() && self.canonical_bytes() == other.canonical_bytes())
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("triples", &self.graph.len())
            .finish()
    }
}

impl FromIterator<Triple> for Model {
    fn from_iter<T: IntoIterator<Item = Triple>>(iter: T) -> Self {
        Model::from_triples(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{BlankNode, Literal, NamedNode};

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(
            NamedNode::new_unchecked(s),
            NamedNode::new_unchecked(p),
            Literal::new_simple_literal(o),
        )
    }

    #[test]
    fn union_is_a_set_union() {
        let a = Model::from_triples([triple("urn:a", "urn:p", "1"), triple("urn:b", "urn:p", "2")]);
        let b = Model::from_triples([triple("urn:b", "urn:p", "2"), triple("urn:c", "urn:p", "3")]);

        let merged = Model::union([&a, &b]);
        assert_eq!(merged.len(), 3);
        assert!(merged.contains(&triple("urn:c", "urn:p", "3")));
    }

    #[test]
    fn union_of_nothing_is_empty() {
        assert!(Model::union(std::iter::empty()).is_empty());
        assert!(Model::union([&Model::empty(), &Model::empty()]).is_empty());
    }

    #[test]
    fn canonical_bytes_ignore_blank_node_labels() {
        let p = NamedNode::new_unchecked("urn:p");
        let first = Model::from_triples([Triple::new(
            BlankNode::new_unchecked("x1"),
            p.clone(),
            Literal::new_simple_literal("v"),
        )]);
        let second = Model::from_triples([Triple::new(
            BlankNode::new_unchecked("other"),
            p,
            Literal::new_simple_literal("v"),
        )]);

        assert_eq!(first.canonical_bytes(), second.canonical_bytes());
        assert_eq!(first, second);
    }

    #[test]
    fn canonical_bytes_parse_back() {
        let model = Model::from_triples([
            triple("urn:b", "urn:p", "with \"quotes\""),
            triple("urn:a", "urn:p", "plain"),
        ]);
        let parsed = Model::parse_ntriples(&model.canonical_bytes()).unwrap();
        assert_eq!(parsed, model);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = Model::parse_ntriples(b"<urn:a> <urn:p> .\n").unwrap_err();
        assert!(matches!(err, KbflowError::ModelParse(_)));
    }
}
