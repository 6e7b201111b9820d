//! Graph: a named or default collection of triples plus namespace bindings.
//!
//! A [`Graph`] is identified by an optional URI; `None` is the default graph.
//! Triples are held in an insertion-ordered set so iteration order is stable
//! and duplicate assertions are absorbed. Loaders stream into any
//! [`TripleSink`], of which `Graph` is the canonical implementation.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::triple::Triple;

/// Receiver for namespace bindings and triples produced by a loader.
pub trait TripleSink {
    /// Records a prefix → namespace URI binding.
    fn add_namespace(&mut self, prefix: &str, uri: &str);

    /// Records a triple.
    fn add_triple(&mut self, triple: Triple);
}

/// Prefix → namespace URI bindings in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMap {
    bindings: IndexMap<String, String>,
}

impl NamespaceMap {
    pub fn new() -> Self {
        NamespaceMap::default()
    }

    /// Binds `prefix` to `uri`, replacing any previous binding.
    ///
    /// Returns the previous URI, if any.
    pub fn insert(&mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Option<String> {
        self.bindings.insert(prefix.into(), uri.into())
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }

    pub fn remove(&mut self, prefix: &str) -> Option<String> {
        self.bindings.shift_remove(prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// An RDF graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    uri: Option<String>,
    triples: IndexSet<Triple>,
    namespaces: NamespaceMap,
}

impl Graph {
    /// Creates an empty default graph.
    pub fn default_graph() -> Self {
        Graph::default()
    }

    /// Creates an empty named graph.
    ///
    /// Returns [`CoreError::InvalidGraphUri`] for an empty URI, since the
    /// empty string cannot be told apart from "no name" once persisted.
    pub fn named(uri: impl Into<String>) -> Result<Self, CoreError> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            return Err(CoreError::InvalidGraphUri { uri });
        }
        Ok(Graph {
            uri: Some(uri),
            ..Graph::default()
        })
    }

    /// Creates an empty graph from an optional name.
    pub fn with_uri(uri: Option<String>) -> Result<Self, CoreError> {
        match uri {
            Some(uri) => Graph::named(uri),
            None => Ok(Graph::default_graph()),
        }
    }

    /// The graph name; `None` for the default graph.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn is_default(&self) -> bool {
        self.uri.is_none()
    }

    /// Asserts a triple. Returns `false` if it was already present.
    pub fn assert(&mut self, triple: Triple) -> bool {
        self.triples.insert(triple)
    }

    /// Retracts a triple. Returns `false` if it was not present.
    pub fn retract(&mut self, triple: &Triple) -> bool {
        self.triples.shift_remove(triple)
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    pub fn triples(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    pub fn triple_count(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn namespaces(&self) -> &NamespaceMap {
        &self.namespaces
    }

    pub fn namespaces_mut(&mut self) -> &mut NamespaceMap {
        &mut self.namespaces
    }
}

impl TripleSink for Graph {
    fn add_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespaces.insert(prefix, uri);
    }

    fn add_triple(&mut self, triple: Triple) {
        self.triples.insert(triple);
    }
}

impl Extend<Triple> for Graph {
    fn extend<I: IntoIterator<Item = Triple>>(&mut self, iter: I) {
        self.triples.extend(iter);
    }
}
