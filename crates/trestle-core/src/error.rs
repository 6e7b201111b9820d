//! Core error types for trestle-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! the failure modes of the RDF data model.

use thiserror::Error;

/// Core errors produced by the trestle-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Text could not be parsed as an RDF term.
    #[error("invalid term '{input}': {reason}")]
    InvalidTerm { input: String, reason: String },

    /// A graph name that cannot identify a graph.
    #[error("invalid graph URI: '{uri}'")]
    InvalidGraphUri { uri: String },
}
