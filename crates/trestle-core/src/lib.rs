//! RDF data model for trestle.
//!
//! Terms ([`Node`]), statements ([`Triple`]) and graphs ([`Graph`]) with
//! content fingerprints used by the storage layer for identifier assignment.

pub mod error;
pub mod graph;
pub mod hash;
pub mod node;
pub mod triple;

// Re-export commonly used types
pub use error::CoreError;
pub use graph::{Graph, NamespaceMap, TripleSink};
pub use hash::{fingerprint_str, hash_str, Fingerprint};
pub use node::{Literal, Node, NodeKind};
pub use triple::Triple;
