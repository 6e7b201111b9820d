//! The [`GraphStore`] trait: the whole-graph surface callers use.
//!
//! Two-layer API design:
//! - **Contract operations** on [`SqliteStore`](crate::sqlite::SqliteStore)
//!   (`graph_id`, `save_node`, `save_triple`, `load_triples`, ...) each do one
//!   step against an explicit [`Session`](crate::session::Session).
//! - **Facade operations** here open and close their own session, combine
//!   contract operations, and wrap any failure in
//!   [`StorageError::Operation`] after rolling back.
//!
//! Graphs are addressed by optional URI; `None` is the default graph.

use trestle_core::{Graph, Triple, TripleSink};

use crate::error::StorageError;

/// Load/save/update/delete of whole graphs.
///
/// Methods take `&self`: implementations are shared between threads.
pub trait GraphStore {
    /// Loads a graph. Returns `None` if no graph has that URI.
    fn load_graph(&self, uri: Option<&str>) -> Result<Option<Graph>, StorageError>;

    /// Streams a graph's namespaces and triples into `sink`.
    ///
    /// Returns `false` (and leaves `sink` untouched) if the graph does not
    /// exist.
    fn load_graph_into(
        &self,
        uri: Option<&str>,
        sink: &mut dyn TripleSink,
    ) -> Result<bool, StorageError>;

    /// Replaces the stored graph with `graph`, creating it if needed.
    ///
    /// Returns once every triple has been written.
    fn save_graph(&self, graph: &Graph) -> Result<(), StorageError>;

    /// Applies `removals`, then `additions`, to a graph (created if missing).
    fn update_graph(
        &self,
        uri: Option<&str>,
        additions: &[Triple],
        removals: &[Triple],
    ) -> Result<(), StorageError>;

    /// Deletes a graph's links, namespaces and record. A missing graph is a
    /// no-op.
    fn delete_graph(&self, uri: Option<&str>) -> Result<(), StorageError>;

    /// URIs of every stored graph; `None` for the default graph.
    fn list_graphs(&self) -> Result<Vec<Option<String>>, StorageError>;
}
