//! Relational persistence for trestle RDF graphs.
//!
//! Maps in-memory nodes and triples to stable row ids through content-hash
//! caches with an exact-value fallback on collision, and decouples callers'
//! triple writes from SQLite through one background batching worker.
//!
//! # Architecture
//!
//! The storage layer has a two-layer API:
//! - **Contract operations** on [`SqliteStore`] (`graph_id`, `save_node`,
//!   `save_triple`, `load_triples`, ...) each perform one step on an explicit
//!   [`Session`].
//! - **Facade operations** from [`GraphStore`] (`load_graph`, `save_graph`,
//!   `update_graph`, `delete_graph`, `list_graphs`) manage their own session.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: row ids, node type tags, buffered writes, store stats
//! - [`config`]: StoreConfig and its `TRESTLE_*` environment variables
//! - [`codec`]: node ↔ column value encoding
//! - [`cache`]: hash → id caches with collision handling
//! - [`session`]: connection and transaction state per calling context
//! - [`buffer`]: background write queue and worker
//! - [`schema`]: migrations and connection pragmas
//! - [`traits`]: GraphStore trait definition
//! - [`sqlite`]: SqliteStore implementation

pub mod buffer;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
mod lock;
pub mod schema;
pub mod session;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use buffer::{BatchSink, WriteBuffer};
pub use cache::{Authority, CacheEntry, IdCache, Identified, Resolution};
pub use config::StoreConfig;
pub use error::StorageError;
pub use schema::DEFAULT_GRAPH_URI;
pub use session::{Connector, RollbackHook, Session, SessionState};
pub use sqlite::SqliteStore;
pub use traits::GraphStore;
pub use types::{BufferedWrite, GraphId, NodeId, NodeType, StoreStats, TripleId, WriteOp};
