//! SQLite implementation of [`GraphStore`].
//!
//! [`SqliteStore`] keeps nodes, triples and graph membership in separate
//! tables. Node and triple ids come from the [`IdCache`]s rather than from
//! SQLite, so a triple can be linked without a read-back. Triple writes go
//! through the background [`WriteBuffer`]; the worker applies each batch in
//! one transaction.
//!
//! # Locking
//!
//! A session takes the SQLite write lock (`BEGIN IMMEDIATE`) before it
//! touches any cache, and the triple cache is always locked before the node
//! cache. Facade operations commit their own session before waiting on the
//! worker, which needs the write lock to make progress.
//!
//! Ids enter the caches before the row that backs them commits. Every session
//! the store hands out therefore invalidates the caches when it rolls back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use rusqlite::{params, Connection, OptionalExtension};

use trestle_core::{hash_str, CoreError, Graph, Node, Triple, TripleSink};

use crate::buffer::{BatchSink, WriteBuffer};
use crate::cache::{Authority, CacheEntry, IdCache};
use crate::codec;
use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::lock::acquire_lock;
use crate::schema::DEFAULT_GRAPH_URI;
use crate::session::{Connector, RollbackHook, Session};
use crate::traits::GraphStore;
use crate::types::{BufferedWrite, GraphId, NodeId, NodeType, StoreStats, TripleId, WriteOp};

/// SQLite-backed triple store.
///
/// `Send + Sync`; share it between threads with an `Arc`.
pub struct SqliteStore {
    inner: Arc<StoreInner>,
    writer: WriteBuffer,
}

/// State shared between callers and the background worker.
struct StoreInner {
    config: StoreConfig,
    connector: Connector,
    nodes: IdCache,
    triples: IdCache,
    /// Graph URI → id.
    graphs: Mutex<HashMap<String, GraphId>>,
}

// ---------------------------------------------------------------------------
// Authorities
// ---------------------------------------------------------------------------

struct NodeRows<'a> {
    conn: &'a Connection,
}

impl Authority<Node> for NodeRows<'_> {
    fn scan(&self) -> Result<Vec<(u32, i64)>, StorageError> {
        let mut stmt = self.conn.prepare_cached("SELECT node_hash, node_id FROM nodes")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)? as u32, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find(&self, node: &Node) -> Result<Option<i64>, StorageError> {
        let encoded = codec::encode(node);
        let id = self
            .conn
            .prepare_cached(
                "SELECT node_id FROM nodes WHERE node_type = ?1 AND node_value = ?2 AND node_hash = ?3",
            )?
            .query_row(
                params![
                    encoded.kind.as_i64(),
                    encoded.value,
                    i64::from(encoded.hash)
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }
}

struct TripleRows<'a> {
    conn: &'a Connection,
    nodes: &'a IdCache,
}

impl Authority<Triple> for TripleRows<'_> {
    fn scan(&self) -> Result<Vec<(u32, i64)>, StorageError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT triple_hash, triple_id FROM triples")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)? as u32, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find(&self, triple: &Triple) -> Result<Option<i64>, StorageError> {
        let node_rows = NodeRows { conn: self.conn };
        let mut ids = [0i64; 3];
        for (slot, node) in ids.iter_mut().zip(triple.nodes()) {
            match self.nodes.lookup(node, &node_rows)? {
                Some(id) => *slot = id,
                None => return Ok(None),
            }
        }
        let id = self
            .conn
            .prepare_cached(
                "SELECT triple_id FROM triples WHERE subject_id = ?1 AND predicate_id = ?2 AND object_id = ?3",
            )?
            .query_row(params![ids[0], ids[1], ids[2]], |row| row.get(0))
            .optional()?;
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Row-level operations
// ---------------------------------------------------------------------------

/// Maps an optional graph URI to the stored key.
fn graph_key(uri: Option<&str>) -> Result<&str, StorageError> {
    match uri {
        None => Ok(DEFAULT_GRAPH_URI),
        Some(uri) if uri.trim().is_empty() => Err(CoreError::InvalidGraphUri {
            uri: uri.to_string(),
        }
        .into()),
        Some(uri) => Ok(uri),
    }
}

fn graph_name(key: String) -> Option<String> {
    if key == DEFAULT_GRAPH_URI {
        None
    } else {
        Some(key)
    }
}

fn prefix_id(conn: &Connection, prefix: &str, create: bool) -> Result<Option<i64>, StorageError> {
    if create {
        conn.prepare_cached("INSERT OR IGNORE INTO ns_prefixes (prefix_text) VALUES (?1)")?
            .execute(params![prefix])?;
    }
    let id = conn
        .prepare_cached("SELECT prefix_id FROM ns_prefixes WHERE prefix_text = ?1")?
        .query_row(params![prefix], |row| row.get(0))
        .optional()?;
    Ok(id)
}

fn namespace_uri_id(conn: &Connection, uri: &str, create: bool) -> Result<Option<i64>, StorageError> {
    if create {
        conn.prepare_cached("INSERT OR IGNORE INTO ns_uris (uri_text, uri_hash) VALUES (?1, ?2)")?
            .execute(params![uri, i64::from(hash_str(uri))])?;
    }
    let id = conn
        .prepare_cached("SELECT uri_id FROM ns_uris WHERE uri_text = ?1")?
        .query_row(params![uri], |row| row.get(0))
        .optional()?;
    Ok(id)
}

fn count(conn: &Connection, table: &str) -> Result<u64, StorageError> {
    let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(n as u64)
}

impl StoreInner {
    fn invalidate_caches(&self) {
        self.triples.invalidate();
        self.nodes.invalidate();
        acquire_lock(&self.graphs).clear();
    }

    fn clear_caches(&self) {
        self.triples.clear();
        self.nodes.clear();
        acquire_lock(&self.graphs).clear();
    }

    /// Without transactions another writer may hold an id whose row it has
    /// not inserted yet, so direct writes assert every row they reference.
    fn direct(&self) -> bool {
        !self.connector.transactions()
    }

    /// Drops cached ids after a failed insert, since the id may now name a
    /// row that will never exist.
    fn discard_on_error<T>(&self, result: rusqlite::Result<T>) -> Result<T, StorageError> {
        result.map_err(|e| {
            self.invalidate_caches();
            StorageError::from(e)
        })
    }

    fn find_graph(&self, session: &Session, uri: Option<&str>) -> Result<Option<GraphId>, StorageError> {
        let key = graph_key(uri)?;
        if let Some(&id) = acquire_lock(&self.graphs).get(key) {
            return Ok(Some(id));
        }
        let id: Option<i64> = session
            .connection()?
            .prepare_cached("SELECT graph_id FROM graphs WHERE graph_uri = ?1")?
            .query_row(params![key], |row| row.get(0))
            .optional()?;
        let id = id.map(GraphId);
        if let Some(id) = id {
            acquire_lock(&self.graphs).insert(key.to_string(), id);
        }
        Ok(id)
    }

    fn graph_id(&self, session: &Session, uri: Option<&str>) -> Result<GraphId, StorageError> {
        if let Some(id) = self.find_graph(session, uri)? {
            return Ok(id);
        }
        let key = graph_key(uri)?;
        let conn = session.connection()?;
        conn.prepare_cached("INSERT INTO graphs (graph_uri, graph_hash) VALUES (?1, ?2)")?
            .execute(params![key, i64::from(hash_str(key))])?;
        let id = GraphId(conn.last_insert_rowid());
        acquire_lock(&self.graphs).insert(key.to_string(), id);
        tracing::debug!(graph = key, id = id.0, "graph created");
        Ok(id)
    }

    fn graph_uri(&self, session: &Session, graph: GraphId) -> Result<Option<String>, StorageError> {
        let key: Option<String> = session
            .connection()?
            .prepare_cached("SELECT graph_uri FROM graphs WHERE graph_id = ?1")?
            .query_row(params![graph.0], |row| row.get(0))
            .optional()?;
        match key {
            Some(key) => Ok(graph_name(key)),
            None => Err(StorageError::integrity(format!("no graph with id {}", graph.0))),
        }
    }

    fn list_graph_ids(&self, session: &Session) -> Result<Vec<GraphId>, StorageError> {
        let conn = session.connection()?;
        let mut stmt = conn.prepare_cached("SELECT graph_id FROM graphs ORDER BY graph_id")?;
        let ids = stmt
            .query_map([], |row| Ok(GraphId(row.get(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn load_namespaces(
        &self,
        session: &Session,
        graph: GraphId,
        sink: &mut dyn TripleSink,
    ) -> Result<(), StorageError> {
        let conn = session.connection()?;
        let mut stmt = conn.prepare_cached(
            "SELECT p.prefix_text, u.uri_text FROM namespaces n \
             JOIN ns_prefixes p ON p.prefix_id = n.prefix_id \
             JOIN ns_uris u ON u.uri_id = n.uri_id \
             WHERE n.graph_id = ?1 ORDER BY n.rowid",
        )?;
        let rows = stmt.query_map(params![graph.0], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (prefix, uri) = row?;
            sink.add_namespace(&prefix, &uri);
        }
        Ok(())
    }

    fn load_triples(
        &self,
        session: &Session,
        graph: GraphId,
        sink: &mut dyn TripleSink,
    ) -> Result<usize, StorageError> {
        let rows: Vec<(i64, i64, i64, i64)> = {
            let mut stmt = session.connection()?.prepare_cached(
                "SELECT t.triple_id, t.subject_id, t.predicate_id, t.object_id \
                 FROM graph_triples gt JOIN triples t ON t.triple_id = gt.triple_id \
                 WHERE gt.graph_id = ?1 ORDER BY gt.rowid",
            )?;
            let rows = stmt
                .query_map(params![graph.0], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        for &(triple_id, s, p, o) in &rows {
            let triple = Triple::new(
                self.load_node(session, NodeId(s))?,
                self.load_node(session, NodeId(p))?,
                self.load_node(session, NodeId(o))?,
            );
            self.triples.record(&triple, triple_id);
            sink.add_triple(triple);
        }
        Ok(rows.len())
    }

    fn load_node(&self, session: &Session, id: NodeId) -> Result<Node, StorageError> {
        let row: Option<(i64, String, i64)> = session
            .connection()?
            .prepare_cached("SELECT node_type, node_value, node_hash FROM nodes WHERE node_id = ?1")?
            .query_row(params![id.0], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()?;
        let (kind, value, hash) =
            row.ok_or_else(|| StorageError::integrity(format!("node {} is missing", id.0)))?;
        let kind = NodeType::from_i64(kind).ok_or_else(|| {
            StorageError::integrity(format!("node {} has unknown type {}", id.0, kind))
        })?;

        let node = codec::decode(kind, &value, hash as u32);
        self.nodes.record(&node, id.0);
        Ok(node)
    }

    fn save_node(&self, session: &Session, node: &Node) -> Result<NodeId, StorageError> {
        let conn = session.connection()?;
        let resolution = self.nodes.resolve(node, &NodeRows { conn })?;
        if resolution.created || self.direct() {
            let sql = if self.direct() {
                "INSERT OR IGNORE INTO nodes (node_id, node_type, node_value, node_hash) VALUES (?1, ?2, ?3, ?4)"
            } else {
                "INSERT INTO nodes (node_id, node_type, node_value, node_hash) VALUES (?1, ?2, ?3, ?4)"
            };
            let encoded = codec::encode(node);
            let inserted = conn.prepare_cached(sql).and_then(|mut stmt| {
                stmt.execute(params![
                    resolution.id,
                    encoded.kind.as_i64(),
                    encoded.value,
                    i64::from(encoded.hash)
                ])
            });
            self.discard_on_error(inserted)?;
        }
        Ok(NodeId(resolution.id))
    }

    fn save_triple_row(&self, session: &Session, triple: &Triple) -> Result<TripleId, StorageError> {
        let conn = session.connection()?;
        let resolution = self.triples.resolve(
            triple,
            &TripleRows {
                conn,
                nodes: &self.nodes,
            },
        )?;
        if resolution.created || self.direct() {
            let s = self.save_node(session, &triple.subject)?;
            let p = self.save_node(session, &triple.predicate)?;
            let o = self.save_node(session, &triple.object)?;
            let inserted = conn
                .prepare_cached(
                    "INSERT OR IGNORE INTO triples (triple_id, subject_id, predicate_id, object_id, triple_hash) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .and_then(|mut stmt| {
                    stmt.execute(params![
                        resolution.id,
                        s.0,
                        p.0,
                        o.0,
                        i64::from(triple.content_hash())
                    ])
                });
            self.discard_on_error(inserted)?;
        }
        Ok(TripleId(resolution.id))
    }

    fn write_triple(&self, session: &Session, triple: &Triple, graph: GraphId) -> Result<(), StorageError> {
        let id = self.save_triple_row(session, triple)?;
        session
            .connection()?
            .prepare_cached("INSERT OR IGNORE INTO graph_triples (graph_id, triple_id) VALUES (?1, ?2)")?
            .execute(params![graph.0, id.0])?;
        Ok(())
    }

    fn unlink_triple(&self, session: &Session, triple: &Triple, graph: GraphId) -> Result<bool, StorageError> {
        let conn = session.connection()?;
        let id = self.triples.lookup(
            triple,
            &TripleRows {
                conn,
                nodes: &self.nodes,
            },
        )?;
        let Some(id) = id else {
            return Ok(false);
        };
        let removed = conn
            .prepare_cached("DELETE FROM graph_triples WHERE graph_id = ?1 AND triple_id = ?2")?
            .execute(params![graph.0, id])?;
        Ok(removed > 0)
    }

    fn save_namespace(
        &self,
        session: &Session,
        prefix: &str,
        uri: &str,
        graph: GraphId,
    ) -> Result<(), StorageError> {
        let conn = session.connection()?;
        let (prefix_id, uri_id) = namespace_ids(conn, prefix, uri)?;
        conn.prepare_cached(
            "INSERT OR IGNORE INTO namespaces (graph_id, prefix_id, uri_id) VALUES (?1, ?2, ?3)",
        )?
        .execute(params![graph.0, prefix_id, uri_id])?;
        Ok(())
    }

    fn update_namespace(
        &self,
        session: &Session,
        prefix: &str,
        uri: &str,
        graph: GraphId,
    ) -> Result<(), StorageError> {
        let conn = session.connection()?;
        let (prefix_id, uri_id) = namespace_ids(conn, prefix, uri)?;
        conn.prepare_cached(
            "INSERT INTO namespaces (graph_id, prefix_id, uri_id) VALUES (?1, ?2, ?3) \
             ON CONFLICT (graph_id, prefix_id) DO UPDATE SET uri_id = excluded.uri_id",
        )?
        .execute(params![graph.0, prefix_id, uri_id])?;
        Ok(())
    }

    fn remove_namespace(
        &self,
        session: &Session,
        prefix: &str,
        uri: &str,
        graph: GraphId,
    ) -> Result<bool, StorageError> {
        let conn = session.connection()?;
        let (Some(prefix_id), Some(uri_id)) = (
            prefix_id(conn, prefix, false)?,
            namespace_uri_id(conn, uri, false)?,
        ) else {
            return Ok(false);
        };
        let removed = conn
            .prepare_cached(
                "DELETE FROM namespaces WHERE graph_id = ?1 AND prefix_id = ?2 AND uri_id = ?3",
            )?
            .execute(params![graph.0, prefix_id, uri_id])?;
        Ok(removed > 0)
    }

    fn clear_graph(&self, session: &Session, graph: GraphId) -> Result<(), StorageError> {
        let conn = session.connection()?;
        let links = conn.execute("DELETE FROM graph_triples WHERE graph_id = ?1", params![graph.0])?;
        conn.execute("DELETE FROM namespaces WHERE graph_id = ?1", params![graph.0])?;
        tracing::debug!(graph = graph.0, links, "graph cleared");
        Ok(())
    }

    fn remove_graph(&self, session: &Session, graph: GraphId) -> Result<(), StorageError> {
        self.clear_graph(session, graph)?;
        session
            .connection()?
            .execute("DELETE FROM graphs WHERE graph_id = ?1", params![graph.0])?;
        acquire_lock(&self.graphs).retain(|_, id| *id != graph);
        Ok(())
    }

    fn stats(&self, session: &Session) -> Result<StoreStats, StorageError> {
        let conn = session.connection()?;
        Ok(StoreStats {
            graphs: count(conn, "graphs")?,
            nodes: count(conn, "nodes")?,
            triples: count(conn, "triples")?,
            links: count(conn, "graph_triples")?,
            namespaces: count(conn, "namespaces")?,
        })
    }
}

fn namespace_ids(conn: &Connection, prefix: &str, uri: &str) -> Result<(i64, i64), StorageError> {
    let prefix_id = prefix_id(conn, prefix, true)?
        .ok_or_else(|| StorageError::integrity(format!("prefix '{}' was not stored", prefix)))?;
    let uri_id = namespace_uri_id(conn, uri, true)?
        .ok_or_else(|| StorageError::integrity(format!("namespace '{}' was not stored", uri)))?;
    Ok((prefix_id, uri_id))
}

impl BatchSink for StoreInner {
    fn write_batch(&self, batch: &[BufferedWrite]) -> Result<(), StorageError> {
        let mut session = self.connector.session();
        let result = session.open(true).and_then(|()| {
            for entry in batch {
                match entry.op {
                    WriteOp::Insert => self.write_triple(&session, &entry.triple, entry.graph)?,
                    WriteOp::Remove => {
                        self.unlink_triple(&session, &entry.triple, entry.graph)?;
                    }
                }
            }
            Ok(())
        });

        let result = result.and_then(|()| session.close(true));
        if let Err(e) = result {
            if let Err(rollback) = session.close_with(true, true) {
                tracing::warn!(error = %rollback, "rollback of failed batch failed");
            }
            return Err(e);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public store
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Opens (or creates) the store described by `config`, applying schema
    /// migrations and starting the background writer.
    pub fn open(config: StoreConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let connector = Connector::new(&config);
        connector.migrate()?;

        let inner = Arc::new_cyclic(|store: &Weak<StoreInner>| {
            let store = Weak::clone(store);
            let hook = RollbackHook::new(move || {
                if let Some(inner) = store.upgrade() {
                    inner.invalidate_caches();
                }
            });
            StoreInner {
                connector: connector.with_rollback_hook(hook),
                nodes: IdCache::new("nodes"),
                triples: IdCache::new("triples"),
                graphs: Mutex::new(HashMap::new()),
                config,
            }
        });
        let writer = WriteBuffer::start(Arc::clone(&inner), inner.config.batch_size)?;
        tracing::info!(
            path = %inner.config.path.display(),
            batch_size = inner.config.batch_size,
            transactions = inner.config.transactions,
            "store opened"
        );
        Ok(SqliteStore { inner, writer })
    }

    /// Opens the store at `path` with default settings.
    pub fn new(path: impl Into<std::path::PathBuf>) -> Result<Self, StorageError> {
        SqliteStore::open(StoreConfig::new(path))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// A new, closed session for this store's database.
    pub fn session(&self) -> Session {
        self.inner.connector.session()
    }

    // -----------------------------------------------------------------------
    // Contract operations
    // -----------------------------------------------------------------------

    /// Returns the id of the graph, creating the graph record if needed.
    pub fn graph_id(&self, session: &Session, uri: Option<&str>) -> Result<GraphId, StorageError> {
        self.inner.graph_id(session, uri)
    }

    /// Returns the id of the graph if it exists.
    pub fn find_graph(&self, session: &Session, uri: Option<&str>) -> Result<Option<GraphId>, StorageError> {
        self.inner.find_graph(session, uri)
    }

    pub fn graph_exists(&self, session: &Session, uri: Option<&str>) -> Result<bool, StorageError> {
        Ok(self.inner.find_graph(session, uri)?.is_some())
    }

    /// The URI of a graph record; `None` for the default graph.
    pub fn graph_uri(&self, session: &Session, graph: GraphId) -> Result<Option<String>, StorageError> {
        self.inner.graph_uri(session, graph)
    }

    pub fn list_graph_ids(&self, session: &Session) -> Result<Vec<GraphId>, StorageError> {
        self.inner.list_graph_ids(session)
    }

    pub fn load_namespaces(
        &self,
        session: &Session,
        graph: GraphId,
        sink: &mut dyn TripleSink,
    ) -> Result<(), StorageError> {
        self.inner.load_namespaces(session, graph, sink)
    }

    /// Streams every triple linked to `graph` into `sink`. Returns the count.
    pub fn load_triples(
        &self,
        session: &Session,
        graph: GraphId,
        sink: &mut dyn TripleSink,
    ) -> Result<usize, StorageError> {
        self.inner.load_triples(session, graph, sink)
    }

    /// Reads and decodes one node row.
    pub fn load_node(&self, session: &Session, id: NodeId) -> Result<Node, StorageError> {
        self.inner.load_node(session, id)
    }

    /// Returns the node's id, inserting its row if it is new.
    pub fn save_node(&self, session: &Session, node: &Node) -> Result<NodeId, StorageError> {
        self.inner.save_node(session, node)
    }

    /// Queues `triple` for insertion into `graph`.
    pub fn save_triple(&self, triple: Triple, graph: GraphId) -> Result<(), StorageError> {
        self.writer.push(BufferedWrite::insert(triple, graph))
    }

    /// Writes `triple` into `graph` immediately on `session`, bypassing the
    /// buffer. For bulk writers running with transactions disabled.
    pub fn write_triple(&self, session: &Session, triple: &Triple, graph: GraphId) -> Result<(), StorageError> {
        self.inner.write_triple(session, triple, graph)
    }

    /// Cancels any queued insert of `triple` into `graph` and queues its
    /// removal.
    pub fn remove_triple(&self, triple: Triple, graph: GraphId) -> Result<(), StorageError> {
        let purged = self.writer.purge(&triple, graph);
        if purged > 0 {
            tracing::debug!(graph = graph.0, purged, "queued insert cancelled by removal");
        }
        self.writer.push(BufferedWrite::remove(triple, graph))
    }

    /// Binds `prefix` to `uri` in `graph` unless the prefix is already bound.
    pub fn save_namespace(
        &self,
        session: &Session,
        prefix: &str,
        uri: &str,
        graph: GraphId,
    ) -> Result<(), StorageError> {
        self.inner.save_namespace(session, prefix, uri, graph)
    }

    /// Binds `prefix` to `uri` in `graph`, replacing any existing binding.
    pub fn update_namespace(
        &self,
        session: &Session,
        prefix: &str,
        uri: &str,
        graph: GraphId,
    ) -> Result<(), StorageError> {
        self.inner.update_namespace(session, prefix, uri, graph)
    }

    /// Removes the `prefix` → `uri` binding from `graph`. Returns `false` if
    /// it was not bound.
    pub fn remove_namespace(
        &self,
        session: &Session,
        prefix: &str,
        uri: &str,
        graph: GraphId,
    ) -> Result<bool, StorageError> {
        self.inner.remove_namespace(session, prefix, uri, graph)
    }

    /// Deletes a graph record with its links and namespaces. Queued writes
    /// for the graph are discarded.
    pub fn remove_graph(&self, session: &Session, graph: GraphId) -> Result<(), StorageError> {
        let purged = self.writer.purge_graph(graph);
        if purged > 0 {
            tracing::debug!(graph = graph.0, purged, "queued writes discarded");
        }
        self.inner.remove_graph(session, graph)
    }

    /// Removes a graph's links and namespaces, keeping the record.
    pub fn clear_graph(&self, session: &Session, graph: GraphId) -> Result<(), StorageError> {
        self.inner.clear_graph(session, graph)
    }

    /// Blocks until every queued write has been applied.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.writer.flush()
    }

    /// `true` if no writes are queued or in progress.
    pub fn has_completed(&self) -> bool {
        self.writer.is_idle()
    }

    pub fn stats(&self, session: &Session) -> Result<StoreStats, StorageError> {
        self.inner.stats(session)
    }

    /// Number of hash slots in the node and triple caches.
    pub fn cache_sizes(&self) -> (usize, usize) {
        (self.inner.nodes.len(), self.inner.triples.len())
    }

    /// State of the node cache slot for a content hash.
    pub fn node_slot(&self, hash: u32) -> Option<CacheEntry> {
        self.inner.nodes.entry(hash)
    }

    /// State of the triple cache slot for a content hash.
    pub fn triple_slot(&self, hash: u32) -> Option<CacheEntry> {
        self.inner.triples.entry(hash)
    }

    /// Flushes pending writes. Without `preserve_state` this also stops the
    /// background writer and clears the caches; the store cannot write after
    /// that.
    pub fn close(&self) -> Result<(), StorageError> {
        if self.inner.config.preserve_state {
            return self.writer.flush();
        }
        let result = self.writer.shutdown();
        self.inner.clear_caches();
        tracing::info!(path = %self.inner.config.path.display(), "store closed");
        result
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Runs `f` on a kept-open session, committing on success. On failure the
    /// session is rolled back and closed (which invalidates the caches) and
    /// the error is wrapped with `operation`.
    fn guarded<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Session) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut session = self.session();
        let result = session
            .open(true)
            .and_then(|()| f(&mut session))
            .and_then(|value| session.close(true).map(|()| value));

        result.map_err(|source| {
            if let Err(rollback) = session.close_with(true, true) {
                tracing::warn!(operation, error = %rollback, "rollback failed");
            }
            tracing::warn!(operation, error = %source, "operation rolled back");
            StorageError::Operation {
                operation,
                source: Box::new(source),
            }
        })
    }

    fn wrap(operation: &'static str, source: StorageError) -> StorageError {
        StorageError::Operation {
            operation,
            source: Box::new(source),
        }
    }

    fn queue_all<'a>(
        &self,
        op: WriteOp,
        triples: impl IntoIterator<Item = &'a Triple>,
        graph: GraphId,
    ) -> Result<usize, StorageError> {
        let mut queued = 0;
        for triple in triples {
            match op {
                WriteOp::Insert => self.save_triple(triple.clone(), graph)?,
                WriteOp::Remove => self.remove_triple(triple.clone(), graph)?,
            }
            queued += 1;
        }
        Ok(queued)
    }
}

impl GraphStore for SqliteStore {
    fn load_graph(&self, uri: Option<&str>) -> Result<Option<Graph>, StorageError> {
        let mut graph = Graph::with_uri(uri.map(str::to_string))?;
        if self.load_graph_into(uri, &mut graph)? {
            Ok(Some(graph))
        } else {
            Ok(None)
        }
    }

    fn load_graph_into(
        &self,
        uri: Option<&str>,
        sink: &mut dyn TripleSink,
    ) -> Result<bool, StorageError> {
        // Failures of earlier batches are left for the writers' next flush.
        self.writer
            .settle()
            .map_err(|e| Self::wrap("load_graph", e))?;
        self.guarded("load_graph", |session| {
            let Some(graph) = self.inner.find_graph(session, uri)? else {
                return Ok(false);
            };
            self.inner.load_namespaces(session, graph, sink)?;
            let triples = self.inner.load_triples(session, graph, sink)?;
            tracing::debug!(graph = graph.0, triples, "graph loaded");
            Ok(true)
        })
    }

    fn save_graph(&self, graph: &Graph) -> Result<(), StorageError> {
        let id = self.guarded("save_graph", |session| {
            let id = self.inner.graph_id(session, graph.uri())?;
            self.writer.purge_graph(id);
            self.inner.clear_graph(session, id)?;
            for (prefix, uri) in graph.namespaces().iter() {
                self.inner.save_namespace(session, prefix, uri, id)?;
            }
            Ok(id)
        })?;

        // The session above has committed, so the worker can take the lock.
        let queued = self
            .queue_all(WriteOp::Insert, graph.triples(), id)
            .map_err(|e| Self::wrap("save_graph", e))?;
        self.writer.flush().map_err(|e| Self::wrap("save_graph", e))?;
        tracing::debug!(graph = id.0, triples = queued, "graph saved");
        Ok(())
    }

    fn update_graph(
        &self,
        uri: Option<&str>,
        additions: &[Triple],
        removals: &[Triple],
    ) -> Result<(), StorageError> {
        let id = self.guarded("update_graph", |session| self.inner.graph_id(session, uri))?;

        let wrap = |e| Self::wrap("update_graph", e);
        if !removals.is_empty() {
            self.queue_all(WriteOp::Remove, removals, id).map_err(wrap)?;
            self.writer.flush().map_err(wrap)?;
        }
        if !additions.is_empty() {
            self.queue_all(WriteOp::Insert, additions, id).map_err(wrap)?;
            self.writer.flush().map_err(wrap)?;
        }
        Ok(())
    }

    fn delete_graph(&self, uri: Option<&str>) -> Result<(), StorageError> {
        let Some(id) = self.guarded("delete_graph", |session| self.inner.find_graph(session, uri))?
        else {
            return Ok(());
        };

        // Drop this graph's queued writes and wait out any batch in flight.
        self.writer.purge_graph(id);
        self.writer
            .flush()
            .map_err(|e| Self::wrap("delete_graph", e))?;
        self.guarded("delete_graph", |session| self.remove_graph(session, id))?;
        tracing::debug!(graph = id.0, "graph deleted");
        Ok(())
    }

    fn list_graphs(&self) -> Result<Vec<Option<String>>, StorageError> {
        self.guarded("list_graphs", |session| {
            let conn = session.connection()?;
            let mut stmt = conn.prepare_cached("SELECT graph_uri FROM graphs ORDER BY graph_id")?;
            let uris = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|key| key.map(graph_name))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(uris)
        })
    }
}
