//! Integration tests for concurrent callers sharing one store.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use trestle_core::{Graph, Node, Triple};
use trestle_storage::{GraphStore, NodeId, SqliteStore, StoreConfig};

const THREADS: usize = 8;
const PER_THREAD: usize = 25;

fn shared_store(dir: &tempfile::TempDir, configure: impl FnOnce(StoreConfig) -> StoreConfig) -> Arc<SqliteStore> {
    let config = configure(StoreConfig::new(dir.path().join("concurrency.db")));
    Arc::new(SqliteStore::open(config).unwrap())
}

fn node(thread: usize, i: usize) -> Node {
    Node::literal(format!("t{}-n{}", thread, i))
}

fn stats(store: &SqliteStore) -> trestle_storage::StoreStats {
    let mut session = store.session();
    session.open(false).unwrap();
    let stats = store.stats(&session).unwrap();
    session.close(true).unwrap();
    stats
}

#[test]
fn test_concurrent_save_node_assigns_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = shared_store(&dir, |c| c);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut ids = Vec::new();
                for i in 0..PER_THREAD {
                    let mut session = store.session();
                    session.open(false).unwrap();
                    ids.push(store.save_node(&session, &node(t, i)).unwrap());
                    session.close(false).unwrap();
                }
                ids
            })
        })
        .collect();

    let ids: Vec<NodeId> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let distinct: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(distinct.len(), THREADS * PER_THREAD);
    assert_eq!(stats(&store).nodes as usize, THREADS * PER_THREAD);
}

#[test]
fn test_concurrent_save_of_same_node_agrees() {
    let dir = tempfile::tempdir().unwrap();
    let store = shared_store(&dir, |c| c);
    let shared = Node::uri("http://example.org/shared");

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let shared = shared.clone();
            thread::spawn(move || {
                let mut session = store.session();
                session.open(false).unwrap();
                let id = store.save_node(&session, &shared).unwrap();
                session.close(false).unwrap();
                id
            })
        })
        .collect();

    let ids: HashSet<NodeId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(stats(&store).nodes, 1);
}

#[test]
fn test_concurrent_graph_updates_share_one_writer() {
    let dir = tempfile::tempdir().unwrap();
    let store = shared_store(&dir, |c| c.with_batch_size(7));
    let common = Triple::new(
        Node::uri("http://example.org/s"),
        Node::uri("http://example.org/p"),
        Node::literal("common"),
    );

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            let common = common.clone();
            thread::spawn(move || {
                let uri = format!("http://example.org/g{}", t);
                let mut graph = Graph::named(uri).unwrap();
                graph.assert(common);
                for i in 0..PER_THREAD {
                    graph.assert(Triple::new(
                        Node::uri("http://example.org/s"),
                        Node::uri("http://example.org/p"),
                        node(t, i),
                    ));
                }
                store.save_graph(&graph).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..THREADS {
        let uri = format!("http://example.org/g{}", t);
        let graph = store.load_graph(Some(&uri)).unwrap().unwrap();
        assert_eq!(graph.triple_count(), PER_THREAD + 1);
        assert!(graph.contains(&common));
    }
    let stats = stats(&store);
    assert_eq!(stats.triples as usize, THREADS * PER_THREAD + 1);
    assert_eq!(stats.links as usize, THREADS * (PER_THREAD + 1));
    assert!(store.has_completed());
}

#[test]
fn test_direct_writers_without_transactions() {
    let dir = tempfile::tempdir().unwrap();
    let store = shared_store(&dir, |c| c.with_transactions(false));
    let graph = {
        let mut session = store.session();
        session.open(false).unwrap();
        let id = store.graph_id(&session, Some("http://example.org/bulk")).unwrap();
        session.close(false).unwrap();
        id
    };

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut session = store.session();
                session.open(false).unwrap();
                for i in 0..PER_THREAD {
                    let triple = Triple::new(
                        Node::uri(format!("http://example.org/writer{}", t)),
                        Node::uri("http://example.org/p"),
                        node(t, i),
                    );
                    store.write_triple(&session, &triple, graph).unwrap();
                }
                session.close(false).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let loaded = store.load_graph(Some("http://example.org/bulk")).unwrap().unwrap();
    assert_eq!(loaded.triple_count(), THREADS * PER_THREAD);
    let stats = stats(&store);
    assert_eq!(stats.nodes as usize, THREADS * PER_THREAD + THREADS + 1);
}
