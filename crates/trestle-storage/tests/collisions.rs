//! Integration tests with real 32-bit content hash collisions.
//!
//! Collisions are found by brute force over generated literals. With a
//! 32-bit hash a few hundred thousand candidates contain several colliding
//! pairs, and the search is deterministic.

use std::collections::HashMap;

use trestle_core::{Graph, Node, Triple};
use trestle_storage::{CacheEntry, GraphStore, SqliteStore, StoreConfig};

const SEARCH_LIMIT: usize = 2_000_000;

/// First pair of distinct items whose content hashes are equal.
fn find_collision<T>(make: impl Fn(usize) -> T, hash: impl Fn(&T) -> u32) -> (T, T) {
    let mut seen: HashMap<u32, usize> = HashMap::new();
    for i in 0..SEARCH_LIMIT {
        let item = make(i);
        if let Some(&j) = seen.get(&hash(&item)) {
            return (make(j), item);
        }
        seen.insert(hash(&item), i);
    }
    panic!("no collision among {} candidates", SEARCH_LIMIT);
}

fn colliding_literals() -> (Node, Node) {
    find_collision(|i| Node::literal(format!("lit-{}", i)), Node::content_hash)
}

fn ex(local: &str) -> Node {
    Node::uri(format!("http://example.org/{}", local))
}

fn open(dir: &tempfile::TempDir) -> SqliteStore {
    SqliteStore::open(StoreConfig::new(dir.path().join("collisions.db")).with_batch_size(16))
        .unwrap()
}

#[test]
fn test_colliding_nodes_get_distinct_ids() {
    let (a, b) = colliding_literals();
    assert_ne!(a, b);
    assert_eq!(a.content_hash(), b.content_hash());

    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let mut session = store.session();
    session.open(true).unwrap();
    let id_a = store.save_node(&session, &a).unwrap();
    let id_b = store.save_node(&session, &b).unwrap();
    assert_ne!(id_a, id_b);
    assert_eq!(store.save_node(&session, &a).unwrap(), id_a);
    assert_eq!(store.save_node(&session, &b).unwrap(), id_b);
    assert_eq!(store.load_node(&session, id_a).unwrap(), a);
    assert_eq!(store.load_node(&session, id_b).unwrap(), b);
    session.close(true).unwrap();
}

#[test]
fn test_colliding_objects_survive_save_and_load() {
    let (a, b) = colliding_literals();
    let ta = Triple::new(ex("s"), ex("p"), a.clone());
    let tb = Triple::new(ex("s"), ex("p"), b.clone());

    let dir = tempfile::tempdir().unwrap();
    {
        let store = open(&dir);
        let mut graph = Graph::named("http://example.org/g").unwrap();
        graph.assert(ta.clone());
        graph.assert(tb.clone());
        store.save_graph(&graph).unwrap();

        let loaded = store.load_graph(Some("http://example.org/g")).unwrap().unwrap();
        assert_eq!(loaded.triple_count(), 2);
        assert!(loaded.contains(&ta));
        assert!(loaded.contains(&tb));
    }

    // A fresh store sees the duplicate hash in the table and must not
    // conflate the two nodes.
    let store = open(&dir);
    let mut session = store.session();
    session.open(true).unwrap();
    let id_a = store.save_node(&session, &a).unwrap();
    let id_b = store.save_node(&session, &b).unwrap();
    assert_ne!(id_a, id_b);
    session.close(true).unwrap();

    store
        .update_graph(Some("http://example.org/h"), &[tb.clone()], &[])
        .unwrap();
    let loaded = store.load_graph(Some("http://example.org/h")).unwrap().unwrap();
    assert_eq!(loaded.triples().cloned().collect::<Vec<_>>(), vec![tb]);
}

#[test]
fn test_removal_of_colliding_triple_leaves_partner() {
    let (ta, tb) = find_collision(
        |i| Triple::new(ex("s"), ex("p"), Node::literal(format!("obj-{}", i))),
        Triple::content_hash,
    );
    assert_eq!(ta.content_hash(), tb.content_hash());

    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let uri = Some("http://example.org/g");
    store.update_graph(uri, &[ta.clone(), tb.clone()], &[]).unwrap();
    store.update_graph(uri, &[], &[ta.clone()]).unwrap();

    let loaded = store.load_graph(uri).unwrap().unwrap();
    assert!(!loaded.contains(&ta));
    assert!(loaded.contains(&tb));
}

#[test]
fn test_colliding_slot_is_ambiguous_in_cache() {
    let (a, b) = colliding_literals();
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let mut session = store.session();
    session.open(true).unwrap();
    store.save_node(&session, &a).unwrap();
    assert!(matches!(
        store.node_slot(a.content_hash()),
        Some(CacheEntry::Resolved { .. })
    ));
    store.save_node(&session, &b).unwrap();
    session.close(true).unwrap();
    assert_eq!(store.node_slot(a.content_hash()), Some(CacheEntry::Ambiguous));
    store.close().unwrap();

    // A fresh store marks the slot ambiguous when it loads the rows.
    let reopened = open(&dir);
    let mut session = reopened.session();
    session.open(true).unwrap();
    reopened.save_node(&session, &ex("unrelated")).unwrap();
    session.close(true).unwrap();
    assert_eq!(reopened.node_slot(a.content_hash()), Some(CacheEntry::Ambiguous));
}
