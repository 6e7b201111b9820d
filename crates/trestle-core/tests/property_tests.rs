//! Property tests for terms and content fingerprints.

use proptest::prelude::*;

use trestle_core::{Graph, Node, Triple};

fn any_node() -> impl Strategy<Value = Node> {
    prop_oneof![
        "[a-zA-Z0-9_]{1,10}".prop_map(Node::blank),
        "http://example\\.org/[a-z0-9/#]{0,10}".prop_map(Node::uri),
        "\\PC{0,12}".prop_map(Node::literal),
        ("\\PC{0,8}", "http://example\\.org/[a-z]{1,6}")
            .prop_map(|(lex, dt)| Node::typed_literal(lex, dt)),
        ("\\PC{0,8}", "[a-z]{2,3}(-[A-Z]{2})?").prop_map(|(lex, lang)| Node::lang_literal(lex, lang)),
    ]
}

proptest! {
    /// N-Triples rendering parses back to the same node.
    #[test]
    fn display_parse_roundtrip(node in any_node()) {
        let text = node.to_string();
        let parsed: Node = text.parse().unwrap();
        prop_assert_eq!(parsed, node);
    }

    /// Fingerprints agree exactly when nodes are equal.
    #[test]
    fn fingerprint_matches_equality(a in any_node(), b in any_node()) {
        prop_assert_eq!(a == b, a.fingerprint() == b.fingerprint());
        if a == b {
            prop_assert_eq!(a.content_hash(), b.content_hash());
        }
    }

    /// A graph holds each distinct triple once, in first-assertion order.
    #[test]
    fn graph_deduplicates_triples(objects in proptest::collection::vec(any_node(), 0..20)) {
        let s = Node::uri("http://example.org/s");
        let p = Node::uri("http://example.org/p");
        let mut graph = Graph::default_graph();
        let mut expected: Vec<Triple> = Vec::new();
        for o in objects {
            let t = Triple::new(s.clone(), p.clone(), o);
            if !expected.contains(&t) {
                expected.push(t.clone());
            }
            graph.assert(t);
        }
        prop_assert_eq!(graph.triples().cloned().collect::<Vec<_>>(), expected);
    }
}
