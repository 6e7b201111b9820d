//! Node value codec: how a [`Node`] is flattened into the `nodes` table and
//! recovered from it.
//!
//! # Encoding
//!
//! | node | `node_value` |
//! |---|---|
//! | blank `b1` | `_:b1` |
//! | URI | the URI |
//! | plain literal | lexical form |
//! | typed literal | `lexical^^datatype` |
//! | tagged literal | `lexical@lang` |
//!
//! The literal encoding is not injective on its own: a plain literal whose
//! text is `a^^b` encodes the same as `a` typed `b`. The persisted
//! `node_hash` disambiguates. Decoding tries candidate readings in a fixed
//! order and keeps the first whose content hash matches:
//!
//! 1. the likely reading: split at the last `^^`, else a trailing
//!    language tag, else plain;
//! 2. plain;
//! 3. language-tagged, when the text ends in a well-formed tag;
//! 4. every other `^^` split, right to left;
//! 5. every `@` split, right to left, read as a language tag. This covers
//!    tags outside the usual grammar, including the empty tag.
//!
//! If nothing matches, the likely reading is returned and a warning logged.

use std::sync::LazyLock;

use regex::Regex;

use trestle_core::{Literal, Node};

use crate::types::NodeType;

const BLANK_PREFIX: &str = "_:";
const DATATYPE_SEPARATOR: &str = "^^";

/// A node flattened into column values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedNode {
    pub kind: NodeType,
    pub value: String,
    pub hash: u32,
}

/// Trailing `@tag` with a well-formed language tag.
static LANGUAGE_SUFFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z]{1,8}(?:-[A-Za-z0-9]{1,8})*)$").ok());

/// Flattens `node` into its persisted form.
pub fn encode(node: &Node) -> EncodedNode {
    let value = match node {
        Node::Blank(label) => format!("{}{}", BLANK_PREFIX, label),
        Node::Uri(uri) => uri.clone(),
        Node::Literal(lit) => encode_literal(lit),
    };
    EncodedNode {
        kind: NodeType::from(node.kind()),
        value,
        hash: node.content_hash(),
    }
}

fn encode_literal(lit: &Literal) -> String {
    match (lit.datatype(), lit.language()) {
        (Some(dt), _) => format!("{}{}{}", lit.lexical(), DATATYPE_SEPARATOR, dt),
        (None, Some(lang)) => format!("{}@{}", lit.lexical(), lang),
        (None, None) => lit.lexical().to_string(),
    }
}

/// Rebuilds a node from its persisted columns.
///
/// `expected_hash` is the stored `node_hash`; it is only consulted for
/// literals.
pub fn decode(kind: NodeType, value: &str, expected_hash: u32) -> Node {
    match kind {
        NodeType::Blank => Node::blank(value.strip_prefix(BLANK_PREFIX).unwrap_or(value)),
        NodeType::Uri => Node::uri(value),
        NodeType::Literal => decode_literal(value, expected_hash),
    }
}

fn decode_literal(value: &str, expected_hash: u32) -> Node {
    let candidates = literal_candidates(value);
    if let Some(found) = candidates
        .iter()
        .find(|candidate| candidate.content_hash() == expected_hash)
    {
        return found.clone();
    }

    let guess = candidates
        .into_iter()
        .next()
        .unwrap_or_else(|| Node::literal(value));
    tracing::warn!(
        value = %value,
        expected_hash,
        "no literal reading matches the stored hash; using {}",
        guess
    );
    guess
}

/// All readings of an encoded literal, in policy order. The first entry is
/// the likely reading. Duplicates are not removed.
pub fn literal_candidates(value: &str) -> Vec<Node> {
    let splits: Vec<usize> = value
        .match_indices(DATATYPE_SEPARATOR)
        .map(|(idx, _)| idx)
        .collect();
    let tagged = LANGUAGE_SUFFIX.as_ref().and_then(|re| {
        let caps = re.captures(value)?;
        let whole = caps.get(0)?;
        let tag = caps.get(1)?;
        Some(Node::lang_literal(&value[..whole.start()], tag.as_str()))
    });
    let typed_at = |idx: usize| {
        Node::typed_literal(&value[..idx], &value[idx + DATATYPE_SEPARATOR.len()..])
    };

    let at_splits: Vec<usize> = value.match_indices('@').map(|(idx, _)| idx).collect();

    let mut candidates = Vec::with_capacity(splits.len() + at_splits.len() + 3);
    match (splits.last(), &tagged) {
        (Some(&last), _) => candidates.push(typed_at(last)),
        (None, Some(tagged)) => candidates.push(tagged.clone()),
        (None, None) => candidates.push(Node::literal(value)),
    }
    candidates.push(Node::literal(value));
    if let Some(tagged) = tagged {
        candidates.push(tagged);
    }
    // The last split was already tried as the guess.
    for &idx in splits.iter().rev().skip(1) {
        candidates.push(typed_at(idx));
    }
    for &idx in at_splits.iter().rev() {
        candidates.push(Node::lang_literal(&value[..idx], &value[idx + 1..]));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#integer";

    fn roundtrip(node: Node) {
        let encoded = encode(&node);
        let decoded = decode(encoded.kind, &encoded.value, encoded.hash);
        assert_eq!(decoded, node, "encoded as {:?}", encoded.value);
    }

    #[test]
    fn test_encode_forms() {
        assert_eq!(encode(&Node::blank("b1")).value, "_:b1");
        assert_eq!(encode(&Node::uri("http://a/b")).value, "http://a/b");
        assert_eq!(encode(&Node::literal("x")).value, "x");
        assert_eq!(
            encode(&Node::typed_literal("5", XSD_INT)).value,
            format!("5^^{}", XSD_INT)
        );
        assert_eq!(encode(&Node::lang_literal("hi", "en")).value, "hi@en");
        assert_eq!(encode(&Node::literal("x")).kind, NodeType::Literal);
    }

    #[test]
    fn test_roundtrip_simple() {
        roundtrip(Node::blank("b1"));
        roundtrip(Node::uri("http://example.org/thing"));
        roundtrip(Node::literal("hello world"));
        roundtrip(Node::typed_literal("42", XSD_INT));
        roundtrip(Node::lang_literal("colour", "en-GB"));
        roundtrip(Node::literal(""));
    }

    #[test]
    fn test_roundtrip_ambiguous_text() {
        // Each of these reads differently from its likely decoding.
        roundtrip(Node::literal("a^^b"));
        roundtrip(Node::literal("mail me@home"));
        roundtrip(Node::literal("x@en"));
        roundtrip(Node::typed_literal("a^^b", XSD_INT));
        roundtrip(Node::typed_literal("a", "b^^c"));
        roundtrip(Node::lang_literal("a^^b", "en"));
        roundtrip(Node::lang_literal("user@host", "de"));
    }

    #[test]
    fn test_candidate_order() {
        let candidates = literal_candidates("a^^b^^c");
        assert_eq!(candidates[0], Node::typed_literal("a^^b", "c"));
        assert_eq!(candidates[1], Node::literal("a^^b^^c"));
        assert_eq!(candidates[2], Node::typed_literal("a", "b^^c"));
        assert_eq!(candidates.len(), 3);

        let candidates = literal_candidates("chat@fr");
        assert_eq!(candidates[0], Node::lang_literal("chat", "fr"));
        assert_eq!(candidates[1], Node::literal("chat@fr"));
        assert_eq!(candidates[2], Node::lang_literal("chat", "fr"));
    }

    #[test]
    fn test_language_pattern() {
        assert_eq!(literal_candidates("x@toolonglanguage")[0], Node::literal("x@toolonglanguage"));
        assert_eq!(literal_candidates("x@en-")[0], Node::literal("x@en-"));
        assert_eq!(literal_candidates("x@zh-Hant-TW")[0], Node::lang_literal("x", "zh-Hant-TW"));
    }

    #[test]
    fn test_roundtrip_irregular_language_tags() {
        roundtrip(Node::lang_literal("x", "abcdefghij"));
        roundtrip(Node::lang_literal("x", "en_US"));
        roundtrip(Node::lang_literal("x", ""));
        roundtrip(Node::lang_literal("a@b", "c@d"));
        roundtrip(Node::lang_literal("5", "x^^y"));
        roundtrip("\"x\"@abcdefghij".parse::<Node>().unwrap());
    }

    #[test]
    fn test_at_splits_follow_datatype_splits() {
        let candidates = literal_candidates("a@b^^c");
        assert_eq!(candidates[0], Node::typed_literal("a@b", "c"));
        assert_eq!(candidates[1], Node::literal("a@b^^c"));
        assert_eq!(candidates[2], Node::lang_literal("a", "b^^c"));
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn test_mismatched_hash_falls_back_to_guess() {
        let decoded = decode(NodeType::Literal, "5^^xsd:int", 0);
        let real = Node::typed_literal("5", "xsd:int");
        // Only falls back when 0 is not the real hash.
        if real.content_hash() != 0 && Node::literal("5^^xsd:int").content_hash() != 0 {
            assert_eq!(decoded, real);
        }
    }

    #[test]
    fn test_blank_without_prefix_taken_verbatim() {
        assert_eq!(decode(NodeType::Blank, "b7", 0), Node::blank("b7"));
    }
}
