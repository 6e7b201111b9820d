//! RDF terms: blank nodes, URIs and literals.
//!
//! A [`Node`] carries its own content identity: [`Node::fingerprint`] is a
//! full blake3 digest and [`Node::content_hash`] is the 32-bit prefix used on
//! fast paths. Equality is structural, so two nodes are equal exactly when
//! their fingerprints are.
//!
//! `Display` renders N-Triples term syntax and `FromStr` parses it back,
//! which is what the CLI uses for term input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hash::{Fingerprint, FingerprintBuilder};

const TAG_BLANK: u8 = 0;
const TAG_URI: u8 = 1;
const TAG_LEXICAL: u8 = 2;
const TAG_DATATYPE: u8 = 3;
const TAG_LANGUAGE: u8 = 4;

/// Discriminant of a [`Node`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Blank,
    Uri,
    Literal,
}

/// A literal value with an optional datatype or language tag (never both).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    lexical: String,
    datatype: Option<String>,
    language: Option<String>,
}

impl Literal {
    /// A plain literal.
    pub fn plain(lexical: impl Into<String>) -> Self {
        Literal {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }

    /// A literal with a datatype URI.
    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Literal {
            lexical: lexical.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    /// A literal with a language tag.
    pub fn tagged(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Literal {
            lexical: lexical.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }

    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    pub fn datatype(&self) -> Option<&str> {
        self.datatype.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

/// An RDF term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Node {
    /// Blank node, identified by its label (without the `_:` prefix).
    Blank(String),
    /// URI reference.
    Uri(String),
    /// Literal value.
    Literal(Literal),
}

impl Node {
    pub fn blank(label: impl Into<String>) -> Self {
        Node::Blank(label.into())
    }

    pub fn uri(value: impl Into<String>) -> Self {
        Node::Uri(value.into())
    }

    pub fn literal(lexical: impl Into<String>) -> Self {
        Node::Literal(Literal::plain(lexical))
    }

    pub fn typed_literal(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Node::Literal(Literal::typed(lexical, datatype))
    }

    pub fn lang_literal(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Node::Literal(Literal::tagged(lexical, language))
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Blank(_) => NodeKind::Blank,
            Node::Uri(_) => NodeKind::Uri,
            Node::Literal(_) => NodeKind::Literal,
        }
    }

    /// Returns the literal payload, if this is a literal.
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Node::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Full-width content digest.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut builder = FingerprintBuilder::new(b"node");
        match self {
            Node::Blank(label) => {
                builder.field(TAG_BLANK, label);
            }
            Node::Uri(value) => {
                builder.field(TAG_URI, value);
            }
            Node::Literal(lit) => {
                builder.field(TAG_LEXICAL, &lit.lexical);
                if let Some(dt) = &lit.datatype {
                    builder.field(TAG_DATATYPE, dt);
                }
                if let Some(lang) = &lit.language {
                    builder.field(TAG_LANGUAGE, lang);
                }
            }
        }
        builder.finish()
    }

    /// 32-bit fast-path hash. Distinct nodes may share it.
    pub fn content_hash(&self) -> u32 {
        self.fingerprint().content_hash()
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for ch in text.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            other => write!(f, "{}", other)?,
        }
    }
    Ok(())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Blank(label) => write!(f, "_:{}", label),
            Node::Uri(value) => write!(f, "<{}>", value),
            Node::Literal(lit) => {
                f.write_str("\"")?;
                write_escaped(f, &lit.lexical)?;
                f.write_str("\"")?;
                if let Some(dt) = &lit.datatype {
                    write!(f, "^^<{}>", dt)?;
                } else if let Some(lang) = &lit.language {
                    write!(f, "@{}", lang)?;
                }
                Ok(())
            }
        }
    }
}

fn invalid(input: &str, reason: &str) -> CoreError {
    CoreError::InvalidTerm {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

/// Parses the quoted part of a literal, returning the unescaped lexical
/// form and the remaining suffix.
fn parse_quoted<'a>(input: &str, body: &'a str) -> Result<(String, &'a str), CoreError> {
    let mut lexical = String::new();
    let mut chars = body.char_indices();
    while let Some((idx, ch)) = chars.next() {
        match ch {
            '"' => return Ok((lexical, &body[idx + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => lexical.push('\n'),
                Some((_, 'r')) => lexical.push('\r'),
                Some((_, 't')) => lexical.push('\t'),
                Some((_, '"')) => lexical.push('"'),
                Some((_, '\\')) => lexical.push('\\'),
                _ => return Err(invalid(input, "unsupported escape sequence")),
            },
            other => lexical.push(other),
        }
    }
    Err(invalid(input, "unterminated literal"))
}

impl FromStr for Node {
    type Err = CoreError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let text = input.trim();
        if let Some(rest) = text.strip_prefix('<') {
            let value = rest
                .strip_suffix('>')
                .ok_or_else(|| invalid(input, "missing closing '>'"))?;
            if value.is_empty() {
                return Err(invalid(input, "empty URI"));
            }
            return Ok(Node::uri(value));
        }
        if let Some(label) = text.strip_prefix("_:") {
            if label.is_empty() || label.chars().any(char::is_whitespace) {
                return Err(invalid(input, "invalid blank node label"));
            }
            return Ok(Node::blank(label));
        }
        if let Some(body) = text.strip_prefix('"') {
            let (lexical, suffix) = parse_quoted(input, body)?;
            if suffix.is_empty() {
                return Ok(Node::literal(lexical));
            }
            if let Some(lang) = suffix.strip_prefix('@') {
                if lang.is_empty() || !lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                    return Err(invalid(input, "invalid language tag"));
                }
                return Ok(Node::lang_literal(lexical, lang));
            }
            if let Some(dt) = suffix.strip_prefix("^^") {
                let dt = dt
                    .strip_prefix('<')
                    .and_then(|d| d.strip_suffix('>'))
                    .ok_or_else(|| invalid(input, "datatype must be a <uri>"))?;
                return Ok(Node::typed_literal(lexical, dt));
            }
            return Err(invalid(input, "unexpected text after literal"));
        }
        Err(invalid(input, "expected <uri>, _:label or \"literal\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#integer";

    #[test]
    fn test_equal_nodes_share_fingerprint() {
        let a = Node::typed_literal("5", XSD_INT);
        let b = Node::typed_literal("5", XSD_INT);
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_kind_changes_fingerprint() {
        let uri = Node::uri("http://example.org/x");
        let lit = Node::literal("http://example.org/x");
        let blank = Node::blank("http://example.org/x");
        assert_ne!(uri.fingerprint(), lit.fingerprint());
        assert_ne!(uri.fingerprint(), blank.fingerprint());
        assert_ne!(lit.fingerprint(), blank.fingerprint());
    }

    #[test]
    fn test_datatype_and_language_are_distinct() {
        let typed = Node::typed_literal("chat", "en");
        let tagged = Node::lang_literal("chat", "en");
        assert_ne!(typed, tagged);
        assert_ne!(typed.fingerprint(), tagged.fingerprint());
    }

    #[test]
    fn test_display_ntriples() {
        assert_eq!(Node::uri("http://a/b").to_string(), "<http://a/b>");
        assert_eq!(Node::blank("b0").to_string(), "_:b0");
        assert_eq!(Node::literal("say \"hi\"").to_string(), "\"say \\\"hi\\\"\"");
        assert_eq!(Node::lang_literal("hallo", "de").to_string(), "\"hallo\"@de");
        assert_eq!(
            Node::typed_literal("5", XSD_INT).to_string(),
            format!("\"5\"^^<{}>", XSD_INT)
        );
    }

    #[test]
    fn test_parse_display_agree() {
        let nodes = vec![
            Node::uri("http://example.org/s"),
            Node::blank("x1"),
            Node::literal("line\nbreak\t\\ \"quoted\""),
            Node::lang_literal("colour", "en-GB"),
            Node::typed_literal("a^^b", XSD_INT),
        ];
        for node in nodes {
            let parsed: Node = node.to_string().parse().unwrap();
            assert_eq!(parsed, node);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("plain".parse::<Node>().is_err());
        assert!("<unterminated".parse::<Node>().is_err());
        assert!("\"open".parse::<Node>().is_err());
        assert!("\"x\"@".parse::<Node>().is_err());
        assert!("\"x\"^^xsd:int".parse::<Node>().is_err());
        assert!("_:".parse::<Node>().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let node = Node::lang_literal("bonjour", "fr");
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }
}
