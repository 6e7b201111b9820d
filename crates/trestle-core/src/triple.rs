//! Subject–predicate–object statements.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::{Fingerprint, FingerprintBuilder};
use crate::node::Node;

/// An RDF statement. Equality is structural over the three nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Node,
    pub predicate: Node,
    pub object: Node,
}

impl Triple {
    pub fn new(subject: Node, predicate: Node, object: Node) -> Self {
        Triple {
            subject,
            predicate,
            object,
        }
    }

    /// Digest composed from the three node fingerprints in position order.
    pub fn fingerprint(&self) -> Fingerprint {
        FingerprintBuilder::new(b"triple")
            .nested(&self.subject.fingerprint())
            .nested(&self.predicate.fingerprint())
            .nested(&self.object.fingerprint())
            .finish()
    }

    /// 32-bit fast-path hash. Distinct triples may share it.
    pub fn content_hash(&self) -> u32 {
        self.fingerprint().content_hash()
    }

    pub fn nodes(&self) -> [&Node; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}
