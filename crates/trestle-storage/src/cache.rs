//! Identifier caches mapping content hashes to row ids.
//!
//! One [`IdCache`] exists per entity table (nodes, triples). The fast path is
//! a 32-bit content hash lookup; because distinct entities may share a hash,
//! each slot also remembers which entity owns it (its [`Fingerprint`]) when
//! that is known.
//!
//! # Slot states
//!
//! - `Resolved { id, owner: Some(fp) }`: the hash belongs to exactly one
//!   known entity. A lookup by that entity returns `id` without touching the
//!   database.
//! - `Resolved { id, owner: None }`: loaded from the database; the owner is
//!   verified by an exact-value lookup on first use.
//! - `Ambiguous`: more than one entity has this hash. Every resolution goes
//!   through the overflow map or the [`Authority`].
//!
//! A slot only ever moves from `Resolved` to `Ambiguous`. Ids handed out to
//! colliding entities are kept in an overflow map keyed by fingerprint, so an
//! entity resolved twice in one batch (before its row is committed) gets the
//! same id both times.
//!
//! # Lifecycle
//!
//! The cache is empty until first used, then loads every `(hash, id)` pair
//! from the table. [`IdCache::invalidate`] drops everything except the id
//! high-water mark, so ids are never reused even after a rollback.

use std::collections::HashMap;
use std::sync::Mutex;

use trestle_core::{Fingerprint, Node, Triple};

use crate::error::StorageError;
use crate::lock::acquire_lock;

/// An entity with content identity.
pub trait Identified {
    fn fingerprint(&self) -> Fingerprint;

    fn content_hash(&self) -> u32 {
        self.fingerprint().content_hash()
    }
}

impl Identified for Node {
    fn fingerprint(&self) -> Fingerprint {
        Node::fingerprint(self)
    }
}

impl Identified for Triple {
    fn fingerprint(&self) -> Fingerprint {
        Triple::fingerprint(self)
    }
}

/// Authoritative access to the persisted rows behind a cache.
pub trait Authority<E: ?Sized> {
    /// Every persisted `(hash, id)` pair.
    fn scan(&self) -> Result<Vec<(u32, i64)>, StorageError>;

    /// The id of the row holding exactly `entity`, if any.
    fn find(&self, entity: &E) -> Result<Option<i64>, StorageError>;
}

/// State of one hash slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEntry {
    Resolved {
        id: i64,
        owner: Option<Fingerprint>,
    },
    Ambiguous,
}

/// Outcome of [`IdCache::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub id: i64,
    /// `true` if the id was newly assigned and the caller must insert the row.
    pub created: bool,
}

#[derive(Debug)]
struct CacheState {
    loaded: bool,
    slots: HashMap<u32, CacheEntry>,
    overflow: HashMap<Fingerprint, i64>,
    next_id: i64,
}

impl CacheState {
    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn ensure_loaded<E: ?Sized>(
        &mut self,
        table: &str,
        authority: &dyn Authority<E>,
    ) -> Result<(), StorageError> {
        if self.loaded {
            return Ok(());
        }
        let rows = authority.scan().map_err(|e| authority_failure(table, e))?;
        let mut max_id = 0;
        let mut duplicates = 0usize;
        for (hash, id) in rows {
            max_id = max_id.max(id);
            match self.slots.get(&hash) {
                None => {
                    self.slots
                        .insert(hash, CacheEntry::Resolved { id, owner: None });
                }
                Some(CacheEntry::Resolved { .. }) => {
                    self.slots.insert(hash, CacheEntry::Ambiguous);
                    duplicates += 1;
                }
                Some(CacheEntry::Ambiguous) => duplicates += 1,
            }
        }
        self.next_id = self.next_id.max(max_id + 1).max(1);
        self.loaded = true;
        tracing::debug!(
            table,
            slots = self.slots.len(),
            duplicates,
            next_id = self.next_id,
            "id cache loaded"
        );
        Ok(())
    }

    /// Makes `hash` ambiguous, moving a known owner's id to the overflow map.
    fn demote(&mut self, table: &str, hash: u32) {
        if let Some(CacheEntry::Resolved { id, owner }) = self.slots.get(&hash).copied() {
            if let Some(owner) = owner {
                self.overflow.insert(owner, id);
            }
            tracing::warn!(table, hash, "content hash collision; slot is now ambiguous");
        }
        self.slots.insert(hash, CacheEntry::Ambiguous);
    }
}

fn authority_failure(table: &str, err: StorageError) -> StorageError {
    match err {
        StorageError::Integrity { .. } => err,
        other => StorageError::integrity(format!("{} lookup failed: {}", table, other)),
    }
}

/// Thread-safe hash → id cache for one entity table.
#[derive(Debug)]
pub struct IdCache {
    table: &'static str,
    state: Mutex<CacheState>,
}

impl IdCache {
    /// Creates an empty, unloaded cache. `table` names the cached table in
    /// logs and errors.
    pub fn new(table: &'static str) -> Self {
        IdCache {
            table,
            state: Mutex::new(CacheState {
                loaded: false,
                slots: HashMap::new(),
                overflow: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Returns the id for `entity`, assigning a new one if it has no row yet.
    ///
    /// The cache lock is held across authority calls, so concurrent callers
    /// resolving the same entity agree on its id.
    pub fn resolve<E: Identified + ?Sized>(
        &self,
        entity: &E,
        authority: &dyn Authority<E>,
    ) -> Result<Resolution, StorageError> {
        let mut state = acquire_lock(&self.state);
        state.ensure_loaded(self.table, authority)?;

        let hash = entity.content_hash();
        let fingerprint = entity.fingerprint();

        let entry = match state.slots.get(&hash).copied() {
            None => {
                let id = state.allocate();
                state.slots.insert(
                    hash,
                    CacheEntry::Resolved {
                        id,
                        owner: Some(fingerprint),
                    },
                );
                return Ok(Resolution { id, created: true });
            }
            Some(CacheEntry::Resolved {
                id,
                owner: Some(owner),
            }) if owner == fingerprint => {
                return Ok(Resolution { id, created: false });
            }
            Some(entry) => entry,
        };

        if let Some(&id) = state.overflow.get(&fingerprint) {
            return Ok(Resolution { id, created: false });
        }

        let found = authority
            .find(entity)
            .map_err(|e| authority_failure(self.table, e))?;

        match (entry, found) {
            // First use of a slot loaded from the database: confirm ownership.
            (CacheEntry::Resolved { id, owner: None }, Some(found)) if id == found => {
                state.slots.insert(
                    hash,
                    CacheEntry::Resolved {
                        id,
                        owner: Some(fingerprint),
                    },
                );
                Ok(Resolution { id, created: false })
            }
            (_, Some(found)) => {
                state.demote(self.table, hash);
                state.overflow.insert(fingerprint, found);
                Ok(Resolution {
                    id: found,
                    created: false,
                })
            }
            (_, None) => {
                state.demote(self.table, hash);
                let id = state.allocate();
                state.overflow.insert(fingerprint, id);
                Ok(Resolution { id, created: true })
            }
        }
    }

    /// Returns the id for `entity` without assigning one.
    pub fn lookup<E: Identified + ?Sized>(
        &self,
        entity: &E,
        authority: &dyn Authority<E>,
    ) -> Result<Option<i64>, StorageError> {
        let mut state = acquire_lock(&self.state);
        state.ensure_loaded(self.table, authority)?;

        let hash = entity.content_hash();
        let fingerprint = entity.fingerprint();

        let entry = match state.slots.get(&hash).copied() {
            None => return Ok(None),
            Some(CacheEntry::Resolved {
                id,
                owner: Some(owner),
            }) if owner == fingerprint => return Ok(Some(id)),
            Some(entry) => entry,
        };

        if let Some(&id) = state.overflow.get(&fingerprint) {
            return Ok(Some(id));
        }

        let found = authority
            .find(entity)
            .map_err(|e| authority_failure(self.table, e))?;
        match (entry, found) {
            (CacheEntry::Resolved { id, owner: None }, Some(found)) if id == found => {
                state.slots.insert(
                    hash,
                    CacheEntry::Resolved {
                        id,
                        owner: Some(fingerprint),
                    },
                );
            }
            (CacheEntry::Resolved { .. }, Some(found)) => {
                state.demote(self.table, hash);
                state.overflow.insert(fingerprint, found);
            }
            _ => {}
        }
        Ok(found)
    }

    /// Registers an id read back from the database for `entity`.
    ///
    /// Ignored (apart from the high-water mark) until the cache is loaded,
    /// since loading will pick the row up anyway.
    pub fn record<E: Identified + ?Sized>(&self, entity: &E, id: i64) {
        let mut state = acquire_lock(&self.state);
        state.next_id = state.next_id.max(id + 1);
        if !state.loaded {
            return;
        }

        let hash = entity.content_hash();
        let fingerprint = entity.fingerprint();
        match state.slots.get(&hash).copied() {
            None => {
                state.slots.insert(
                    hash,
                    CacheEntry::Resolved {
                        id,
                        owner: Some(fingerprint),
                    },
                );
            }
            Some(CacheEntry::Resolved {
                id: existing,
                owner,
            }) if existing == id && owner.map_or(true, |o| o == fingerprint) => {
                state.slots.insert(
                    hash,
                    CacheEntry::Resolved {
                        id,
                        owner: Some(fingerprint),
                    },
                );
            }
            Some(_) => {
                state.demote(self.table, hash);
                state.overflow.insert(fingerprint, id);
            }
        }
    }

    /// Drops every slot so the next use reloads from the database.
    ///
    /// Keeps the id high-water mark: ids handed out for rolled-back rows are
    /// not reused.
    pub fn invalidate(&self) {
        let mut state = acquire_lock(&self.state);
        state.loaded = false;
        state.slots.clear();
        state.overflow.clear();
        tracing::debug!(table = self.table, "id cache invalidated");
    }

    /// Same as [`invalidate`](Self::invalidate); used when a store closes.
    pub fn clear(&self) {
        self.invalidate();
    }

    /// Number of hash slots.
    pub fn len(&self) -> usize {
        acquire_lock(&self.state).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loaded(&self) -> bool {
        acquire_lock(&self.state).loaded
    }

    /// Current state of the slot for `hash`.
    pub fn entry(&self, hash: u32) -> Option<CacheEntry> {
        acquire_lock(&self.state).slots.get(&hash).copied()
    }

    /// The next id this cache would assign.
    pub fn next_id(&self) -> i64 {
        acquire_lock(&self.state).next_id
    }
}
