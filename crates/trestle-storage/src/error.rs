//! Storage error types for trestle-storage.
//!
//! [`StorageError`] covers the failure modes of the engine: connecting to
//! the backing store, missing rows that must exist, commit/rollback
//! failures, and the background writer's lifecycle. Facade operations wrap
//! the underlying failure in [`StorageError::Operation`] so callers can see
//! which high-level call failed while still reaching the cause.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use trestle_core::CoreError;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store could not be opened or configured.
    #[error("cannot connect to store at {}: {source}", .path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A row the engine relies on is missing or inconsistent.
    #[error("integrity error: {reason}")]
    Integrity { reason: String },

    /// Beginning, committing or rolling back a transaction failed.
    #[error("transaction {action} failed: {source}")]
    Transaction {
        action: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Any other SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// Invalid RDF input.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store configuration is unusable.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A statement was issued on a session with no open connection.
    #[error("session has no open connection")]
    SessionClosed,

    /// The background writer has been shut down.
    #[error("background writer has been stopped; set preserve_state to reuse a store after close")]
    WriterStopped,

    /// The background writer thread could not be started.
    #[error("cannot start background writer: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// A background batch was rolled back.
    #[error("background batch of {entries} write(s) was rolled back: {source}")]
    BatchFailed {
        entries: usize,
        #[source]
        source: Arc<StorageError>,
    },

    /// A facade operation failed; its session was rolled back and closed.
    #[error("{operation} failed: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    pub(crate) fn integrity(reason: impl Into<String>) -> Self {
        StorageError::Integrity {
            reason: reason.into(),
        }
    }

    /// Strips [`StorageError::Operation`] and [`StorageError::BatchFailed`]
    /// wrappers.
    pub fn root_cause(&self) -> &StorageError {
        match self {
            StorageError::Operation { source, .. } => source.root_cause(),
            StorageError::BatchFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
