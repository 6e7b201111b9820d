//! Connection and transaction handling.
//!
//! A [`Connector`] knows how to reach the database; each calling context asks
//! it for its own [`Session`] and passes that session explicitly to the store
//! operations it calls. Sessions are never shared between threads.
//!
//! # State machine
//!
//! ```text
//!   Closed --open()--> Open --(transactions on)--> InTransaction
//!      ^                                               |
//!      +------------ close(force) / close_with --------+
//! ```
//!
//! `keep_open` is orthogonal: a session opened with it survives plain
//! `close(false)` calls, which lets one outer operation drive many inner
//! operations that each open and close the session themselves. Only a forced
//! close or a rollback ends it.
//!
//! A connector may carry a [`RollbackHook`]. Every session it creates calls
//! the hook when its work is discarded: on a requested rollback, on a failed
//! commit, and on drop with a transaction still open. The hook runs before
//! the rollback releases the write lock.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;

use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::schema;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
    InTransaction,
}

/// Callback run when a session's writes are discarded.
#[derive(Clone)]
pub struct RollbackHook(Arc<dyn Fn() + Send + Sync>);

impl RollbackHook {
    pub fn new(hook: impl Fn() + Send + Sync + 'static) -> Self {
        RollbackHook(Arc::new(hook))
    }
}

impl fmt::Debug for RollbackHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RollbackHook")
    }
}

/// Creates sessions against one database.
#[derive(Debug, Clone)]
pub struct Connector {
    path: PathBuf,
    transactions: bool,
    busy_timeout: Duration,
    on_rollback: Option<RollbackHook>,
}

impl Connector {
    pub fn new(config: &StoreConfig) -> Self {
        Connector {
            path: config.path.clone(),
            transactions: config.transactions,
            busy_timeout: config.busy_timeout,
            on_rollback: None,
        }
    }

    /// Sessions created from now on call `hook` when they discard work.
    pub fn with_rollback_hook(mut self, hook: RollbackHook) -> Self {
        self.on_rollback = Some(hook);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether sessions wrap their work in a transaction.
    pub fn transactions(&self) -> bool {
        self.transactions
    }

    /// A new, closed session.
    pub fn session(&self) -> Session {
        Session {
            connector: self.clone(),
            conn: None,
            in_tx: false,
            keep_open: false,
        }
    }

    /// Brings the schema up to date.
    pub fn migrate(&self) -> Result<(), StorageError> {
        let mut conn = schema::connect(&self.path, self.busy_timeout)?;
        schema::migrate(&mut conn)
    }
}

/// One calling context's connection and transaction.
#[derive(Debug)]
pub struct Session {
    connector: Connector,
    conn: Option<Connection>,
    in_tx: bool,
    keep_open: bool,
}

impl Session {
    /// Connects if needed and begins a transaction if transactions are
    /// enabled and none is active.
    ///
    /// Transactions start with `BEGIN IMMEDIATE`, so the write lock is held
    /// from the start.
    pub fn open(&mut self, keep_open: bool) -> Result<(), StorageError> {
        if self.conn.is_none() {
            let conn = schema::connect(&self.connector.path, self.connector.busy_timeout)?;
            self.conn = Some(conn);
        }
        if self.connector.transactions && !self.in_tx {
            self.connection()?
                .execute_batch("BEGIN IMMEDIATE")
                .map_err(|source| StorageError::Transaction {
                    action: "begin",
                    source,
                })?;
            self.in_tx = true;
        }
        if keep_open {
            self.keep_open = true;
        }
        Ok(())
    }

    /// Commits and disconnects, unless the session is kept open and `force`
    /// is not set.
    pub fn close(&mut self, force: bool) -> Result<(), StorageError> {
        self.close_with(force, false)
    }

    /// Ends the session, committing or (with `rollback`) rolling back the
    /// active transaction.
    ///
    /// A kept-open session is left alone unless `force` or `rollback` is set.
    /// The connection is dropped even if the commit fails; SQLite then rolls
    /// the transaction back.
    pub fn close_with(&mut self, force: bool, rollback: bool) -> Result<(), StorageError> {
        if self.keep_open && !force && !rollback {
            return Ok(());
        }

        let mut result = Ok(());
        if let Some(conn) = &self.conn {
            if rollback {
                self.discarded();
            }
            if self.in_tx {
                let (action, sql) = if rollback {
                    ("rollback", "ROLLBACK")
                } else {
                    ("commit", "COMMIT")
                };
                result = conn
                    .execute_batch(sql)
                    .map_err(|source| StorageError::Transaction { action, source });
                if result.is_err() && !rollback {
                    self.discarded();
                }
            }
        }

        self.in_tx = false;
        self.keep_open = false;
        self.conn = None;
        result
    }

    /// The open connection.
    pub fn connection(&self) -> Result<&Connection, StorageError> {
        self.conn.as_ref().ok_or(StorageError::SessionClosed)
    }

    pub fn state(&self) -> SessionState {
        match (&self.conn, self.in_tx) {
            (None, _) => SessionState::Closed,
            (Some(_), false) => SessionState::Open,
            (Some(_), true) => SessionState::InTransaction,
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn keep_open(&self) -> bool {
        self.keep_open
    }

    fn discarded(&self) {
        if let Some(hook) = &self.connector.on_rollback {
            (hook.0)();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.in_tx {
            if let Err(e) = self.close_with(true, true) {
                tracing::warn!(error = %e, "rollback on session drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(transactions: bool) -> (tempfile::TempDir, Connector) {
        let dir = tempfile::tempdir().unwrap();
        let config =
            StoreConfig::new(dir.path().join("session.db")).with_transactions(transactions);
        let connector = Connector::new(&config);
        connector.migrate().unwrap();
        (dir, connector)
    }

    fn graph_count(connector: &Connector) -> i64 {
        let mut session = connector.session();
        session.open(false).unwrap();
        let count = session
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM graphs", [], |row| row.get(0))
            .unwrap();
        session.close(true).unwrap();
        count
    }

    fn insert_graph(session: &Session, uri: &str) {
        session
            .connection()
            .unwrap()
            .execute(
                "INSERT INTO graphs (graph_uri, graph_hash) VALUES (?1, 0)",
                [uri],
            )
            .unwrap();
    }

    #[test]
    fn test_state_transitions() {
        let (_dir, connector) = setup(true);
        let mut session = connector.session();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.connection(),
            Err(StorageError::SessionClosed)
        ));

        session.open(false).unwrap();
        assert_eq!(session.state(), SessionState::InTransaction);
        // Re-opening does not begin a nested transaction.
        session.open(false).unwrap();
        assert_eq!(session.state(), SessionState::InTransaction);

        session.close(false).unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_without_transactions_stays_open() {
        let (_dir, connector) = setup(false);
        let mut session = connector.session();
        session.open(false).unwrap();
        assert_eq!(session.state(), SessionState::Open);
        insert_graph(&session, "http://example.org/g");
        session.close(false).unwrap();
        assert_eq!(graph_count(&connector), 1);
    }

    #[test]
    fn test_keep_open_survives_plain_close() {
        let (_dir, connector) = setup(true);
        let mut session = connector.session();
        session.open(true).unwrap();
        insert_graph(&session, "http://example.org/a");

        // Inner operation opens and closes without force.
        session.open(false).unwrap();
        session.close(false).unwrap();
        assert!(session.is_open());
        assert!(session.keep_open());

        session.close(true).unwrap();
        assert!(!session.is_open());
        assert!(!session.keep_open());
        assert_eq!(graph_count(&connector), 1);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let (_dir, connector) = setup(true);
        let mut session = connector.session();
        session.open(true).unwrap();
        insert_graph(&session, "http://example.org/a");
        session.close_with(false, true).unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(graph_count(&connector), 0);
    }

    #[test]
    fn test_rollback_hook_fires_on_discard_only() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (_dir, connector) = setup(true);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let connector = connector.with_rollback_hook(RollbackHook::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut session = connector.session();
        session.open(false).unwrap();
        session.close(false).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        session.open(false).unwrap();
        session.close_with(true, true).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        {
            let mut dropped = connector.session();
            dropped.open(false).unwrap();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        // Nothing to discard on a closed session.
        session.close_with(true, true).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_rolls_back() {
        let (_dir, connector) = setup(true);
        {
            let mut session = connector.session();
            session.open(false).unwrap();
            insert_graph(&session, "http://example.org/a");
        }
        assert_eq!(graph_count(&connector), 0);
    }
}
