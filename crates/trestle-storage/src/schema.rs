//! Schema migrations and connection setup for the SQLite backend.
//!
//! Uses `rusqlite_migration` to manage schema migrations via SQLite's
//! `user_version` pragma. Migrations are embedded at compile time via
//! `include_str!`.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::error::StorageError;

/// URI under which the default (unnamed) graph is stored.
pub const DEFAULT_GRAPH_URI: &str = "urn:trestle:default-graph";

/// All schema migrations, applied in order via `user_version` tracking.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!("migrations/001_initial_schema.sql"))])
}

/// Opens a connection to `path` and applies connection pragmas.
///
/// Does not run migrations; see [`migrate`].
pub fn connect(path: &Path, busy_timeout: Duration) -> Result<Connection, StorageError> {
    let conn = Connection::open(path).map_err(|source| StorageError::Connection {
        path: path.to_path_buf(),
        source,
    })?;
    configure(&conn, busy_timeout).map_err(|source| StorageError::Connection {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(conn)
}

fn configure(conn: &Connection, busy_timeout: Duration) -> Result<(), rusqlite::Error> {
    // journal_mode reports the resulting mode as a row.
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// Applies pending migrations.
pub fn migrate(conn: &mut Connection) -> Result<(), StorageError> {
    migrations()
        .to_latest(conn)
        .map_err(|e| StorageError::Migration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn test_connect_and_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.db");
        let mut conn = connect(&path, Duration::from_secs(1)).unwrap();
        migrate(&mut conn).unwrap();
        // Second run is a no-op.
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for expected in [
            "graph_triples",
            "graphs",
            "namespaces",
            "nodes",
            "ns_prefixes",
            "ns_uris",
            "triples",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_connect_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nested").join("x.db");
        assert!(matches!(
            connect(&path, Duration::from_secs(1)),
            Err(StorageError::Connection { .. })
        ));
    }
}
