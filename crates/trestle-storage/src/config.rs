//! Store configuration.
//!
//! [`StoreConfig`] can be built in code or read from the environment:
//! - `TRESTLE_DB_PATH`: SQLite database file path (default: "trestle.db")
//! - `TRESTLE_BATCH_SIZE`: writes per background batch (default: 1000)
//! - `TRESTLE_TRANSACTIONS`: wrap each batch in a transaction (default: true)
//! - `TRESTLE_PRESERVE_STATE`: keep the writer and caches alive across
//!   `close()` (default: false)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for a [`SqliteStore`](crate::sqlite::SqliteStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Entries the worker writes per transaction. Must be at least 1.
    pub batch_size: usize,
    pub transactions: bool,
    pub preserve_state: bool,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            path: path.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            transactions: true,
            preserve_state: false,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Reads the configuration from `TRESTLE_*` environment variables.
    pub fn from_env() -> Result<Self, StorageError> {
        let path = std::env::var("TRESTLE_DB_PATH").unwrap_or_else(|_| "trestle.db".to_string());
        let mut config = StoreConfig::new(path);

        if let Ok(raw) = std::env::var("TRESTLE_BATCH_SIZE") {
            config.batch_size = raw.trim().parse().map_err(|_| StorageError::InvalidConfig {
                reason: format!("TRESTLE_BATCH_SIZE is not a number: '{}'", raw),
            })?;
        }
        if let Ok(raw) = std::env::var("TRESTLE_TRANSACTIONS") {
            config.transactions = parse_flag("TRESTLE_TRANSACTIONS", &raw)?;
        }
        if let Ok(raw) = std::env::var("TRESTLE_PRESERVE_STATE") {
            config.preserve_state = parse_flag("TRESTLE_PRESERVE_STATE", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_transactions(mut self, transactions: bool) -> Self {
        self.transactions = transactions;
        self
    }

    pub fn with_preserve_state(mut self, preserve_state: bool) -> Self {
        self.preserve_state = preserve_state;
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.batch_size == 0 {
            return Err(StorageError::InvalidConfig {
                reason: "batch_size must be at least 1".into(),
            });
        }
        if self.path.as_os_str().is_empty() {
            return Err(StorageError::InvalidConfig {
                reason: "database path is empty".into(),
            });
        }
        Ok(())
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, StorageError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StorageError::InvalidConfig {
            reason: format!("{} must be a boolean, got '{}'", name, raw),
        }),
    }
}
