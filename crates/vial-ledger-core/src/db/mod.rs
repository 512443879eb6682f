//! Database layer for the vial ledger.

mod drugs;
mod lots;
mod reference;
mod schema;
mod usage;

pub use schema::*;
#[allow(unused_imports)]
pub use drugs::*;
#[allow(unused_imports)]
pub use lots::*;
#[allow(unused_imports)]
pub use reference::*;
#[allow(unused_imports)]
pub use usage::*;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use thiserror::Error;

use crate::config::LedgerConfig;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
    config: LedgerConfig,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::open_with_config(path, LedgerConfig::default())
    }

    /// Open database at path with explicit configuration.
    ///
    /// The configuration is sanitized first.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: LedgerConfig) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            config: config.sanitized(),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open_in_memory_with_config(LedgerConfig::default())
    }

    /// Create in-memory database with explicit configuration.
    pub fn open_in_memory_with_config(config: LedgerConfig) -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            config: config.sanitized(),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize connection settings and schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn
            .busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))?;
        self.conn.execute_batch(SCHEMA)?;
        tracing::debug!(
            busy_timeout_ms = self.config.busy_timeout_ms,
            "vial ledger schema initialized"
        );
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Active configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Begin a write transaction that takes the database write lock up front.
    ///
    /// Every statement issued through this `Database` until the returned
    /// transaction is committed or dropped runs inside it. Dropping without
    /// commit rolls back.
    pub fn begin_immediate(&self) -> DbResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}
