pub mod config;
pub mod lock;

use crate::core::{MigrationError, Result};
use config::{ConnectionConfig, DatabaseLocation};
use rusqlite::{Connection, OpenFlags, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;

pub use lock::MigrationLock;

/// Shared handle to the target database
///
/// Cloning is cheap; every clone talks to the same connection. Access is
/// serialized through an async mutex so the engine API can stay `async`
/// while `rusqlite` remains synchronous underneath.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    label: String,
}

impl Database {
    /// Open the database described by `config`
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        config.validate().map_err(MigrationError::Connection)?;

        let conn = match &config.location {
            DatabaseLocation::Memory => Connection::open_in_memory(),
            DatabaseLocation::File(path) => {
                let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                if config.create_if_missing {
                    flags |= OpenFlags::SQLITE_OPEN_CREATE;
                }
                Connection::open_with_flags(path, flags)
            }
        }
        .map_err(|e| {
            MigrationError::Connection(format!("Failed to open {}: {}", config.to_url(), e))
        })?;

        conn.busy_timeout(config.busy_timeout)
            .map_err(|e| MigrationError::Connection(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", config.foreign_keys)
            .map_err(|e| MigrationError::Connection(e.to_string()))?;

        tracing::debug!(url = %config.to_url(), "opened database");
        Ok(Self::from_connection(conn, config.to_url()))
    }

    /// Fresh private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&ConnectionConfig::in_memory())
    }

    /// Wrap an already opened connection
    pub fn from_connection(conn: Connection, label: impl Into<String>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            label: label.into(),
        }
    }

    /// Where this handle points, for log lines
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run a batch of statements outside any explicit transaction
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run a read-only closure against the connection
    pub async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().await;
        f(&conn)
    }

    /// Run `f` right away if nobody holds the connection, `None` otherwise.
    ///
    /// For synchronous contexts such as `Drop` that cannot await the lock.
    pub fn try_now<T, F>(&self, f: F) -> Option<Result<T>>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.try_lock().ok()?;
        Some(f(&conn))
    }

    /// Run `f` inside one transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. The returned
    /// error is the one produced by `f`.
    pub async fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("label", &self.label).finish()
    }
}

/// Quote an identifier for interpolation into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
