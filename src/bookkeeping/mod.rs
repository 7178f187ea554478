//! Record of applied migrations, kept in a table inside the target database.

use crate::connection::{Database, quote_ident};
use crate::core::{MigrationError, Result, compare_versions};
use crate::registry::Migration;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BOOKKEEPING_TABLE: &str = "schema_migrations";

/// One successfully applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: String,
    pub name: String,
    pub applied_at: DateTime<Utc>,
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl MigrationRecord {
    pub fn new(migration: &Migration, runtime_version: Option<&str>) -> Self {
        Self {
            version: migration.version.clone(),
            name: migration.name.clone(),
            applied_at: Utc::now(),
            checksum: migration.checksum.clone(),
            runtime_version: runtime_version.map(str::to_string),
            execution_time_ms: None,
        }
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }
}

/// Accessor for the bookkeeping table.
///
/// Reads never create the table; a missing table means nothing is applied.
/// Writes take the caller's open transaction so that a schema change and its
/// record commit together.
#[derive(Debug, Clone)]
pub struct BookkeepingStore {
    table: String,
}

impl Default for BookkeepingStore {
    fn default() -> Self {
        Self::new(DEFAULT_BOOKKEEPING_TABLE)
    }
}

impl BookkeepingStore {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of the advisory lock table paired with this store.
    pub fn lock_table_name(&self) -> String {
        format!("{}_lock", self.table)
    }

    fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                checksum TEXT NOT NULL,
                applied_at TEXT NOT NULL,
                runtime_version TEXT,
                execution_time_ms INTEGER
            )",
            quote_ident(&self.table)
        )
    }

    pub async fn ensure_table(&self, db: &Database) -> Result<()> {
        db.execute_batch(&self.create_sql()).await
    }

    fn exists_in(&self, conn: &Connection) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![self.table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Applied records in natural version order.
    pub async fn applied_records(&self, db: &Database) -> Result<Vec<MigrationRecord>> {
        db.read(|conn| self.load_records(conn)).await
    }

    pub fn load_records(&self, conn: &Connection) -> Result<Vec<MigrationRecord>> {
        if !self.exists_in(conn)? {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT version, name, checksum, applied_at, runtime_version, execution_time_ms FROM {}",
            quote_ident(&self.table)
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<i64>>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (version, name, checksum, applied_at, runtime_version, execution_time_ms) = row?;
            let applied_at = DateTime::parse_from_rfc3339(&applied_at)
                .map_err(|e| {
                    MigrationError::Serialization(format!(
                        "bad applied_at '{}' for migration {}: {}",
                        applied_at, version, e
                    ))
                })?
                .with_timezone(&Utc);
            records.push(MigrationRecord {
                version,
                name,
                applied_at,
                checksum,
                runtime_version,
                execution_time_ms: execution_time_ms.and_then(|ms| u64::try_from(ms).ok()),
            });
        }

        records.sort_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(records)
    }

    pub async fn applied_versions(&self, db: &Database) -> Result<Vec<String>> {
        Ok(self
            .applied_records(db)
            .await?
            .into_iter()
            .map(|r| r.version)
            .collect())
    }

    /// Highest applied version, `None` for a fresh database.
    pub async fn current_version(&self, db: &Database) -> Result<Option<String>> {
        Ok(self.applied_versions(db).await?.pop())
    }

    /// Insert a record inside the step transaction.
    pub fn record_applied(&self, conn: &Connection, record: &MigrationRecord) -> Result<()> {
        conn.execute_batch(&self.create_sql())?;
        conn.execute(
            &format!(
                "INSERT INTO {} (version, name, checksum, applied_at, runtime_version, execution_time_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                quote_ident(&self.table)
            ),
            params![
                record.version,
                record.name,
                record.checksum,
                record.applied_at.to_rfc3339(),
                record.runtime_version,
                record.execution_time_ms.map(|ms| ms as i64),
            ],
        )?;
        Ok(())
    }

    /// Delete a record inside the step transaction.
    pub fn remove_record(&self, conn: &Connection, version: &str) -> Result<()> {
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE version = ?1", quote_ident(&self.table)),
            params![version],
        )?;
        if removed == 0 {
            return Err(MigrationError::Integrity(format!(
                "no bookkeeping record for version {}",
                version
            )));
        }
        Ok(())
    }
}
