use super::{Database, quote_ident};
use crate::core::{MigrationError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::time::Duration;
use uuid::Uuid;

/// How long a lock row stays valid before another run may take it over.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60 * 60);

/// Exclusive advisory lock held for the duration of a mutating run.
///
/// Backed by a single-row table: whoever owns the row owns the lock. The row
/// is a lease; once `acquired_at + ttl` has passed, the next `acquire` takes
/// it over, so a killed process cannot block migrations forever.
///
/// Call [`release`](Self::release) when done. Dropping the handle without
/// releasing deletes the row if the connection is free at that moment.
#[derive(Debug)]
pub struct MigrationLock {
    db: Database,
    table: String,
    holder: String,
    released: bool,
}

enum Attempt {
    Acquired,
    TookOver { previous: String, since: String },
    Held { holder: String, since: String },
}

fn is_expired(since: &str, ttl: Duration, now: DateTime<Utc>) -> bool {
    let Ok(since) = DateTime::parse_from_rfc3339(since) else {
        // unreadable timestamps cannot hold anyone off
        return true;
    };
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => since.with_timezone(&Utc) + ttl <= now,
        Err(_) => false,
    }
}

impl MigrationLock {
    /// Take the lock or fail with [`MigrationError::Lock`] naming the current holder.
    ///
    /// An existing row older than `ttl` is treated as abandoned and taken over.
    pub async fn acquire(db: &Database, table: &str, ttl: Duration) -> Result<Self> {
        let holder = Uuid::new_v4().to_string();
        let quoted = quote_ident(table);
        let now = Utc::now();
        let stamp = now.to_rfc3339();

        let attempt = db
            .with_transaction(|tx| {
                tx.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        id INTEGER PRIMARY KEY CHECK (id = 1),
                        holder TEXT NOT NULL,
                        acquired_at TEXT NOT NULL
                    )",
                    quoted
                ))?;
                let inserted = tx.execute(
                    &format!(
                        "INSERT OR IGNORE INTO {} (id, holder, acquired_at) VALUES (1, ?1, ?2)",
                        quoted
                    ),
                    params![holder, stamp],
                )?;
                if inserted == 1 {
                    return Ok(Attempt::Acquired);
                }

                let (current, since): (String, String) = tx
                    .query_row(
                        &format!("SELECT holder, acquired_at FROM {} WHERE id = 1", quoted),
                        [],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?
                    .unwrap_or_default();
                if !is_expired(&since, ttl, now) {
                    return Ok(Attempt::Held { holder: current, since });
                }

                tx.execute(
                    &format!(
                        "UPDATE {} SET holder = ?1, acquired_at = ?2 WHERE id = 1 AND holder = ?3",
                        quoted
                    ),
                    params![holder, stamp, current],
                )?;
                Ok(Attempt::TookOver { previous: current, since })
            })
            .await?;

        match attempt {
            Attempt::Held { holder, since } => {
                return Err(MigrationError::Lock(format!(
                    "migrations are locked by {} since {}",
                    holder, since
                )));
            }
            Attempt::TookOver { previous, since } => {
                tracing::warn!(%previous, %since, "taking over expired migration lock");
            }
            Attempt::Acquired => {}
        }

        tracing::debug!(%holder, table, "acquired migration lock");
        Ok(Self {
            db: db.clone(),
            table: table.to_string(),
            holder,
            released: false,
        })
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    fn delete_own_row(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            &format!("DELETE FROM {} WHERE id = 1 AND holder = ?1", quote_ident(&self.table)),
            params![self.holder],
        )?;
        Ok(())
    }

    /// Drop the lock row if this handle still owns it.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.db.read(|conn| self.delete_own_row(conn)).await?;
        tracing::debug!(holder = %self.holder, "released migration lock");
        Ok(())
    }

    /// Remove the lock row whoever holds it. Returns the evicted holder.
    ///
    /// Operator escape hatch for a lock left behind by a crashed run.
    pub async fn force_release(db: &Database, table: &str) -> Result<Option<String>> {
        let quoted = quote_ident(table);
        db.with_transaction(|tx| {
            let exists: i64 = tx.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Ok(None);
            }
            let holder: Option<String> = tx
                .query_row(&format!("SELECT holder FROM {} WHERE id = 1", quoted), [], |row| {
                    row.get(0)
                })
                .optional()?;
            tx.execute(&format!("DELETE FROM {}", quoted), [])?;
            Ok(holder)
        })
        .await
    }
}

impl Drop for MigrationLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Cancelled or panicking run: no way to await here, so only try once.
        match self.db.try_now(|conn| self.delete_own_row(conn)) {
            Some(Ok(())) => tracing::debug!(holder = %self.holder, "released migration lock on drop"),
            Some(Err(err)) => {
                tracing::warn!(holder = %self.holder, error = %err, "failed to release migration lock on drop")
            }
            None => tracing::warn!(
                holder = %self.holder,
                "migration lock dropped while the connection was busy; it expires after its ttl"
            ),
        }
    }
}
