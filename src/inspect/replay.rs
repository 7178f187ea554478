use super::{SchemaInspector, SchemaState};
use crate::core::{MigrationError, Result};
use crate::registry::Migration;
use rusqlite::Connection;

/// Expected schema after running `migrations` on an empty database.
///
/// The forward scripts are executed in the given order against a scratch
/// in-memory database, which is then inspected with `inspector`.
pub fn replay_state<'a, I>(migrations: I, inspector: &SchemaInspector) -> Result<SchemaState>
where
    I: IntoIterator<Item = &'a Migration>,
{
    let conn = Connection::open_in_memory()
        .map_err(|e| MigrationError::Connection(format!("scratch database: {}", e)))?;

    let mut replayed = 0usize;
    for migration in migrations {
        conn.execute_batch(&migration.up)
            .map_err(|e| MigrationError::execution(&migration.version, e))?;
        replayed += 1;
    }

    tracing::debug!(replayed, "replayed migrations into scratch database");
    inspector.inspect(&conn)
}
