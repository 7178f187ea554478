use super::{ColumnInfo, FunctionInfo, IndexInfo, SchemaState, TableInfo};
use crate::connection::Database;
use crate::core::{Result, normalize_sql};
use rusqlite::{Connection, params};
use std::collections::HashMap;

/// Reads the SQLite catalog into a [`SchemaState`].
///
/// Engine-owned tables (bookkeeping, lock) and `sqlite_*` internals are left
/// out so they never show up as drift.
#[derive(Debug, Clone, Default)]
pub struct SchemaInspector {
    excluded: Vec<String>,
}

impl SchemaInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn excluding<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: tables.into_iter().map(Into::into).collect(),
        }
    }

    fn is_excluded(&self, name: &str) -> bool {
        name.starts_with("sqlite_") || self.excluded.iter().any(|e| e.eq_ignore_ascii_case(name))
    }

    pub async fn schema_state(&self, db: &Database) -> Result<SchemaState> {
        db.read(|conn| self.inspect(conn)).await
    }

    pub fn inspect(&self, conn: &Connection) -> Result<SchemaState> {
        let mut tables = Vec::new();
        let mut indexes = Vec::new();
        let mut functions = Vec::new();

        let mut stmt = conn.prepare(
            "SELECT type, name, tbl_name, COALESCE(sql, '') FROM sqlite_master
             WHERE type IN ('table', 'index', 'view', 'trigger')
             ORDER BY name",
        )?;
        let objects: Vec<(String, String, String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<rusqlite::Result<_>>()?;

        let index_sql: HashMap<&str, &str> = objects
            .iter()
            .filter(|(kind, _, _, sql)| kind == "index" && !sql.is_empty())
            .map(|(_, name, _, sql)| (name.as_str(), sql.as_str()))
            .collect();

        for (kind, name, table, sql) in &objects {
            if self.is_excluded(name) || self.is_excluded(table) {
                continue;
            }
            match kind.as_str() {
                "table" => {
                    tables.push(TableInfo::new(name.clone(), self.columns(conn, name)?));
                    indexes.extend(self.indexes(conn, name, &index_sql)?);
                }
                "view" | "trigger" => {
                    functions.push(FunctionInfo::new(name.clone(), kind.clone(), normalize_sql(sql)));
                }
                _ => {}
            }
        }

        Ok(SchemaState::new(tables, indexes, functions))
    }

    fn columns(&self, conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
        let mut fk_stmt =
            conn.prepare("SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1)")?;
        let foreign_keys: HashMap<String, String> = fk_stmt
            .query_map(params![table], |row| {
                let from: String = row.get(0)?;
                let target: String = row.get(1)?;
                let to: Option<String> = row.get(2)?;
                Ok((from, format!("{}({})", target, to.unwrap_or_default())))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut stmt = conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let columns = stmt
            .query_map(params![table], |row| {
                let name: String = row.get(0)?;
                let data_type: String = row.get(1)?;
                let not_null: i64 = row.get(2)?;
                let default_value: Option<String> = row.get(3)?;
                let pk: i64 = row.get(4)?;
                Ok(ColumnInfo {
                    foreign_key: foreign_keys.get(&name).cloned(),
                    name,
                    data_type: data_type.to_uppercase(),
                    nullable: not_null == 0,
                    default_value,
                    primary_key: pk > 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(columns)
    }

    fn indexes(
        &self,
        conn: &Connection,
        table: &str,
        index_sql: &HashMap<&str, &str>,
    ) -> Result<Vec<IndexInfo>> {
        let mut list = conn.prepare("SELECT name, \"unique\" FROM pragma_index_list(?1)")?;
        let entries: Vec<(String, i64)> = list
            .query_map(params![table], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
        let mut out = Vec::with_capacity(entries.len());
        for (name, unique) in entries {
            let columns = info
                .query_map(params![name], |row| {
                    let column: Option<String> = row.get(0)?;
                    Ok(column.unwrap_or_else(|| "<expr>".to_string()))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let definition = index_sql.get(name.as_str()).map(|sql| normalize_sql(sql));
            out.push(IndexInfo::new(name, table, columns, unique != 0, definition));
        }
        Ok(out)
    }
}
