//! Normalized, checksummed view of the live schema.

pub mod catalog;
pub mod replay;

use crate::core::sha256_hex;
use serde::{Deserialize, Serialize};

pub use catalog::SchemaInspector;
pub use replay::replay_state;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
    /// `table(column)` this column references, if any
    pub foreign_key: Option<String>,
}

impl ColumnInfo {
    fn canonical(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            self.name,
            self.data_type,
            self.nullable,
            self.default_value.as_deref().unwrap_or(""),
            self.primary_key,
            self.foreign_key.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    /// In declaration order
    pub columns: Vec<ColumnInfo>,
    pub checksum: String,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        let name = name.into();
        let mut canonical = name.clone();
        for column in &columns {
            canonical.push('|');
            canonical.push_str(&column.canonical());
        }
        Self {
            checksum: sha256_hex(canonical.as_bytes()),
            name,
            columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    /// Normalized `CREATE INDEX` text; absent for implicit indexes
    pub definition: Option<String>,
    pub checksum: String,
}

impl IndexInfo {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<String>,
        unique: bool,
        definition: Option<String>,
    ) -> Self {
        let name = name.into();
        let table = table.into();
        let canonical = format!(
            "{}|{}|{}|{}|{}",
            name,
            table,
            unique,
            columns.join(","),
            definition.as_deref().unwrap_or("")
        );
        Self {
            checksum: sha256_hex(canonical.as_bytes()),
            name,
            table,
            columns,
            unique,
            definition,
        }
    }
}

/// Routine-like catalog object. For SQLite these are views and triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub kind: String,
    pub definition: String,
    pub checksum: String,
}

impl FunctionInfo {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, definition: impl Into<String>) -> Self {
        let name = name.into();
        let kind = kind.into();
        let definition = definition.into();
        let canonical = format!("{}|{}|{}", kind, name, definition);
        Self {
            checksum: sha256_hex(canonical.as_bytes()),
            name,
            kind,
            definition,
        }
    }
}

/// Fingerprint of a schema.
///
/// Every list is sorted by name and the aggregate checksum covers sorted
/// `kind:name:checksum` entries, so enumeration order never changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaState {
    pub tables: Vec<TableInfo>,
    pub indexes: Vec<IndexInfo>,
    pub functions: Vec<FunctionInfo>,
    pub checksum: String,
}

impl SchemaState {
    pub fn new(
        mut tables: Vec<TableInfo>,
        mut indexes: Vec<IndexInfo>,
        mut functions: Vec<FunctionInfo>,
    ) -> Self {
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        functions.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.kind.cmp(&b.kind)));

        let checksum = aggregate_checksum(&tables, &indexes, &functions);
        Self {
            tables,
            indexes,
            functions,
            checksum,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Recompute every checksum from the raw catalog data, e.g. after
    /// loading from a file. Stored per-object checksums are ignored.
    pub fn recomputed_checksum(&self) -> String {
        let tables: Vec<_> = self
            .tables
            .iter()
            .map(|t| TableInfo::new(t.name.clone(), t.columns.clone()))
            .collect();
        let indexes: Vec<_> = self
            .indexes
            .iter()
            .map(|i| IndexInfo::new(i.name.clone(), i.table.clone(), i.columns.clone(), i.unique, i.definition.clone()))
            .collect();
        let functions: Vec<_> = self
            .functions
            .iter()
            .map(|f| FunctionInfo::new(f.name.clone(), f.kind.clone(), f.definition.clone()))
            .collect();
        Self::new(tables, indexes, functions).checksum
    }
}

fn aggregate_checksum(tables: &[TableInfo], indexes: &[IndexInfo], functions: &[FunctionInfo]) -> String {
    let mut parts: Vec<String> = tables
        .iter()
        .map(|t| format!("table:{}:{}", t.name, t.checksum))
        .chain(indexes.iter().map(|i| format!("index:{}:{}", i.name, i.checksum)))
        .chain(
            functions
                .iter()
                .map(|f| format!("function:{}:{}", f.name, f.checksum)),
        )
        .collect();
    parts.sort();
    sha256_hex(parts.join("|").as_bytes())
}
