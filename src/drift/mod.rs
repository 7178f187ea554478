//! Drift detection and state validation.

pub mod health;
pub mod validate;

use crate::core::{MigrationError, Result};
use crate::inspect::SchemaState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub use health::{HealthStatus, evaluate_health};
pub use validate::{FileIssue, FileValidationReport, IntegrityReport, Severity, StateCertificate};

/// Where the expected schema comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Baseline {
    /// Replay the applied migrations into a scratch database
    Replay,
    /// A schema snapshot saved earlier with `save-baseline`
    Snapshot(PathBuf),
}

impl Baseline {
    pub fn label(&self) -> String {
        match self {
            Self::Replay => "registry replay".to_string(),
            Self::Snapshot(path) => format!("snapshot {}", path.display()),
        }
    }
}

/// Load a saved snapshot.
///
/// The stored aggregate is recomputed; a file whose checksum no longer
/// matches its contents was edited by hand and is rejected.
pub fn load_snapshot(path: &Path) -> Result<SchemaState> {
    let raw = fs::read_to_string(path)
        .map_err(|e| MigrationError::Io(format!("{}: {}", path.display(), e)))?;
    let state: SchemaState = serde_json::from_str(&raw)
        .map_err(|e| MigrationError::Serialization(format!("{}: {}", path.display(), e)))?;

    let recomputed = state.recomputed_checksum();
    if recomputed != state.checksum {
        return Err(MigrationError::Integrity(format!(
            "baseline {} is corrupt: stored checksum {}, contents hash to {}",
            path.display(),
            state.checksum,
            recomputed
        )));
    }
    Ok(state)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub is_identical: bool,
    pub checksum_match: bool,
    pub expected_checksum: String,
    pub actual_checksum: String,
    pub baseline: String,
    pub missing_tables: Vec<String>,
    pub extra_tables: Vec<String>,
    pub differences: Vec<String>,
    pub schema_drift: Vec<String>,
}

/// Compare an expected schema with the live one.
pub fn compare_states(expected: &SchemaState, actual: &SchemaState, baseline: &str) -> DriftReport {
    let mut missing_tables = Vec::new();
    let mut extra_tables = Vec::new();
    let mut schema_drift = Vec::new();

    let want: BTreeMap<_, _> = expected.tables.iter().map(|t| (t.name.as_str(), t)).collect();
    let have: BTreeMap<_, _> = actual.tables.iter().map(|t| (t.name.as_str(), t)).collect();
    for (name, table) in &want {
        match have.get(name) {
            None => missing_tables.push(name.to_string()),
            Some(live) if live.checksum != table.checksum => {
                schema_drift.push(format!("table {} schema drift detected", name))
            }
            Some(_) => {}
        }
    }
    extra_tables.extend(
        have.keys()
            .filter(|name| !want.contains_key(*name))
            .map(|name| name.to_string()),
    );

    let index_key = |i: &crate::inspect::IndexInfo| format!("{}.{}", i.table, i.name);
    diff_objects(
        "index",
        expected.indexes.iter().map(|i| (index_key(i), i.checksum.as_str())),
        actual.indexes.iter().map(|i| (index_key(i), i.checksum.as_str())),
        &mut schema_drift,
    );
    diff_objects(
        "function",
        expected
            .functions
            .iter()
            .map(|f| (format!("{} {}", f.kind, f.name), f.checksum.as_str())),
        actual
            .functions
            .iter()
            .map(|f| (format!("{} {}", f.kind, f.name), f.checksum.as_str())),
        &mut schema_drift,
    );

    let is_identical = missing_tables.is_empty() && extra_tables.is_empty() && schema_drift.is_empty();

    let mut differences = Vec::new();
    if !is_identical {
        differences.push("schema states differ".to_string());
        if !missing_tables.is_empty() {
            differences.push(format!("missing tables: {}", missing_tables.join(", ")));
        }
        if !extra_tables.is_empty() {
            differences.push(format!("extra tables: {}", extra_tables.join(", ")));
        }
        if !schema_drift.is_empty() {
            differences.push(format!("schema drift: {}", schema_drift.join(", ")));
        }
    }

    DriftReport {
        is_identical,
        checksum_match: expected.checksum == actual.checksum,
        expected_checksum: expected.checksum.clone(),
        actual_checksum: actual.checksum.clone(),
        baseline: baseline.to_string(),
        missing_tables,
        extra_tables,
        differences,
        schema_drift,
    }
}

fn diff_objects<'a>(
    kind: &str,
    expected: impl Iterator<Item = (String, &'a str)>,
    actual: impl Iterator<Item = (String, &'a str)>,
    drift: &mut Vec<String>,
) {
    let want: BTreeMap<String, &str> = expected.collect();
    let have: BTreeMap<String, &str> = actual.collect();

    for (key, checksum) in &want {
        match have.get(key) {
            None => drift.push(format!("missing {} {}", kind, key)),
            Some(live) if live != checksum => drift.push(format!("{} {} differs", kind, key)),
            Some(_) => {}
        }
    }
    for key in have.keys().filter(|k| !want.contains_key(*k)) {
        drift.push(format!("extra {} {}", kind, key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::{ColumnInfo, FunctionInfo, IndexInfo, TableInfo};

    fn table(name: &str, column_type: &str) -> TableInfo {
        TableInfo::new(
            name,
            vec![ColumnInfo {
                name: "id".into(),
                data_type: column_type.into(),
                nullable: false,
                default_value: None,
                primary_key: true,
                foreign_key: None,
            }],
        )
    }

    #[test]
    fn test_identical_states() {
        let state = SchemaState::new(vec![table("users", "INTEGER")], vec![], vec![]);
        let report = compare_states(&state, &state.clone(), "test");
        assert!(report.is_identical);
        assert!(report.checksum_match);
        assert!(report.differences.is_empty());
    }

    #[test]
    fn test_missing_extra_and_changed_tables() {
        let expected = SchemaState::new(vec![table("users", "INTEGER"), table("posts", "INTEGER")], vec![], vec![]);
        let actual = SchemaState::new(vec![table("users", "TEXT"), table("audit", "INTEGER")], vec![], vec![]);

        let report = compare_states(&expected, &actual, "test");
        assert!(!report.is_identical);
        assert!(!report.checksum_match);
        assert_eq!(report.missing_tables, vec!["posts"]);
        assert_eq!(report.extra_tables, vec!["audit"]);
        assert_eq!(report.schema_drift, vec!["table users schema drift detected"]);
        assert_eq!(report.differences[0], "schema states differ");
    }

    #[test]
    fn test_index_and_function_drift() {
        let tables = vec![table("users", "INTEGER")];
        let expected = SchemaState::new(
            tables.clone(),
            vec![IndexInfo::new("idx_a", "users", vec!["id".into()], false, None)],
            vec![FunctionInfo::new("v", "view", "CREATE VIEW v AS SELECT 1")],
        );
        let actual = SchemaState::new(
            tables,
            vec![IndexInfo::new("idx_b", "users", vec!["id".into()], false, None)],
            vec![FunctionInfo::new("v", "view", "CREATE VIEW v AS SELECT 2")],
        );

        let report = compare_states(&expected, &actual, "test");
        assert!(!report.is_identical);
        assert!(report.missing_tables.is_empty());
        assert!(report.schema_drift.contains(&"missing index users.idx_a".to_string()));
        assert!(report.schema_drift.contains(&"extra index users.idx_b".to_string()));
        assert!(report.schema_drift.contains(&"function view v differs".to_string()));
    }
}
