use crate::bookkeeping::MigrationRecord;
use crate::core::{MigrationError, Result, compare_versions, same_version};
use crate::inspect::{SchemaInspector, SchemaState, replay_state};
use crate::registry::{IntegrityIssue, Migration, MigrationRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIssue {
    pub version: Option<String>,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileValidationReport {
    pub checked: usize,
    pub issues: Vec<FileIssue>,
}

impl FileValidationReport {
    pub fn passed(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &FileIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &FileIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }
}

/// Static checks of the definitions themselves.
///
/// Load-time problems are errors. An unpinned checksum or a missing reverse
/// script is only a warning; the very first migration may legitimately be
/// irreversible.
pub fn validate_files(registry: &MigrationRegistry) -> FileValidationReport {
    let mut issues: Vec<FileIssue> = registry
        .integrity_issues()
        .iter()
        .map(|issue| FileIssue {
            version: issue.version.clone(),
            severity: Severity::Error,
            message: issue.message.clone(),
        })
        .collect();

    for (idx, migration) in registry.migrations().iter().enumerate() {
        if migration.metadata.pinned_checksum.is_none() {
            issues.push(warning(migration, format!(
                "migration {} has no pinned checksum (computed {})",
                migration.version, migration.checksum
            )));
        }
        if idx > 0 && !migration.is_reversible() {
            issues.push(warning(migration, format!(
                "migration {} ({}) has no reverse script",
                migration.version, migration.name
            )));
        }
    }

    FileValidationReport {
        checked: registry.len(),
        issues,
    }
}

fn warning(migration: &Migration, message: String) -> FileIssue {
    FileIssue {
        version: Some(migration.version.clone()),
        severity: Severity::Warning,
        message,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            return Ok(self);
        }
        let detail = self.issues.iter().map(|i| i.message.as_str()).collect::<Vec<_>>().join("; ");
        Err(MigrationError::Integrity(detail))
    }
}

/// Applied records must match the current definitions.
pub fn validate_integrity(registry: &MigrationRegistry, records: &[MigrationRecord]) -> IntegrityReport {
    IntegrityReport {
        checked: records.len(),
        issues: registry.audit_records(records),
    }
}

/// Proof that the live schema equals the expected state of a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCertificate {
    pub version: String,
    pub checksum: String,
    pub validated_at: DateTime<Utc>,
}

/// Applied migrations, in registry order, as definitions.
pub fn applied_definitions<'r>(registry: &'r MigrationRegistry, records: &[MigrationRecord]) -> Vec<&'r Migration> {
    registry
        .migrations()
        .iter()
        .filter(|m| records.iter().any(|r| same_version(&r.version, &m.version)))
        .collect()
}

/// Certify that `live` is exactly what the migrations through `target` produce.
pub fn certify_state(
    registry: &MigrationRegistry,
    records: &[MigrationRecord],
    target: &str,
    live: &SchemaState,
    inspector: &SchemaInspector,
) -> Result<StateCertificate> {
    let migration = registry.migration(target)?;

    if !records.iter().any(|r| same_version(&r.version, target)) {
        return Err(MigrationError::Integrity(format!(
            "target migration {} has not been applied",
            migration.version
        )));
    }
    if let Some(newer) = records
        .iter()
        .find(|r| compare_versions(&r.version, target) == Ordering::Greater)
    {
        return Err(MigrationError::Integrity(format!(
            "newer migration {} has been applied, cannot validate intended state for {}",
            newer.version, migration.version
        )));
    }

    let through: Vec<&Migration> = registry.versions_through(&migration.version).collect();
    if let Some(missing) = through
        .iter()
        .find(|m| !records.iter().any(|r| same_version(&r.version, &m.version)))
    {
        return Err(MigrationError::Integrity(format!(
            "migration {} has not been applied, so the database cannot be in the state of version {}",
            missing.version, migration.version
        )));
    }

    let expected = replay_state(through, inspector)?;
    if expected.checksum != live.checksum {
        return Err(MigrationError::Integrity(format!(
            "schema does not match the intended state of version {}: expected {}, actual {}",
            migration.version, expected.checksum, live.checksum
        )));
    }

    Ok(StateCertificate {
        version: migration.version.clone(),
        checksum: live.checksum.clone(),
        validated_at: Utc::now(),
    })
}
