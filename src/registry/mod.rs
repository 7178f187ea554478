//! Ordered, immutable set of migration definitions.

pub mod loader;

use crate::bookkeeping::MigrationRecord;
use crate::core::{MigrationError, Result, compare_versions, migration_checksum, same_version};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

/// Optional descriptive data carried next to the scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_runtime_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runtime_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Checksum recorded when the migration was released
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_checksum: Option<String>,
}

/// One versioned schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: String,
    pub name: String,
    pub up: String,
    pub down: String,
    /// Checksum computed from `up` and `down`
    pub checksum: String,
    pub metadata: MigrationMetadata,
}

impl Migration {
    pub fn new(
        version: impl Into<String>,
        name: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        let up = up.into();
        let down = down.into();
        let checksum = migration_checksum(&up, &down);
        Self {
            version: version.into(),
            name: name.into(),
            up,
            down,
            checksum,
            metadata: MigrationMetadata::default(),
        }
    }

    pub fn with_pinned_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.metadata.pinned_checksum = Some(checksum.into());
        self
    }

    /// Runtime builds this migration supports, both bounds inclusive.
    pub fn with_runtime_bounds(mut self, min: Option<&str>, max: Option<&str>) -> Self {
        self.metadata.min_runtime_version = min.map(str::to_string);
        self.metadata.max_runtime_version = max.map(str::to_string);
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_reversible(&self) -> bool {
        !self.down.trim().is_empty()
    }

    fn summary(&self) -> MigrationSummary {
        MigrationSummary {
            version: self.version.clone(),
            name: self.name.clone(),
            checksum: self.checksum.clone(),
            reversible: self.is_reversible(),
            description: self.metadata.description.clone(),
            min_runtime_version: self.metadata.min_runtime_version.clone(),
            max_runtime_version: self.metadata.max_runtime_version.clone(),
            dependencies: self.metadata.dependencies.clone(),
        }
    }
}

/// What went wrong with a definition or an applied record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityIssueKind {
    DuplicateVersion,
    OutOfOrder,
    ChecksumMismatch,
    UnknownDependency,
    UnknownApplied,
    RecordChecksumMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub version: Option<String>,
    pub kind: IntegrityIssueKind,
    pub message: String,
}

impl IntegrityIssue {
    fn new(version: &str, kind: IntegrityIssueKind, message: String) -> Self {
        Self {
            version: Some(version.to_string()),
            kind,
            message,
        }
    }
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Listing entry for `list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub version: String,
    pub name: String,
    pub checksum: String,
    pub reversible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_runtime_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_runtime_version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// The loaded migration set.
///
/// Problems found while loading are kept in `issues` instead of failing the
/// load, so read-only commands can still report on a broken registry.
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    migrations: Vec<Migration>,
    issues: Vec<IntegrityIssue>,
    source: Option<String>,
}

impl MigrationRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from definitions in source order.
    pub fn from_migrations(migrations: Vec<Migration>) -> Self {
        let issues = validate_definitions(&migrations);
        let mut registry = Self {
            migrations,
            issues,
            source: None,
        };
        registry.sort();
        registry
    }

    /// Load from a migrations directory (see [`loader`]).
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let migrations = loader::load_migrations(dir)?;
        let mut registry = Self::from_migrations(migrations);
        registry.source = Some(dir.display().to_string());
        tracing::debug!(
            dir = %dir.display(),
            count = registry.migrations.len(),
            issues = registry.issues.len(),
            "loaded migration registry"
        );
        Ok(registry)
    }

    fn sort(&mut self) {
        self.migrations
            .sort_by(|a, b| compare_versions(&a.version, &b.version));
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn get(&self, version: &str) -> Option<&Migration> {
        self.migrations
            .iter()
            .find(|m| same_version(&m.version, version))
    }

    pub fn migration(&self, version: &str) -> Result<&Migration> {
        self.get(version)
            .ok_or_else(|| MigrationError::NotFound(version.to_string()))
    }

    pub fn contains(&self, version: &str) -> bool {
        self.get(version).is_some()
    }

    pub fn latest_version(&self) -> Option<&str> {
        self.migrations.last().map(|m| m.version.as_str())
    }

    /// Migrations up to and including `version`, in order.
    pub fn versions_through(&self, version: &str) -> impl Iterator<Item = &Migration> {
        self.migrations
            .iter()
            .take_while(move |m| compare_versions(&m.version, version) != Ordering::Greater)
    }

    pub fn integrity_issues(&self) -> &[IntegrityIssue] {
        &self.issues
    }

    /// Fail with [`MigrationError::Integrity`] if loading found any problem.
    pub fn ensure_integrity(&self) -> Result<()> {
        if self.issues.is_empty() {
            return Ok(());
        }
        let detail = self
            .issues
            .iter()
            .map(|issue| issue.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Err(MigrationError::Integrity(detail))
    }

    /// Cross-check applied records against the definitions.
    pub fn audit_records(&self, records: &[MigrationRecord]) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();
        for record in records {
            match self.get(&record.version) {
                None => issues.push(IntegrityIssue::new(
                    &record.version,
                    IntegrityIssueKind::UnknownApplied,
                    format!(
                        "applied migration {} ({}) is not in the registry",
                        record.version, record.name
                    ),
                )),
                Some(migration) if migration.checksum != record.checksum => {
                    issues.push(IntegrityIssue::new(
                        &record.version,
                        IntegrityIssueKind::RecordChecksumMismatch,
                        format!(
                            "migration {} was modified after it was applied: recorded {}, current {}",
                            record.version, record.checksum, migration.checksum
                        ),
                    ))
                }
                Some(_) => {}
            }
        }
        issues
    }

    pub fn summaries(&self) -> Vec<MigrationSummary> {
        self.migrations.iter().map(Migration::summary).collect()
    }
}

fn validate_definitions(migrations: &[Migration]) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();

    for (idx, migration) in migrations.iter().enumerate() {
        let earlier = &migrations[..idx];

        if earlier.iter().any(|m| same_version(&m.version, &migration.version)) {
            issues.push(IntegrityIssue::new(
                &migration.version,
                IntegrityIssueKind::DuplicateVersion,
                format!("duplicate migration version {}", migration.version),
            ));
        } else if let Some(prev) = earlier.last()
            && compare_versions(&prev.version, &migration.version) == Ordering::Greater
        {
            issues.push(IntegrityIssue::new(
                &migration.version,
                IntegrityIssueKind::OutOfOrder,
                format!(
                    "migration {} is listed after {}",
                    migration.version, prev.version
                ),
            ));
        }

        if let Some(pinned) = &migration.metadata.pinned_checksum
            && !pinned.eq_ignore_ascii_case(&migration.checksum)
        {
            issues.push(IntegrityIssue::new(
                &migration.version,
                IntegrityIssueKind::ChecksumMismatch,
                format!(
                    "checksum mismatch for migration {}: pinned {}, computed {}",
                    migration.version, pinned, migration.checksum
                ),
            ));
        }

        for dep in &migration.metadata.dependencies {
            if !migrations.iter().any(|m| same_version(&m.version, dep)) {
                issues.push(IntegrityIssue::new(
                    &migration.version,
                    IntegrityIssueKind::UnknownDependency,
                    format!(
                        "migration {} depends on unknown version {}",
                        migration.version, dep
                    ),
                ));
            }
        }
    }

    issues
}
