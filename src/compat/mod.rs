//! Runtime build vs. database schema version compatibility.
//!
//! A [`CompatibilityMatrix`] is an ordered rule list. The first rule whose
//! runtime and db selectors both match decides the verdict; when nothing
//! matches the pair is incompatible.

use crate::core::{MigrationError, Result, lenient_semver, same_version};
use crate::registry::MigrationRegistry;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Verdict a single rule assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompatibilityLevel {
    Compatible,
    Degraded,
    Incompatible,
}

/// Overall outcome of a compatibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompatibilityStatus {
    Compatible,
    Degraded,
    Incompatible,
    /// Nothing has been applied yet
    Uninitialized,
}

impl From<CompatibilityLevel> for CompatibilityStatus {
    fn from(level: CompatibilityLevel) -> Self {
        match level {
            CompatibilityLevel::Compatible => Self::Compatible,
            CompatibilityLevel::Degraded => Self::Degraded,
            CompatibilityLevel::Incompatible => Self::Incompatible,
        }
    }
}

impl fmt::Display for CompatibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compatible => "compatible",
            Self::Degraded => "degraded",
            Self::Incompatible => "incompatible",
            Self::Uninitialized => "uninitialized",
        })
    }
}

/// Database-version side of a rule.
///
/// Usually a semver requirement (`">=1.0.0, <2.0.0"`, `"1.x"`, `"*"`). A
/// selector of the form `=<version>` that is not valid semver matches that
/// migration version exactly, so non-semver version schemes can still be
/// pinned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DbSelector {
    raw: String,
    req: Option<VersionReq>,
}

impl DbSelector {
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            req: Some(VersionReq::STAR),
        }
    }

    /// Selector matching exactly one migration version.
    pub fn exact(version: &str) -> Self {
        let req = lenient_semver(version)
            .and_then(|v| VersionReq::parse(&format!("={}", v)).ok());
        Self {
            raw: format!("={}", version),
            req,
        }
    }

    pub fn matches(&self, db_version: &str) -> bool {
        if let Some(req) = &self.req {
            if *req == VersionReq::STAR {
                return true;
            }
            if let Some(parsed) = lenient_semver(db_version) {
                return req.matches(&parsed);
            }
        }
        match self.raw.strip_prefix('=') {
            Some(exact) => same_version(exact.trim(), db_version),
            None => false,
        }
    }
}

impl TryFrom<String> for DbSelector {
    type Error = String;

    fn try_from(raw: String) -> std::result::Result<Self, Self::Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("db selector must not be empty".to_string());
        }
        match VersionReq::parse(trimmed) {
            Ok(req) => Ok(Self {
                raw: trimmed.to_string(),
                req: Some(req),
            }),
            Err(_) if trimmed.starts_with('=') => Ok(Self {
                raw: trimmed.to_string(),
                req: None,
            }),
            Err(e) => Err(format!("invalid db selector '{}': {}", trimmed, e)),
        }
    }
}

impl From<DbSelector> for String {
    fn from(selector: DbSelector) -> Self {
        selector.raw
    }
}

impl fmt::Display for DbSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityRule {
    pub runtime: VersionReq,
    pub db: DbSelector,
    pub status: CompatibilityLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CompatibilityRule {
    pub fn new(runtime: VersionReq, db: DbSelector, status: CompatibilityLevel) -> Self {
        Self {
            runtime,
            db,
            status,
            note: None,
        }
    }

    /// Parse both selectors from strings.
    pub fn parse(runtime: &str, db: &str, status: CompatibilityLevel) -> Result<Self> {
        let runtime = VersionReq::parse(runtime)
            .map_err(|e| MigrationError::InvalidVersion(format!("'{}': {}", runtime, e)))?;
        let db = DbSelector::try_from(db.to_string()).map_err(MigrationError::InvalidVersion)?;
        Ok(Self::new(runtime, db, status))
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    fn matches(&self, runtime: &Version, db_version: &str) -> bool {
        self.runtime.matches(runtime) && self.db.matches(db_version)
    }
}

impl fmt::Display for CompatibilityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime {} / db {} -> {:?}", self.runtime, self.db, self.status)
    }
}

/// Result of one `(runtime, db version)` evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub status: CompatibilityStatus,
    pub current_db_version: String,
    pub runtime_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

impl CompatibilityReport {
    pub fn is_compatible(&self) -> bool {
        !matches!(self.status, CompatibilityStatus::Incompatible)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompatibilityMatrix {
    rules: Vec<CompatibilityRule>,
}

impl CompatibilityMatrix {
    pub fn new(rules: Vec<CompatibilityRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[CompatibilityRule] {
        &self.rules
    }

    /// Read a JSON array of rules.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            MigrationError::Registry(format!("{}: {}", path.display(), e))
        })?;
        let matrix: Self = serde_json::from_str(&raw).map_err(|e| {
            MigrationError::Registry(format!("{}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), rules = matrix.rules.len(), "loaded compatibility matrix");
        Ok(matrix)
    }

    /// Rules implied by the runtime bounds in migration metadata.
    ///
    /// For every version V the bounds accumulate over all migrations up to
    /// V: the highest minimum and the lowest maximum apply.
    pub fn derive_from_registry(registry: &MigrationRegistry) -> Result<Self> {
        let mut rules = Vec::new();
        let mut min: Option<Version> = None;
        let mut max: Option<Version> = None;

        for migration in registry.migrations() {
            if let Some(raw) = &migration.metadata.min_runtime_version {
                let parsed = parse_bound(&migration.version, "min_runtime_version", raw)?;
                if min.as_ref().is_none_or(|current| parsed > *current) {
                    min = Some(parsed);
                }
            }
            if let Some(raw) = &migration.metadata.max_runtime_version {
                let parsed = parse_bound(&migration.version, "max_runtime_version", raw)?;
                if max.as_ref().is_none_or(|current| parsed < *current) {
                    max = Some(parsed);
                }
            }

            let db = DbSelector::exact(&migration.version);
            if let Some(min) = &min {
                rules.push(
                    CompatibilityRule::new(comparator("<", min)?, db.clone(), CompatibilityLevel::Incompatible)
                        .with_note(format!("runtime is below minimum required {}", min)),
                );
            }
            if let Some(max) = &max {
                rules.push(
                    CompatibilityRule::new(comparator(">", max)?, db.clone(), CompatibilityLevel::Incompatible)
                        .with_note(format!("runtime exceeds maximum allowed {}", max)),
                );
            }
            if let Some(min) = &min {
                let next_major = Version::new(min.major + 1, 0, 0);
                rules.push(
                    CompatibilityRule::new(comparator(">=", &next_major)?, db.clone(), CompatibilityLevel::Degraded)
                        .with_note(format!("runtime is significantly newer than minimum required {}", min)),
                );
            }
            rules.push(CompatibilityRule::new(VersionReq::STAR, db, CompatibilityLevel::Compatible));
        }

        Ok(Self { rules })
    }

    /// Evaluate the matrix for a runtime build against a database version.
    ///
    /// An empty `db_version` means nothing has been applied yet.
    pub fn evaluate(&self, runtime_version: &str, db_version: &str) -> Result<CompatibilityReport> {
        let runtime = lenient_semver(runtime_version).ok_or_else(|| {
            MigrationError::InvalidVersion(format!("runtime version '{}'", runtime_version))
        })?;

        let mut report = CompatibilityReport {
            status: CompatibilityStatus::Incompatible,
            current_db_version: db_version.to_string(),
            runtime_version: runtime_version.to_string(),
            matched_rule: None,
            note: None,
            issues: Vec::new(),
        };

        if db_version.is_empty() {
            report.status = CompatibilityStatus::Uninitialized;
            return Ok(report);
        }

        match self.rules.iter().find(|rule| rule.matches(&runtime, db_version)) {
            Some(rule) => {
                report.status = rule.status.into();
                report.matched_rule = Some(rule.to_string());
                report.note = rule.note.clone();
            }
            None => {
                report.issues.push(format!(
                    "no compatibility rule covers runtime {} with database version {}",
                    runtime_version, db_version
                ));
            }
        }

        Ok(report)
    }
}

fn parse_bound(version: &str, field: &str, raw: &str) -> Result<Version> {
    lenient_semver(raw).ok_or_else(|| {
        MigrationError::InvalidVersion(format!("{} '{}' in migration {}", field, raw, version))
    })
}

fn comparator(op: &str, version: &Version) -> Result<VersionReq> {
    VersionReq::parse(&format!("{}{}", op, version))
        .map_err(|e| MigrationError::InvalidVersion(e.to_string()))
}
