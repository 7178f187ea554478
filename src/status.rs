use crate::bookkeeping::MigrationRecord;
use crate::registry::{Migration, MigrationSummary};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallStatus {
    UpToDate,
    Pending,
    Error,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::UpToDate => "up-to-date",
            Self::Pending => "pending",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMigration {
    pub version: String,
    pub name: String,
}

impl From<&Migration> for PendingMigration {
    fn from(migration: &Migration) -> Self {
        Self {
            version: migration.version.clone(),
            name: migration.name.clone(),
        }
    }
}

/// Applied/pending summary of one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub current_db_version: String,
    pub applied: Vec<MigrationRecord>,
    pub pending: Vec<PendingMigration>,
    pub overall: OverallStatus,
    /// Why `overall` is `error`
    pub issues: Vec<String>,
}

impl MigrationStatus {
    pub fn new(applied: Vec<MigrationRecord>, pending: &[&Migration], issues: Vec<String>) -> Self {
        let overall = if !issues.is_empty() {
            OverallStatus::Error
        } else if !pending.is_empty() {
            OverallStatus::Pending
        } else {
            OverallStatus::UpToDate
        };

        Self {
            current_db_version: applied.last().map(|r| r.version.clone()).unwrap_or_default(),
            applied,
            pending: pending.iter().map(|m| PendingMigration::from(*m)).collect(),
            overall,
            issues,
        }
    }
}

/// Registry listing backing `list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationListing {
    pub source: Option<String>,
    pub migrations: Vec<MigrationSummary>,
}
