//! Applying and reverting migrations.

pub mod strategy;

use crate::bookkeeping::{BookkeepingStore, MigrationRecord};
use crate::compat::{CompatibilityMatrix, CompatibilityStatus};
use crate::connection::{Database, MigrationLock};
use crate::connection::lock::DEFAULT_LOCK_TTL;
use crate::core::{MigrationError, Result, compare_versions, same_version};
use crate::registry::{Migration, MigrationRegistry};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;

pub use strategy::{ApplyExecutor, PlanExecutor, StepExecutor};

/// Rollback target that reverts every applied migration.
pub const ROLLBACK_ALL: &str = "0";

#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    pub dry_run: bool,
    pub fail_on_incompatible: bool,
    pub runtime_version: Option<String>,
    pub quiet: bool,
    /// Stop after this version
    pub max_version: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RollbackOptions {
    pub dry_run: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    RolledBack,
    /// Dry run only
    Planned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub version: String,
    pub name: String,
    pub direction: Direction,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl StepResult {
    pub fn new(migration: &Migration, direction: Direction, outcome: StepOutcome) -> Self {
        Self {
            version: migration.version.clone(),
            name: migration.name.clone(),
            direction,
            outcome,
            execution_time_ms: None,
        }
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub direction: Direction,
    pub dry_run: bool,
    pub steps: Vec<StepResult>,
}

impl MigrationReport {
    fn new(direction: Direction, dry_run: bool) -> Self {
        Self {
            direction,
            dry_run,
            steps: Vec::new(),
        }
    }

    pub fn versions(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.version.as_str()).collect()
    }
}

/// Registry migrations not yet applied, in registry order.
pub fn pending_migrations<'r>(
    registry: &'r MigrationRegistry,
    applied: &[MigrationRecord],
) -> Vec<&'r Migration> {
    registry
        .migrations()
        .iter()
        .filter(|m| !applied.iter().any(|r| same_version(&r.version, &m.version)))
        .collect()
}

/// Pending migrations that sit below the highest applied version.
pub fn version_gaps<'p>(pending: &[&'p Migration], applied: &[MigrationRecord]) -> Vec<&'p Migration> {
    let Some(current) = applied.iter().map(|r| r.version.as_str()).max_by(|a, b| compare_versions(a, b)) else {
        return Vec::new();
    };
    pending
        .iter()
        .copied()
        .filter(|m| compare_versions(&m.version, current) == Ordering::Less)
        .collect()
}

/// Drives migrations against one database.
pub struct MigrationRunner<'a> {
    db: &'a Database,
    registry: &'a MigrationRegistry,
    bookkeeping: &'a BookkeepingStore,
    matrix: &'a CompatibilityMatrix,
    lock_ttl: Duration,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(
        db: &'a Database,
        registry: &'a MigrationRegistry,
        bookkeeping: &'a BookkeepingStore,
        matrix: &'a CompatibilityMatrix,
    ) -> Self {
        Self {
            db,
            registry,
            bookkeeping,
            matrix,
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }

    /// Lease length of the advisory lock taken by mutating runs.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Apply every pending migration in order.
    ///
    /// All checks happen before the first statement runs. A failing step
    /// stops the batch; steps committed before it stay applied.
    pub async fn auto_migrate(&self, options: &MigrationOptions) -> Result<MigrationReport> {
        let executor: &dyn StepExecutor = if options.dry_run {
            &PlanExecutor
        } else {
            &ApplyExecutor
        };

        self.locked(executor, self.migrate_with(executor, options)).await
    }

    /// Revert applied migrations newer than `target`, newest first.
    pub async fn rollback_to_version(&self, target: &str, options: &RollbackOptions) -> Result<MigrationReport> {
        let executor: &dyn StepExecutor = if options.dry_run {
            &PlanExecutor
        } else {
            &ApplyExecutor
        };

        self.locked(executor, self.rollback_with(executor, target, options)).await
    }

    async fn locked<F>(&self, executor: &dyn StepExecutor, run: F) -> Result<MigrationReport>
    where
        F: Future<Output = Result<MigrationReport>>,
    {
        if !executor.mutates() {
            return run.await;
        }

        let lock = MigrationLock::acquire(self.db, &self.bookkeeping.lock_table_name(), self.lock_ttl).await?;
        let result = run.await;
        match lock.release().await {
            Ok(()) => result,
            Err(release_err) if result.is_ok() => Err(release_err),
            Err(release_err) => {
                tracing::warn!(error = %release_err, "failed to release migration lock");
                result
            }
        }
    }

    async fn preflight(&self) -> Result<Vec<MigrationRecord>> {
        self.registry.ensure_integrity()?;

        let records = self.bookkeeping.applied_records(self.db).await?;
        let issues = self.registry.audit_records(&records);
        if !issues.is_empty() {
            let detail = issues.iter().map(|i| i.message.as_str()).collect::<Vec<_>>().join("; ");
            return Err(MigrationError::Integrity(detail));
        }
        Ok(records)
    }

    async fn migrate_with(&self, executor: &dyn StepExecutor, options: &MigrationOptions) -> Result<MigrationReport> {
        let records = self.preflight().await?;
        let pending = pending_migrations(self.registry, &records);

        if let Some(gap) = version_gaps(&pending, &records).first() {
            let current = records.last().map(|r| r.version.as_str()).unwrap_or_default();
            return Err(MigrationError::Integrity(format!(
                "migration {} is pending but newer version {} is already applied",
                gap.version, current
            )));
        }

        let plan: Vec<&Migration> = match &options.max_version {
            Some(max) => pending
                .into_iter()
                .filter(|m| compare_versions(&m.version, max) != Ordering::Greater)
                .collect(),
            None => pending,
        };

        self.check_dependencies(&plan, &records)?;

        let current = records.last().map(|r| r.version.clone()).unwrap_or_default();
        if options.fail_on_incompatible {
            self.compatibility_gate(options.runtime_version.as_deref(), &current, &plan)?;
        }

        let mut report = MigrationReport::new(Direction::Up, !executor.mutates());
        if plan.is_empty() {
            if !options.quiet {
                tracing::info!("no pending migrations; database is up to date");
            }
            return Ok(report);
        }

        if executor.mutates() {
            self.bookkeeping.ensure_table(self.db).await?;
        }

        for migration in plan {
            let step = executor
                .forward(self.db, self.bookkeeping, migration, options.runtime_version.as_deref())
                .await
                .inspect_err(|e| tracing::error!(version = %migration.version, error = %e, "migration failed"))?;
            if !options.quiet {
                log_step(&step);
            }
            report.steps.push(step);
        }

        Ok(report)
    }

    fn check_dependencies(&self, plan: &[&Migration], records: &[MigrationRecord]) -> Result<()> {
        for (idx, migration) in plan.iter().enumerate() {
            for dep in &migration.metadata.dependencies {
                let applied = records.iter().any(|r| same_version(&r.version, dep));
                let earlier = plan[..idx].iter().any(|m| same_version(&m.version, dep));
                if !applied && !earlier {
                    return Err(MigrationError::Integrity(format!(
                        "migration {} depends on {}, which is neither applied nor scheduled before it",
                        migration.version, dep
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every version the run will pass through must accept the runtime build.
    fn compatibility_gate(&self, runtime: Option<&str>, current: &str, plan: &[&Migration]) -> Result<()> {
        let runtime = runtime.ok_or_else(|| {
            MigrationError::InvalidVersion("a runtime version is required to check compatibility".to_string())
        })?;

        let checkpoints = std::iter::once(current)
            .filter(|v| !v.is_empty())
            .chain(plan.iter().map(|m| m.version.as_str()));

        for db_version in checkpoints {
            let report = self.matrix.evaluate(runtime, db_version)?;
            match report.status {
                CompatibilityStatus::Incompatible => {
                    let reason = report
                        .note
                        .or_else(|| report.issues.first().cloned())
                        .unwrap_or_else(|| "rule marks the pair incompatible".to_string());
                    return Err(MigrationError::IncompatibleVersion {
                        runtime: runtime.to_string(),
                        db_version: db_version.to_string(),
                        reason,
                    });
                }
                CompatibilityStatus::Degraded => {
                    tracing::warn!(
                        runtime,
                        db_version,
                        note = report.note.as_deref().unwrap_or(""),
                        "runtime is only partially compatible"
                    );
                }
                CompatibilityStatus::Compatible | CompatibilityStatus::Uninitialized => {}
            }
        }
        Ok(())
    }

    async fn rollback_with(
        &self,
        executor: &dyn StepExecutor,
        target: &str,
        options: &RollbackOptions,
    ) -> Result<MigrationReport> {
        let records = self.preflight().await?;

        let rollback_all = target == ROLLBACK_ALL && !self.registry.contains(target);
        let known = self.registry.contains(target) || records.iter().any(|r| same_version(&r.version, target));
        if !rollback_all && !known {
            return Err(MigrationError::NotFound(target.to_string()));
        }

        let to_revert: Vec<&MigrationRecord> = records
            .iter()
            .rev()
            .filter(|r| rollback_all || compare_versions(&r.version, target) == Ordering::Greater)
            .collect();
        if to_revert.is_empty() {
            return Err(MigrationError::NoOp(format!(
                "nothing applied after version {}",
                target
            )));
        }

        let mut steps = Vec::with_capacity(to_revert.len());
        for record in &to_revert {
            let migration = self.registry.get(&record.version).ok_or_else(|| {
                MigrationError::Integrity(format!(
                    "applied migration {} has no definition to roll back with",
                    record.version
                ))
            })?;
            if !migration.is_reversible() {
                return Err(MigrationError::Irreversible(migration.version.clone()));
            }
            steps.push((migration, *record));
        }

        let mut report = MigrationReport::new(Direction::Down, !executor.mutates());
        for (migration, record) in steps {
            let step = executor
                .reverse(self.db, self.bookkeeping, migration, record)
                .await
                .inspect_err(|e| tracing::error!(version = %migration.version, error = %e, "rollback failed"))?;
            if !options.quiet {
                log_step(&step);
            }
            report.steps.push(step);
        }

        Ok(report)
    }
}

fn log_step(step: &StepResult) {
    match step.outcome {
        StepOutcome::Applied => tracing::info!(
            version = %step.version,
            name = %step.name,
            ms = step.execution_time_ms.unwrap_or_default(),
            "applied migration"
        ),
        StepOutcome::RolledBack => tracing::info!(
            version = %step.version,
            name = %step.name,
            ms = step.execution_time_ms.unwrap_or_default(),
            "rolled back migration"
        ),
        StepOutcome::Planned => tracing::info!(
            version = %step.version,
            name = %step.name,
            direction = ?step.direction,
            "would run migration (dry run)"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(version: &str) -> MigrationRecord {
        MigrationRecord::new(&Migration::new(version, "x", "SELECT 1;", ""), None)
    }

    fn registry() -> MigrationRegistry {
        MigrationRegistry::from_migrations(vec![
            Migration::new("1", "a", "SELECT 1;", ""),
            Migration::new("2", "b", "SELECT 1;", ""),
            Migration::new("3", "c", "SELECT 1;", ""),
        ])
    }

    #[test]
    fn test_pending_preserves_registry_order() {
        let registry = registry();
        let pending = pending_migrations(&registry, &[record("1")]);
        let versions: Vec<_> = pending.iter().map(|m| m.version.as_str()).collect();
        assert_eq!(versions, vec!["2", "3"]);
    }

    #[test]
    fn test_gap_detection() {
        let registry = registry();
        let applied = [record("1"), record("3")];
        let pending = pending_migrations(&registry, &applied);
        let gaps = version_gaps(&pending, &applied);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].version, "2");

        assert!(version_gaps(&pending_migrations(&registry, &[]), &[]).is_empty());
    }
}
