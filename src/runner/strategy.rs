use super::{Direction, StepOutcome, StepResult};
use crate::bookkeeping::{BookkeepingStore, MigrationRecord};
use crate::connection::Database;
use crate::core::{MigrationError, Result};
use crate::registry::Migration;
use async_trait::async_trait;
use std::time::Instant;

/// How a single planned step is carried out.
///
/// The runner walks the same plan for real runs and dry runs; only the
/// executor differs.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Whether this executor changes the database (and so needs the lock).
    fn mutates(&self) -> bool;

    async fn forward(
        &self,
        db: &Database,
        bookkeeping: &BookkeepingStore,
        migration: &Migration,
        runtime_version: Option<&str>,
    ) -> Result<StepResult>;

    /// Undo `migration`; `record` is its bookkeeping row as stored, which
    /// may spell the version differently (`001` vs `1`).
    async fn reverse(
        &self,
        db: &Database,
        bookkeeping: &BookkeepingStore,
        migration: &Migration,
        record: &MigrationRecord,
    ) -> Result<StepResult>;
}

/// Runs each step in its own transaction: script plus bookkeeping change.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplyExecutor;

#[async_trait]
impl StepExecutor for ApplyExecutor {
    fn mutates(&self) -> bool {
        true
    }

    async fn forward(
        &self,
        db: &Database,
        bookkeeping: &BookkeepingStore,
        migration: &Migration,
        runtime_version: Option<&str>,
    ) -> Result<StepResult> {
        let elapsed = db
            .with_transaction(|tx| {
                let started = Instant::now();
                tx.execute_batch(&migration.up)
                    .map_err(|e| MigrationError::execution(&migration.version, e))?;
                let elapsed = started.elapsed().as_millis() as u64;

                let record = MigrationRecord::new(migration, runtime_version).with_execution_time(elapsed);
                bookkeeping.record_applied(tx, &record)?;
                Ok(elapsed)
            })
            .await?;

        Ok(StepResult::new(migration, Direction::Up, StepOutcome::Applied).with_execution_time(elapsed))
    }

    async fn reverse(
        &self,
        db: &Database,
        bookkeeping: &BookkeepingStore,
        migration: &Migration,
        record: &MigrationRecord,
    ) -> Result<StepResult> {
        let elapsed = db
            .with_transaction(|tx| {
                let started = Instant::now();
                tx.execute_batch(&migration.down)
                    .map_err(|e| MigrationError::execution(&migration.version, e))?;
                let elapsed = started.elapsed().as_millis() as u64;

                bookkeeping.remove_record(tx, &record.version)?;
                Ok(elapsed)
            })
            .await?;

        Ok(StepResult::new(migration, Direction::Down, StepOutcome::RolledBack).with_execution_time(elapsed))
    }
}

/// Dry run: reports the step, touches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanExecutor;

#[async_trait]
impl StepExecutor for PlanExecutor {
    fn mutates(&self) -> bool {
        false
    }

    async fn forward(
        &self,
        _db: &Database,
        _bookkeeping: &BookkeepingStore,
        migration: &Migration,
        _runtime_version: Option<&str>,
    ) -> Result<StepResult> {
        Ok(StepResult::new(migration, Direction::Up, StepOutcome::Planned))
    }

    async fn reverse(
        &self,
        _db: &Database,
        _bookkeeping: &BookkeepingStore,
        migration: &Migration,
        _record: &MigrationRecord,
    ) -> Result<StepResult> {
        Ok(StepResult::new(migration, Direction::Down, StepOutcome::Planned))
    }
}
