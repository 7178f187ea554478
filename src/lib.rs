// ============================================================================
// schemaward: schema migration and state verification
// ============================================================================

pub mod bookkeeping;
pub mod cli;
pub mod compat;
pub mod connection;
pub mod core;
pub mod drift;
pub mod engine;
pub mod inspect;
pub mod registry;
pub mod runner;
pub mod status;

// Re-export main types for convenience
pub use core::{MigrationError, Result, compare_versions, migration_checksum};
pub use engine::{EngineConfig, MigrationEngine};

pub use bookkeeping::{BookkeepingStore, DEFAULT_BOOKKEEPING_TABLE, MigrationRecord};
pub use compat::{
    CompatibilityLevel, CompatibilityMatrix, CompatibilityReport, CompatibilityRule,
    CompatibilityStatus, DbSelector,
};
pub use connection::{Database, MigrationLock, config::ConnectionConfig, lock::DEFAULT_LOCK_TTL};
pub use drift::{
    Baseline, DriftReport, FileValidationReport, HealthStatus, IntegrityReport, Severity,
    StateCertificate,
};
pub use inspect::{ColumnInfo, FunctionInfo, IndexInfo, SchemaInspector, SchemaState, TableInfo};
pub use registry::{IntegrityIssue, IntegrityIssueKind, Migration, MigrationRegistry};
pub use runner::{
    Direction, MigrationOptions, MigrationReport, RollbackOptions, StepOutcome, StepResult,
};
pub use status::{MigrationListing, MigrationStatus, OverallStatus};
