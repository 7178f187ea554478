use crate::bookkeeping::{BookkeepingStore, DEFAULT_BOOKKEEPING_TABLE, MigrationRecord};
use crate::compat::{CompatibilityMatrix, CompatibilityReport};
use crate::connection::lock::DEFAULT_LOCK_TTL;
use crate::connection::{Database, MigrationLock};
use crate::connection::config::ConnectionConfig;
use crate::core::{MigrationError, Result};
use crate::drift::validate::{applied_definitions, certify_state, validate_files, validate_integrity};
use crate::drift::{
    Baseline, DriftReport, FileValidationReport, HealthStatus, IntegrityReport, StateCertificate,
    compare_states, evaluate_health, load_snapshot,
};
use crate::inspect::{SchemaInspector, SchemaState, replay_state};
use crate::registry::MigrationRegistry;
use crate::runner::{
    MigrationOptions, MigrationReport, MigrationRunner, RollbackOptions, pending_migrations,
    version_gaps,
};
use crate::status::{MigrationListing, MigrationStatus};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// File name of an explicit compatibility matrix inside the migrations directory.
pub const COMPATIBILITY_FILE: &str = "compatibility.json";

// ============================================================================
// Configuration
// ============================================================================

/// Engine configuration, passed explicitly to every engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub migrations_dir: PathBuf,
    pub bookkeeping_table: String,
    /// Explicit rule matrix; `<migrations_dir>/compatibility.json` when unset
    pub compatibility_file: Option<PathBuf>,
    /// Snapshot used by drift detection instead of the registry replay
    pub baseline_file: Option<PathBuf>,
    /// Lease of the advisory lock; an older lock row is considered abandoned
    pub lock_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            bookkeeping_table: DEFAULT_BOOKKEEPING_TABLE.to_string(),
            compatibility_file: None,
            baseline_file: None,
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }
}

impl EngineConfig {
    pub fn new(migrations_dir: impl AsRef<Path>) -> Self {
        Self {
            migrations_dir: migrations_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn bookkeeping_table(mut self, table: impl Into<String>) -> Self {
        self.bookkeeping_table = table.into();
        self
    }

    pub fn compatibility_file(mut self, path: impl AsRef<Path>) -> Self {
        self.compatibility_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn baseline_file(mut self, path: impl AsRef<Path>) -> Self {
        self.baseline_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let table = self.bookkeeping_table.trim();
        if table.is_empty() {
            return Err(MigrationError::Registry("bookkeeping table name must not be empty".into()));
        }
        if table.starts_with("sqlite_") {
            return Err(MigrationError::Registry(format!(
                "bookkeeping table name '{}' uses the reserved sqlite_ prefix",
                table
            )));
        }
        if self.lock_ttl.is_zero() {
            return Err(MigrationError::Registry("lock ttl must be greater than zero".into()));
        }
        Ok(())
    }

    fn matrix_path(&self) -> Option<PathBuf> {
        match &self.compatibility_file {
            Some(path) => Some(path.clone()),
            None => {
                let default = self.migrations_dir.join(COMPATIBILITY_FILE);
                default.is_file().then_some(default)
            }
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Every migration operation against one database.
///
/// # Examples
///
/// ```ignore
/// let engine = MigrationEngine::open(
///     &ConnectionConfig::from_url("sqlite://app.db")?,
///     EngineConfig::new("migrations"),
/// )?;
/// engine.auto_migrate(&MigrationOptions::default()).await?;
/// ```
pub struct MigrationEngine {
    config: EngineConfig,
    db: Database,
    registry: MigrationRegistry,
    bookkeeping: BookkeepingStore,
    matrix: CompatibilityMatrix,
    inspector: SchemaInspector,
}

impl MigrationEngine {
    /// Connect and load the registry from `config.migrations_dir`.
    pub fn open(connection: &ConnectionConfig, config: EngineConfig) -> Result<Self> {
        let db = Database::open(connection)?;
        Self::new(db, config)
    }

    pub fn new(db: Database, config: EngineConfig) -> Result<Self> {
        let registry = MigrationRegistry::load_dir(&config.migrations_dir)?;
        Self::with_registry(db, config, registry)
    }

    /// Engine over an in-code registry.
    pub fn with_registry(db: Database, config: EngineConfig, registry: MigrationRegistry) -> Result<Self> {
        config.validate()?;

        let matrix = match config.matrix_path() {
            Some(path) => CompatibilityMatrix::load(path)?,
            None => CompatibilityMatrix::derive_from_registry(&registry)?,
        };
        let bookkeeping = BookkeepingStore::new(config.bookkeeping_table.clone());
        let inspector = SchemaInspector::excluding([
            bookkeeping.table().to_string(),
            bookkeeping.lock_table_name(),
        ]);

        Ok(Self {
            config,
            db,
            registry,
            bookkeeping,
            matrix,
            inspector,
        })
    }

    /// Replace the compatibility rules.
    pub fn with_matrix(mut self, matrix: CompatibilityMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn matrix(&self) -> &CompatibilityMatrix {
        &self.matrix
    }

    fn runner(&self) -> MigrationRunner<'_> {
        MigrationRunner::new(&self.db, &self.registry, &self.bookkeeping, &self.matrix)
            .with_lock_ttl(self.config.lock_ttl)
    }

    async fn records(&self) -> Result<Vec<MigrationRecord>> {
        self.bookkeeping.applied_records(&self.db).await
    }

    /// Everything that makes the database untrustworthy, as messages.
    fn integrity_problems(&self, records: &[MigrationRecord]) -> Vec<String> {
        let pending = pending_migrations(&self.registry, records);
        let audit = self.registry.audit_records(records);
        let mut problems: Vec<String> = self
            .registry
            .integrity_issues()
            .iter()
            .chain(audit.iter())
            .map(|issue| issue.message.clone())
            .collect();
        problems.extend(version_gaps(&pending, records).into_iter().map(|m| {
            format!("migration {} is pending below the current database version", m.version)
        }));
        problems
    }

    // ------------------------------------------------------------------------
    // Migration
    // ------------------------------------------------------------------------

    pub async fn auto_migrate(&self, options: &MigrationOptions) -> Result<MigrationReport> {
        self.runner().auto_migrate(options).await
    }

    pub async fn rollback_to_version(&self, target: &str, options: &RollbackOptions) -> Result<MigrationReport> {
        self.runner().rollback_to_version(target, options).await
    }

    /// Clear the advisory lock regardless of who holds it.
    ///
    /// Returns the evicted holder, `None` when nothing was locked.
    pub async fn unlock(&self) -> Result<Option<String>> {
        let evicted = MigrationLock::force_release(&self.db, &self.bookkeeping.lock_table_name()).await?;
        match &evicted {
            Some(holder) => tracing::warn!(%holder, "forcibly removed migration lock"),
            None => tracing::info!("migrations were not locked"),
        }
        Ok(evicted)
    }

    // ------------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------------

    pub async fn status(&self) -> Result<MigrationStatus> {
        let records = self.records().await?;
        let pending = pending_migrations(&self.registry, &records);
        let issues = self.integrity_problems(&records);
        Ok(MigrationStatus::new(records, &pending, issues))
    }

    pub async fn check_compatibility(&self, runtime_version: &str) -> Result<CompatibilityReport> {
        let current = self.bookkeeping.current_version(&self.db).await?.unwrap_or_default();
        self.matrix.evaluate(runtime_version, &current)
    }

    pub fn available_migrations(&self) -> MigrationListing {
        MigrationListing {
            source: self.registry.source().map(str::to_string),
            migrations: self.registry.summaries(),
        }
    }

    // ------------------------------------------------------------------------
    // Schema state and drift
    // ------------------------------------------------------------------------

    pub async fn schema_state(&self) -> Result<SchemaState> {
        self.inspector.schema_state(&self.db).await
    }

    /// Schema the applied migrations should have produced.
    pub async fn expected_state(&self) -> Result<SchemaState> {
        let records = self.records().await?;
        replay_state(applied_definitions(&self.registry, &records), &self.inspector)
    }

    /// Drift against the configured baseline (snapshot file or replay).
    pub async fn detect_schema_drift(&self) -> Result<DriftReport> {
        let baseline = match &self.config.baseline_file {
            Some(path) => Baseline::Snapshot(path.clone()),
            None => Baseline::Replay,
        };
        self.detect_schema_drift_against(&baseline).await
    }

    pub async fn detect_schema_drift_against(&self, baseline: &Baseline) -> Result<DriftReport> {
        let expected = match baseline {
            Baseline::Replay => self.expected_state().await?,
            Baseline::Snapshot(path) => load_snapshot(path)?,
        };
        let actual = self.schema_state().await?;
        let report = compare_states(&expected, &actual, &baseline.label());

        if report.is_identical {
            tracing::info!(checksum = %report.actual_checksum, baseline = %report.baseline, "no schema drift");
        } else {
            tracing::warn!(
                missing = report.missing_tables.len(),
                extra = report.extra_tables.len(),
                drift = report.schema_drift.len(),
                "schema drift detected"
            );
        }
        Ok(report)
    }

    /// Write the live schema as a JSON snapshot, atomically.
    pub async fn save_baseline(&self, path: impl AsRef<Path>) -> Result<SchemaState> {
        let path = path.as_ref();
        let state = self.schema_state().await?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &state)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| MigrationError::Io(e.to_string()))?;

        tracing::info!(path = %path.display(), checksum = %state.checksum, "saved schema baseline");
        Ok(state)
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    pub fn validate_migration_files(&self) -> FileValidationReport {
        validate_files(&self.registry)
    }

    pub async fn validate_migration_integrity(&self) -> Result<IntegrityReport> {
        let records = self.records().await?;
        Ok(validate_integrity(&self.registry, &records))
    }

    /// Certify the live schema equals the expected state of `target`.
    pub async fn validate_intended_state(&self, target: &str) -> Result<StateCertificate> {
        let records = self.records().await?;
        let live = self.schema_state().await?;
        let certificate = certify_state(&self.registry, &records, target, &live, &self.inspector)?;
        tracing::info!(version = %certificate.version, checksum = %certificate.checksum, "database state validated");
        Ok(certificate)
    }

    /// Composite health check for CI: integrity, compatibility and pending count.
    pub async fn check_migration_health(&self, runtime_version: &str) -> Result<HealthStatus> {
        let records = self.records().await?;
        let problems = self.integrity_problems(&records);
        let pending = pending_migrations(&self.registry, &records).len();
        let current = records.last().map(|r| r.version.as_str()).unwrap_or_default();

        let compatibility = match self.matrix.evaluate(runtime_version, current) {
            Ok(report) => report,
            Err(err) => return Ok(HealthStatus::Error { detail: err.to_string() }),
        };

        Ok(evaluate_health(&problems, &compatibility, pending))
    }
}
