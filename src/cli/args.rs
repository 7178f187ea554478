use clap::{Parser, Subcommand};
use crate::DEFAULT_BOOKKEEPING_TABLE;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "schemaward")]
#[command(version)]
#[command(about = "Schema migrations with compatibility gating and drift verification")]
pub struct Cli {
    /// Target database (`sqlite://path`, `sqlite::memory:` or a file path)
    #[arg(long, env = "DATABASE_URL", global = true, default_value = "sqlite://app.db")]
    pub database_url: String,

    /// Directory holding the migration definitions
    #[arg(long, env = "MIGRATIONS_DIR", global = true, default_value = "migrations")]
    pub migrations_dir: PathBuf,

    /// Bookkeeping table name
    #[arg(long, env = "MIGRATIONS_TABLE", global = true, default_value = DEFAULT_BOOKKEEPING_TABLE)]
    pub table: String,

    /// Explicit compatibility matrix (JSON array of rules)
    #[arg(long, env = "COMPATIBILITY_FILE", global = true)]
    pub compatibility_file: Option<PathBuf>,

    /// Seconds before an abandoned migration lock may be taken over
    #[arg(long, env = "MIGRATIONS_LOCK_TTL", global = true, value_name = "SECONDS")]
    pub lock_ttl: Option<u64>,

    /// Only warnings on stderr; machine-readable single-line JSON on stdout
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending migrations
    Up {
        #[arg(long, env = "RUNTIME_VERSION")]
        runtime_version: Option<String>,
        /// Show the plan without touching the database
        #[arg(long)]
        dry_run: bool,
        /// Abort if the runtime is incompatible with any version on the way
        #[arg(long)]
        fail_on_incompatible: bool,
        /// Stop after this version
        #[arg(long = "to")]
        max_version: Option<String>,
    },
    /// Roll back to a target version (`0` reverts everything)
    Down {
        version: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Applied and pending migrations
    Status,
    /// Compatibility verdict for a runtime build
    Compatibility {
        #[arg(long, env = "RUNTIME_VERSION")]
        runtime_version: String,
    },
    /// Check migration files and applied records
    Validate,
    /// Composite health check (exit 0 healthy, 1 actionable, 2 fatal)
    Check {
        #[arg(long, env = "RUNTIME_VERSION")]
        runtime_version: String,
    },
    /// Fingerprint of the live schema
    SchemaState,
    /// Compare the live schema with its expected state
    DriftDetect {
        /// Snapshot written by `save-baseline`; defaults to replaying the migrations
        #[arg(long)]
        baseline: Option<PathBuf>,
    },
    /// Certify the live schema equals the expected state of a version
    ValidateState { version: String },
    /// Write the live schema as a JSON snapshot
    SaveBaseline { path: PathBuf },
    /// List known migrations
    List,
    /// Remove a migration lock left behind by a crashed run
    Unlock,
}
