//! Command-line front end, shared by the `schemaward` binary and its tests.

pub mod args;
pub mod render;

use crate::drift::Baseline;
use crate::{
    ConnectionConfig, EngineConfig, FileValidationReport, IntegrityReport, MigrationEngine,
    MigrationError, MigrationOptions, OverallStatus, RollbackOptions,
};
use anyhow::{Context, Result, anyhow};
use args::{Cli, Command};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

/// Write either the JSON form (quiet) or the human form.
fn emit<T, W>(out: &mut W, quiet: bool, value: &T, human: impl FnOnce(&T) -> String) -> Result<()>
where
    T: Serialize,
    W: Write,
{
    if quiet {
        writeln!(out, "{}", serde_json::to_string(value)?)?;
    } else {
        write!(out, "{}", human(value))?;
    }
    Ok(())
}

fn engine(cli: &Cli) -> Result<MigrationEngine> {
    let connection = ConnectionConfig::from_url(&cli.database_url)
        .map_err(|e| anyhow!(e))
        .context("invalid database URL")?;

    let mut config = EngineConfig::new(&cli.migrations_dir).bookkeeping_table(&cli.table);
    if let Some(path) = &cli.compatibility_file {
        config = config.compatibility_file(path);
    }
    if let Some(secs) = cli.lock_ttl {
        config = config.lock_ttl(Duration::from_secs(secs));
    }

    MigrationEngine::open(&connection, config)
        .with_context(|| format!("failed to initialise engine for {}", connection.to_url()))
}

/// Report a failed command on stderr and return its exit code.
///
/// Non-fatal migration errors go to the log instead.
pub fn report_failure(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<MigrationError>() {
        Some(migration) if !migration.is_fatal() => {
            tracing::info!("{}", migration);
            migration.exit_code()
        }
        Some(migration) => {
            eprintln!("error: {:#}", err);
            migration.exit_code()
        }
        None => {
            eprintln!("error: {:#}", err);
            1
        }
    }
}

/// Run one command against stdout, returning the process exit code.
pub async fn run(cli: Cli) -> Result<u8> {
    execute(cli, &mut std::io::stdout()).await
}

/// Run one command, writing its report to `out`.
pub async fn execute<W: Write>(cli: Cli, out: &mut W) -> Result<u8> {
    let quiet = cli.quiet;
    let engine = engine(&cli)?;

    match cli.command {
        Command::Up {
            runtime_version,
            dry_run,
            fail_on_incompatible,
            max_version,
        } => {
            let options = MigrationOptions {
                dry_run,
                fail_on_incompatible,
                runtime_version,
                quiet,
                max_version,
            };
            let report = engine.auto_migrate(&options).await?;
            emit(out, quiet, &report, render::migration_report)?;
            Ok(0)
        }

        Command::Down { version, dry_run } => {
            let options = RollbackOptions { dry_run, quiet };
            match engine.rollback_to_version(&version, &options).await {
                Ok(report) => {
                    emit(out, quiet, &report, render::migration_report)?;
                    Ok(0)
                }
                Err(err) if !err.is_fatal() => {
                    tracing::info!("{}", err);
                    Ok(err.exit_code())
                }
                Err(err) => Err(err.into()),
            }
        }

        Command::Status => {
            let status = engine.status().await?;
            emit(out, quiet, &status, render::status)?;
            Ok(match status.overall {
                OverallStatus::Error => 2,
                OverallStatus::UpToDate | OverallStatus::Pending => 0,
            })
        }

        Command::Compatibility { runtime_version } => {
            let report = engine.check_compatibility(&runtime_version).await?;
            emit(out, quiet, &report, render::compatibility)?;
            Ok(if report.is_compatible() { 0 } else { 2 })
        }

        Command::Validate => {
            #[derive(Serialize)]
            struct Validation {
                passed: bool,
                files: FileValidationReport,
                integrity: IntegrityReport,
            }

            let files = engine.validate_migration_files();
            let integrity = engine.validate_migration_integrity().await?;
            let validation = Validation {
                passed: files.passed() && integrity.passed(),
                files,
                integrity,
            };
            emit(out, quiet, &validation, |v| render::validation(&v.files, &v.integrity))?;
            Ok(if validation.passed { 0 } else { 2 })
        }

        Command::Check { runtime_version } => {
            let health = engine.check_migration_health(&runtime_version).await?;
            emit(out, quiet, &health, |h| format!("{}\n", h.message()))?;
            Ok(health.exit_code())
        }

        Command::SchemaState => {
            let state = engine.schema_state().await?;
            emit(out, quiet, &state, render::schema_state)?;
            Ok(0)
        }

        Command::DriftDetect { baseline } => {
            let baseline = match baseline {
                Some(path) => Baseline::Snapshot(path),
                None => Baseline::Replay,
            };
            let report = engine.detect_schema_drift_against(&baseline).await?;
            emit(out, quiet, &report, render::drift)?;
            Ok(if report.is_identical { 0 } else { 1 })
        }

        Command::ValidateState { version } => {
            let certificate = engine.validate_intended_state(&version).await?;
            emit(out, quiet, &certificate, |c| {
                format!("PASS: schema matches the intended state of version {} ({})\n", c.version, c.checksum)
            })?;
            Ok(0)
        }

        Command::SaveBaseline { path } => {
            let state = engine.save_baseline(&path).await?;
            #[derive(Serialize)]
            struct Saved<'a> {
                path: String,
                checksum: &'a str,
            }
            let saved = Saved {
                path: path.display().to_string(),
                checksum: &state.checksum,
            };
            emit(out, quiet, &saved, |s| format!("Saved baseline {} ({})\n", s.path, s.checksum))?;
            Ok(0)
        }

        Command::List => {
            let listing = engine.available_migrations();
            emit(out, quiet, &listing, render::listing)?;
            Ok(0)
        }

        Command::Unlock => {
            #[derive(Serialize)]
            struct Unlocked {
                released: Option<String>,
            }
            let unlocked = Unlocked {
                released: engine.unlock().await?,
            };
            emit(out, quiet, &unlocked, |u| match &u.released {
                Some(holder) => format!("Released migration lock held by {}\n", holder),
                None => "No migration lock was held.\n".to_string(),
            })?;
            Ok(0)
        }
    }
}
