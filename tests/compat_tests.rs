mod support;

use schemaward::{
    CompatibilityLevel, CompatibilityMatrix, CompatibilityRule, CompatibilityStatus, EngineConfig,
    HealthStatus, Migration, MigrationEngine, MigrationError, MigrationOptions, MigrationRegistry,
};
use std::fs;
use support::*;
use tempfile::TempDir;

fn one_x_only() -> CompatibilityMatrix {
    CompatibilityMatrix::new(vec![
        CompatibilityRule::parse("1.x", "1.x", CompatibilityLevel::Compatible).unwrap(),
    ])
}

fn semver_registry() -> MigrationRegistry {
    MigrationRegistry::from_migrations(vec![
        Migration::new("1.0.0", "create_users", USERS_UP, USERS_DOWN),
    ])
}

#[tokio::test]
async fn test_runtime_two_against_one_x_schema_is_incompatible() {
    let (_tmp, engine) = engine_with(semver_registry());
    let engine = engine.with_matrix(one_x_only());
    engine.auto_migrate(&MigrationOptions::default()).await.unwrap();

    let report = engine.check_compatibility("2.0.0").await.unwrap();
    assert_eq!(report.current_db_version, "1.0.0");
    assert_eq!(report.status, CompatibilityStatus::Incompatible);
    assert!(!report.is_compatible());

    let ok = engine.check_compatibility("1.9.3").await.unwrap();
    assert_eq!(ok.status, CompatibilityStatus::Compatible);

    let health = engine.check_migration_health("2.0.0").await.unwrap();
    assert!(matches!(health, HealthStatus::Incompatible { .. }));
    assert_eq!(health.exit_code(), 2);
}

#[tokio::test]
async fn test_fresh_database_is_uninitialized() {
    let (_tmp, engine) = engine_with(semver_registry());
    let report = engine.check_compatibility("1.0.0").await.unwrap();
    assert_eq!(report.status, CompatibilityStatus::Uninitialized);
    assert_eq!(report.current_db_version, "");
}

#[tokio::test]
async fn test_fail_on_incompatible_aborts_before_any_change() {
    let (_tmp, engine) = engine_with(semver_registry());
    let engine = engine.with_matrix(one_x_only());

    let err = engine
        .auto_migrate(&MigrationOptions {
            fail_on_incompatible: true,
            runtime_version: Some("2.0.0".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    match &err {
        MigrationError::IncompatibleVersion {
            runtime,
            db_version,
            ..
        } => {
            assert_eq!(runtime, "2.0.0");
            assert_eq!(db_version, "1.0.0");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.exit_code(), 2);
    assert!(table_names(&engine).await.is_empty());
    assert!(engine.status().await.unwrap().applied.is_empty());
}

#[tokio::test]
async fn test_fail_on_incompatible_requires_runtime_version() {
    let (_tmp, engine) = engine_with(semver_registry());
    let err = engine
        .auto_migrate(&MigrationOptions {
            fail_on_incompatible: true,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::InvalidVersion(_)));
}

#[tokio::test]
async fn test_incompatible_without_flag_still_migrates() {
    let (_tmp, engine) = engine_with(semver_registry());
    let engine = engine.with_matrix(one_x_only());
    engine
        .auto_migrate(&MigrationOptions {
            runtime_version: Some("2.0.0".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(table_names(&engine).await, vec!["users"]);
}

#[tokio::test]
async fn test_derived_rules_gate_on_metadata_bounds() {
    let registry = MigrationRegistry::from_migrations(vec![
        Migration::new("1", "create_users", USERS_UP, USERS_DOWN).with_runtime_bounds(Some("1.0.0"), None),
        Migration::new("2", "create_posts", POSTS_UP, POSTS_DOWN).with_runtime_bounds(Some("1.5.0"), Some("3.0.0")),
    ]);
    let (_tmp, engine) = engine_with(registry);

    // 1.2.0 can run against version 1 but not version 2, which the plan reaches
    let err = engine
        .auto_migrate(&MigrationOptions {
            fail_on_incompatible: true,
            runtime_version: Some("1.2.0".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::IncompatibleVersion { ref db_version, .. } if db_version == "2"));
    assert!(table_names(&engine).await.is_empty());

    // a newer major than the minimum only degrades, so the run proceeds
    let report = engine
        .auto_migrate(&MigrationOptions {
            fail_on_incompatible: true,
            runtime_version: Some("2.1.0".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(report.versions(), vec!["1", "2"]);

    let degraded = engine.check_compatibility("2.1.0").await.unwrap();
    assert_eq!(degraded.status, CompatibilityStatus::Degraded);
    let health = engine.check_migration_health("2.1.0").await.unwrap();
    assert_eq!(health.exit_code(), 1);

    let too_new = engine.check_compatibility("3.0.1").await.unwrap();
    assert_eq!(too_new.status, CompatibilityStatus::Incompatible);
}

#[tokio::test]
async fn test_matrix_file_in_migrations_dir_is_used() {
    let tmp = TempDir::new().unwrap();
    write_dir_migration(
        tmp.path(),
        "001_create_users",
        r#"{"version": "1", "name": "create_users"}"#,
        USERS_UP,
        Some(USERS_DOWN),
    );
    fs::write(
        tmp.path().join("compatibility.json"),
        r#"[
            {"runtime": ">=4.0.0", "db": "*", "status": "incompatible", "note": "4.x needs schema 2"},
            {"runtime": "*", "db": "*", "status": "compatible"}
        ]"#,
    )
    .unwrap();

    let db = schemaward::Database::open_in_memory().unwrap();
    let engine = MigrationEngine::new(db, EngineConfig::new(tmp.path())).unwrap();
    assert_eq!(engine.matrix().rules().len(), 2);

    engine.auto_migrate(&MigrationOptions::default()).await.unwrap();
    let report = engine.check_compatibility("4.2.0").await.unwrap();
    assert_eq!(report.status, CompatibilityStatus::Incompatible);
    assert_eq!(report.note.as_deref(), Some("4.x needs schema 2"));
    assert_eq!(
        engine.check_compatibility("3.9.0").await.unwrap().status,
        CompatibilityStatus::Compatible
    );
}

#[tokio::test]
async fn test_invalid_runtime_version() {
    let (_tmp, engine) = engine_with(sample_registry());
    assert!(matches!(
        engine.check_compatibility("not-a-version").await,
        Err(MigrationError::InvalidVersion(_))
    ));
    let health = engine.check_migration_health("not-a-version").await.unwrap();
    assert_eq!(health.exit_code(), 2);
}
