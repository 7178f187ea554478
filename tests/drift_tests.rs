mod support;

use schemaward::drift::Baseline;
use schemaward::{
    EngineConfig, Migration, MigrationError, MigrationOptions, MigrationRegistry, RollbackOptions,
};
use std::fs;
use support::*;
use tempfile::TempDir;

#[tokio::test]
async fn test_no_drift_after_full_apply() {
    let (_tmp, engine) = engine_with(sample_registry());
    engine.auto_migrate(&MigrationOptions::default()).await.unwrap();

    let report = engine.detect_schema_drift().await.unwrap();
    assert!(report.is_identical, "{:?}", report.differences);
    assert!(report.checksum_match);
    assert_eq!(report.expected_checksum, report.actual_checksum);
    assert_eq!(report.baseline, "registry replay");
}

#[tokio::test]
async fn test_no_drift_on_partial_apply() {
    let (_tmp, engine) = engine_with(sample_registry());
    engine
        .auto_migrate(&MigrationOptions {
            max_version: Some("2".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(engine.detect_schema_drift().await.unwrap().is_identical);
}

#[tokio::test]
async fn test_out_of_band_changes_are_reported() {
    let (_tmp, engine) = engine_with(sample_registry());
    engine.auto_migrate(&MigrationOptions::default()).await.unwrap();

    engine
        .database()
        .execute_batch(
            "DROP VIEW active_users;
             CREATE TABLE rogue (id INTEGER);
             ALTER TABLE users ADD COLUMN nickname TEXT;
             DROP INDEX idx_posts_user;
             CREATE VIEW active_users AS SELECT id FROM users;",
        )
        .await
        .unwrap();

    let report = engine.detect_schema_drift().await.unwrap();
    assert!(!report.is_identical);
    assert!(!report.checksum_match);
    assert!(report.missing_tables.is_empty());
    assert_eq!(report.extra_tables, vec!["rogue"]);
    assert!(report.schema_drift.contains(&"table users schema drift detected".to_string()));
    assert!(report.schema_drift.contains(&"missing index posts.idx_posts_user".to_string()));
    assert!(report.schema_drift.contains(&"function view active_users differs".to_string()));
    assert_eq!(report.differences[0], "schema states differ");
}

#[tokio::test]
async fn test_dropped_table_is_missing() {
    let (_tmp, engine) = engine_with(sample_registry());
    engine.auto_migrate(&MigrationOptions::default()).await.unwrap();
    engine
        .database()
        .execute_batch("DROP VIEW active_users; DROP TABLE posts;")
        .await
        .unwrap();

    let report = engine.detect_schema_drift().await.unwrap();
    assert_eq!(report.missing_tables, vec!["posts"]);
}

#[tokio::test]
async fn test_bookkeeping_and_lock_tables_are_not_drift() {
    let (_tmp, engine) = engine_with(sample_registry());
    engine.auto_migrate(&MigrationOptions::default()).await.unwrap();

    let state = engine.schema_state().await.unwrap();
    assert!(state.tables.iter().all(|t| !t.name.starts_with("schema_migrations")));
}

#[tokio::test]
async fn test_snapshot_baseline_round_trip() {
    let (tmp, engine) = engine_with(sample_registry());
    engine.auto_migrate(&MigrationOptions::default()).await.unwrap();

    let path = tmp.path().join("baseline.json");
    let saved = engine.save_baseline(&path).await.unwrap();
    assert!(path.is_file());

    let baseline = Baseline::Snapshot(path.clone());
    let clean = engine.detect_schema_drift_against(&baseline).await.unwrap();
    assert!(clean.is_identical);
    assert_eq!(clean.expected_checksum, saved.checksum);
    assert!(clean.baseline.starts_with("snapshot"));

    engine
        .rollback_to_version("2", &RollbackOptions::default())
        .await
        .unwrap();
    let drifted = engine.detect_schema_drift_against(&baseline).await.unwrap();
    assert!(!drifted.is_identical);
    assert!(drifted.schema_drift.contains(&"missing function view active_users".to_string()));

    // the registry replay still agrees with what is applied
    assert!(engine.detect_schema_drift().await.unwrap().is_identical);
}

#[tokio::test]
async fn test_configured_baseline_file_is_default() {
    let (tmp, engine) = engine_with(sample_registry());
    engine.auto_migrate(&MigrationOptions::default()).await.unwrap();
    let path = tmp.path().join("prod-baseline.json");
    engine.save_baseline(&path).await.unwrap();

    let config = EngineConfig::new(tmp.path()).baseline_file(&path);
    let engine = schemaward::MigrationEngine::with_registry(engine.database().clone(), config, sample_registry()).unwrap();
    let report = engine.detect_schema_drift().await.unwrap();
    assert!(report.is_identical);
    assert!(report.baseline.contains("prod-baseline.json"));
}

#[tokio::test]
async fn test_edited_snapshot_is_rejected() {
    let (tmp, engine) = engine_with(sample_registry());
    engine.auto_migrate(&MigrationOptions::default()).await.unwrap();

    let path = tmp.path().join("baseline.json");
    engine.save_baseline(&path).await.unwrap();
    let edited = fs::read_to_string(&path).unwrap().replace("\"email\"", "\"mail\"");
    fs::write(&path, edited).unwrap();

    let err = engine
        .detect_schema_drift_against(&Baseline::Snapshot(path))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::Integrity(_)));
}

#[tokio::test]
async fn test_validate_intended_state() {
    let (_tmp, engine) = engine_with(sample_registry());
    engine
        .auto_migrate(&MigrationOptions {
            max_version: Some("2".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let certificate = engine.validate_intended_state("2").await.unwrap();
    assert_eq!(certificate.version, "2");
    assert_eq!(certificate.checksum, engine.schema_state().await.unwrap().checksum);

    // applied, but something newer is applied as well
    let err = engine.validate_intended_state("1").await.unwrap_err();
    assert!(matches!(err, MigrationError::Integrity(ref msg) if msg.contains("newer migration 2")));

    // known but not applied
    let err = engine.validate_intended_state("3").await.unwrap_err();
    assert!(matches!(err, MigrationError::Integrity(ref msg) if msg.contains("has not been applied")));

    // unknown
    let err = engine.validate_intended_state("9").await.unwrap_err();
    assert!(matches!(err, MigrationError::NotFound(_)));
}

#[tokio::test]
async fn test_validate_intended_state_detects_drift() {
    let (_tmp, engine) = engine_with(sample_registry());
    engine.auto_migrate(&MigrationOptions::default()).await.unwrap();
    engine
        .database()
        .execute_batch("CREATE INDEX idx_users_email ON users (email);")
        .await
        .unwrap();

    let live = engine.schema_state().await.unwrap();
    let err = engine.validate_intended_state("3").await.unwrap_err();
    match err {
        MigrationError::Integrity(msg) => assert!(msg.contains(&live.checksum)),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_save_baseline_into_missing_directory_fails() {
    let (_tmp, engine) = engine_with(sample_registry());
    let dir = TempDir::new().unwrap();
    let err = engine
        .save_baseline(dir.path().join("missing").join("baseline.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::Io(_)));
}

#[tokio::test]
async fn test_validate_intended_state_requires_every_version_through_target() {
    let (_tmp, engine) = engine_with(MigrationRegistry::from_migrations(vec![
        Migration::new("1", "create_users", USERS_UP, USERS_DOWN),
        Migration::new("3", "create_posts", POSTS_UP, POSTS_DOWN),
    ]));
    engine.auto_migrate(&MigrationOptions::default()).await.unwrap();
    engine.validate_intended_state("3").await.unwrap();

    // version 2 shows up later, below the applied head
    let engine = reopen_with(
        &engine,
        MigrationRegistry::from_migrations(vec![
            Migration::new("1", "create_users", USERS_UP, USERS_DOWN),
            Migration::new("2", "late", "CREATE TABLE late (id INTEGER PRIMARY KEY);", "DROP TABLE late;"),
            Migration::new("3", "create_posts", POSTS_UP, POSTS_DOWN),
        ]),
    );
    let err = engine.validate_intended_state("3").await.unwrap_err();
    assert!(matches!(err, MigrationError::Integrity(ref msg) if msg.contains("migration 2 has not been applied")));
}
