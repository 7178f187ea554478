#![allow(dead_code)]

use schemaward::{Database, EngineConfig, Migration, MigrationEngine, MigrationRegistry};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const USERS_UP: &str = "CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);";
pub const USERS_DOWN: &str = "DROP TABLE users;";

pub const POSTS_UP: &str = "CREATE TABLE posts (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    body TEXT
);
CREATE INDEX idx_posts_user ON posts (user_id);";
pub const POSTS_DOWN: &str = "DROP TABLE posts;";

pub const VIEW_UP: &str = "CREATE VIEW active_users AS SELECT u.id, u.email FROM users u JOIN posts p ON p.user_id = u.id;";
pub const VIEW_DOWN: &str = "DROP VIEW active_users;";

/// Three reversible migrations: table, table with index, view.
pub fn sample_migrations() -> Vec<Migration> {
    vec![
        Migration::new("1", "create_users", USERS_UP, USERS_DOWN)
            .with_runtime_bounds(Some("1.0.0"), None),
        Migration::new("2", "create_posts", POSTS_UP, POSTS_DOWN).with_dependencies(["1"]),
        Migration::new("3", "active_users_view", VIEW_UP, VIEW_DOWN),
    ]
}

pub fn sample_registry() -> MigrationRegistry {
    MigrationRegistry::from_migrations(sample_migrations())
}

/// Engine over an in-memory database and an in-code registry.
///
/// The returned directory stands in for the migrations directory so no
/// stray `compatibility.json` is picked up.
pub fn engine_with(registry: MigrationRegistry) -> (TempDir, MigrationEngine) {
    let tmp = TempDir::new().unwrap();
    let db = Database::open_in_memory().unwrap();
    let engine = MigrationEngine::with_registry(db, EngineConfig::new(tmp.path()), registry).unwrap();
    (tmp, engine)
}

/// Second engine on the same database, with different definitions.
pub fn reopen_with(engine: &MigrationEngine, registry: MigrationRegistry) -> MigrationEngine {
    MigrationEngine::with_registry(engine.database().clone(), engine.config().clone(), registry).unwrap()
}

/// Write a migration in the directory layout.
pub fn write_dir_migration(root: &Path, entry: &str, metadata: &str, up: &str, down: Option<&str>) {
    let dir = root.join(entry);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("metadata.json"), metadata).unwrap();
    fs::write(dir.join("up.sql"), up).unwrap();
    if let Some(down) = down {
        fs::write(dir.join("down.sql"), down).unwrap();
    }
}

pub async fn table_names(engine: &MigrationEngine) -> Vec<String> {
    engine
        .schema_state()
        .await
        .unwrap()
        .tables
        .into_iter()
        .map(|t| t.name)
        .collect()
}
