//! Reading migration definitions from disk.
//!
//! Two layouts are understood and may be mixed in one directory:
//!
//! * `<dir>/<entry>/metadata.json` + `up.sql` + optional `down.sql`
//! * `<dir>/NNN_name.sql`, forward script first, reverse script after a
//!   `-- DOWN` marker line
//!
//! Entries are visited in natural name order, which becomes the source order
//! the registry checks for monotonic versions.

use super::{Migration, MigrationMetadata};
use crate::core::{MigrationError, Result, compare_versions};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref SINGLE_FILE: Regex = Regex::new(r"^(\d+)_(.+)\.sql$").unwrap();
    static ref DOWN_MARKER: Regex = Regex::new(r"(?im)^[ \t]*--[ \t]*DOWN\b.*$").unwrap();
    static ref UP_MARKER: Regex = Regex::new(r"(?i)^\s*--[ \t]*UP\b[^\n]*\n?").unwrap();
}

pub const METADATA_FILE: &str = "metadata.json";
pub const UP_FILE: &str = "up.sql";
pub const DOWN_FILE: &str = "down.sql";

#[derive(Debug, Deserialize)]
struct MetadataFile {
    version: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    min_runtime_version: Option<String>,
    #[serde(default)]
    max_runtime_version: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Load every migration under `dir` in source order.
///
/// A missing directory is an empty migration set.
pub fn load_migrations(dir: &Path) -> Result<Vec<Migration>> {
    if !dir.exists() {
        tracing::warn!(dir = %dir.display(), "migrations directory does not exist");
        return Ok(Vec::new());
    }

    let mut entries: Vec<(String, PathBuf)> = fs::read_dir(dir)
        .map_err(|e| registry_error(dir, e))?
        .map(|entry| {
            let entry = entry.map_err(|e| registry_error(dir, e))?;
            Ok((entry.file_name().to_string_lossy().into_owned(), entry.path()))
        })
        .collect::<Result<_>>()?;
    entries.sort_by(|a, b| compare_versions(&a.0, &b.0).then_with(|| a.0.cmp(&b.0)));

    let mut migrations = Vec::new();
    for (file_name, path) in entries {
        if path.is_dir() {
            let metadata_path = path.join(METADATA_FILE);
            if metadata_path.is_file() {
                migrations.push(load_directory_entry(&path)?);
            } else {
                tracing::debug!(entry = %file_name, "skipping directory without metadata.json");
            }
        } else if let Some(caps) = SINGLE_FILE.captures(&file_name) {
            let content = read(&path)?;
            let (up, down) = split_single_file(&content);
            migrations.push(Migration::new(&caps[1], &caps[2], up, down));
        }
    }

    Ok(migrations)
}

fn load_directory_entry(dir: &Path) -> Result<Migration> {
    let metadata_path = dir.join(METADATA_FILE);
    let raw = read(&metadata_path)?;
    let meta: MetadataFile = serde_json::from_str(&raw).map_err(|e| {
        MigrationError::Registry(format!("{}: {}", metadata_path.display(), e))
    })?;

    if meta.version.trim().is_empty() {
        return Err(MigrationError::Registry(format!(
            "{}: version must not be empty",
            metadata_path.display()
        )));
    }

    let up_path = dir.join(UP_FILE);
    if !up_path.is_file() {
        return Err(MigrationError::Registry(format!(
            "{}: missing {}",
            dir.display(),
            UP_FILE
        )));
    }
    let up = read(&up_path)?;

    let down_path = dir.join(DOWN_FILE);
    let down = if down_path.is_file() {
        read(&down_path)?
    } else {
        String::new()
    };

    let mut migration = Migration::new(meta.version.trim(), meta.name, up, down);
    migration.metadata = MigrationMetadata {
        description: non_empty(meta.description),
        min_runtime_version: non_empty(meta.min_runtime_version),
        max_runtime_version: non_empty(meta.max_runtime_version),
        dependencies: meta.dependencies,
        author: non_empty(meta.author),
        created_at: non_empty(meta.created_at),
        pinned_checksum: non_empty(meta.checksum),
    };
    Ok(migration)
}

/// Split a single-file migration into forward and reverse scripts.
pub fn split_single_file(content: &str) -> (String, String) {
    let (up, down) = match DOWN_MARKER.find(content) {
        Some(marker) => (&content[..marker.start()], &content[marker.end()..]),
        None => (content, ""),
    };
    let up = UP_MARKER.replace(up, "");
    (up.trim().to_string(), down.trim().to_string())
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| registry_error(path, e))
}

fn registry_error(path: &Path, err: std::io::Error) -> MigrationError {
    MigrationError::Registry(format!("{}: {}", path.display(), err))
}
