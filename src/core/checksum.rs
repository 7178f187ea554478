use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Content checksum of a migration: forward script, a NUL separator, reverse script.
///
/// The separator keeps `("ab", "c")` and `("a", "bc")` apart.
pub fn migration_checksum(up: &str, down: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(up.as_bytes());
    hasher.update([0u8]);
    hasher.update(down.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
