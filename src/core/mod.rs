pub mod checksum;
pub mod error;
pub mod version;

pub use checksum::{migration_checksum, normalize_sql, sha256_hex};
pub use error::{MigrationError, Result};
pub use version::{compare_versions, lenient_semver, same_version};
