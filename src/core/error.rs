use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Runtime version {runtime} is incompatible with database version {db_version}: {reason}")]
    IncompatibleVersion {
        runtime: String,
        db_version: String,
        reason: String,
    },

    #[error("Migration {version} failed: {source}")]
    MigrationExecution {
        version: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Version '{0}' not found")]
    NotFound(String),

    #[error("Nothing to do: {0}")]
    NoOp(String),

    #[error("Migration {0} has no reverse script")]
    Irreversible(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

impl MigrationError {
    /// Process exit code the CLI reports for this error.
    ///
    /// `NoOp` is informational and maps to success; integrity and
    /// compatibility failures are fatal for deploy pipelines and map to 2.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NoOp(_) => 0,
            Self::Integrity(_) | Self::IncompatibleVersion { .. } => 2,
            _ => 1,
        }
    }

    /// Whether the error should stop a deployment.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NoOp(_))
    }

    pub(crate) fn execution(version: &str, source: rusqlite::Error) -> Self {
        Self::MigrationExecution {
            version: version.to_string(),
            source,
        }
    }
}

impl From<std::io::Error> for MigrationError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
