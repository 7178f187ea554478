use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the target database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// Private in-memory database (tests, scratch replays)
    Memory,
    /// SQLite database file
    File(PathBuf),
}

/// Database connection configuration
///
/// The engine does not decide where this comes from; the CLI fills it from
/// flags or `DATABASE_URL`.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Database location
    pub location: DatabaseLocation,

    /// How long a writer waits on a locked database before failing
    pub busy_timeout: Duration,

    /// Create the database file if it does not exist
    pub create_if_missing: bool,

    /// Enforce foreign keys on the connection
    pub foreign_keys: bool,
}

impl ConnectionConfig {
    /// Configuration for a database file
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            location: DatabaseLocation::File(path.as_ref().to_path_buf()),
            busy_timeout: Duration::from_secs(30),
            create_if_missing: true,
            foreign_keys: true,
        }
    }

    /// Configuration for a private in-memory database
    pub fn in_memory() -> Self {
        Self {
            location: DatabaseLocation::Memory,
            ..Self::new("")
        }
    }

    /// Set busy timeout
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Refuse to create a missing database file
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Toggle foreign key enforcement
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Parse from connection string
    ///
    /// Accepted forms: `sqlite://path/to/app.db`, `sqlite:path/to/app.db`,
    /// `sqlite::memory:`, `:memory:` or a bare path.
    ///
    /// # Examples
    ///
    /// ```
    /// use schemaward::connection::config::{ConnectionConfig, DatabaseLocation};
    ///
    /// let config = ConnectionConfig::from_url("sqlite://data/app.db").unwrap();
    /// assert_eq!(config.location, DatabaseLocation::File("data/app.db".into()));
    /// ```
    pub fn from_url(url: &str) -> Result<Self, String> {
        let url = url.trim();
        if url.is_empty() {
            return Err("Database URL must not be empty".to_string());
        }

        let rest = if let Some(rest) = url.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = url.strip_prefix("sqlite:") {
            rest
        } else if url.contains("://") {
            return Err(format!(
                "Unsupported database URL scheme in '{}'; expected sqlite://",
                url
            ));
        } else {
            url
        };

        // Query parameters are not interpreted.
        let rest = rest.split('?').next().unwrap_or_default();

        if rest == ":memory:" || rest.is_empty() && url.ends_with("://") {
            return Ok(Self::in_memory());
        }
        if rest.is_empty() {
            return Err("Database path must not be empty".to_string());
        }

        Ok(Self::new(rest))
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        match &self.location {
            DatabaseLocation::Memory => "sqlite::memory:".to_string(),
            DatabaseLocation::File(path) => format!("sqlite://{}", path.display()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if let DatabaseLocation::File(path) = &self.location {
            if path.as_os_str().is_empty() {
                return Err("Database path cannot be empty".to_string());
            }
            if !self.create_if_missing && !path.exists() {
                return Err(format!("Database file '{}' does not exist", path.display()));
            }
        }

        if self.busy_timeout.is_zero() {
            return Err("busy_timeout must be > 0".to_string());
        }

        Ok(())
    }
}
