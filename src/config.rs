use std::path::PathBuf;
use std::time::Duration;

/// Settings needed to open the backing store and place report artifacts.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Directory generated CSV reports are written to
    pub reports_dir: PathBuf,
    /// Upper bound on pooled connections
    pub max_connections: u32,
    /// How long a unit of work waits for the write lock before failing
    pub busy_timeout: Duration,
}

impl LedgerConfig {
    pub const DEFAULT_DATABASE: &'static str = "holdbook.db";
    pub const DEFAULT_REPORTS_DIR: &'static str = "data";
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 30;

    pub fn new(database_path: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            reports_dir: reports_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(Self::DEFAULT_DATABASE),
            reports_dir: PathBuf::from(Self::DEFAULT_REPORTS_DIR),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_secs(Self::DEFAULT_BUSY_TIMEOUT_SECS),
        }
    }
}
