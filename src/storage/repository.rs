use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

use crate::config::LedgerConfig;

use super::MIGRATION_001_INITIAL;

/// Owns the connection pool shared by every request.
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database described by `config`, creating the file if needed.
    pub async fn connect(config: &LedgerConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to database {}",
                    config.database_path.display()
                )
            })?;

        debug!(
            database = %config.database_path.display(),
            max_connections = config.max_connections,
            "Connected to database"
        );
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(config: &LedgerConfig) -> Result<Self> {
        let repo = Self::connect(config).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Pool for reads that need no unit of work.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a unit of work. Nothing it writes is visible until `commit`.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin unit of work")?;
        Ok(UnitOfWork { tx })
    }

    /// Release every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// One atomic group of store reads and writes.
/// Dropping it without calling `commit` rolls everything back and releases the lock.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    /// Connection scoped to this unit of work, to pass to the store functions.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("Failed to commit unit of work")
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("Failed to roll back unit of work")
    }
}
