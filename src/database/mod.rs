//! Persistence layer.
//!
//! A thin manager over an sqlx SQLite pool. The store is the only source of
//! truth for entry state and room occupancy; every mutation that competes
//! with another caller goes through a conditional `UPDATE` whose
//! `rows_affected` decides who won (see `entry_store` and `staff_store`).

pub mod entry_store;
pub mod schema;
pub mod staff_store;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Queue engine database manager
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database described by the configuration.
    ///
    /// An empty `database_path` opens an in-memory database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        if config.database_path.is_empty() {
            return Self::new_in_memory().await;
        }

        info!("🗄️ Opening queue database at: {}", config.database_path);

        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let database = Self { pool };
        database.initialize_schema().await?;

        info!("✅ Queue database ready");
        Ok(database)
    }

    /// Create an in-memory database for testing.
    ///
    /// The pool is pinned to a single connection that is never reaped;
    /// SQLite gives every new connection its own private in-memory database,
    /// so a second connection would see empty tables.
    pub async fn new_in_memory() -> Result<Self> {
        debug!("🗄️ Creating in-memory queue database");

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        let database = Self { pool };
        database.initialize_schema().await?;

        Ok(database)
    }

    /// Initialize database schema
    async fn initialize_schema(&self) -> Result<()> {
        debug!("📋 Creating queue engine schema");

        schema::create_queue_entries_table(&self.pool).await?;
        schema::create_rooms_table(&self.pool).await?;
        schema::create_staff_table(&self.pool).await?;
        schema::create_indexes(&self.pool).await?;

        debug!("✅ Schema created");
        Ok(())
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute a health check query
    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                error!("❌ Database health check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_database_initializes() {
        let db = Database::new_in_memory().await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn empty_path_falls_back_to_memory() {
        let config = DatabaseConfig {
            database_path: String::new(),
            ..DatabaseConfig::default()
        };
        let db = Database::connect(&config).await.unwrap();
        assert!(db.health_check().await);
    }
}
