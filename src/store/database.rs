/// Connection setup and schema for the record store
///
/// One SQLite database holds every record type. File databases are created on
/// first use; the in-memory variant pins a single connection so that all queries
/// see the same database.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// SQLite-backed record store
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `url` and make sure the schema exists
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;

        tracing::info!("🗄️ Opened record store: {}", url);

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database, used by tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes; safe to call repeatedly
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS releases (
                id TEXT PRIMARY KEY,
                design_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                definition TEXT NOT NULL,
                marked_at INTEGER NOT NULL,
                marked_unfinished INTEGER NOT NULL DEFAULT 0,
                marked_deleted INTEGER NOT NULL DEFAULT 0,
                CHECK (NOT (marked_unfinished = 1 AND marked_deleted = 1))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instances (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                design_id TEXT NOT NULL,
                release_id TEXT NOT NULL,
                new_release_id TEXT,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                ready INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                parameters TEXT NOT NULL,
                running_maintenance_ids TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS modules (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                instance_id TEXT NOT NULL,
                design_id TEXT NOT NULL,
                release_id TEXT NOT NULL,
                module_type TEXT NOT NULL,
                module_data TEXT NOT NULL,
                delete_info TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS variables (
                instance_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (instance_id, user_id, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_releases_design ON releases(design_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_releases_marks ON releases(marked_unfinished, marked_deleted)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_instances_release ON instances(release_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_modules_instance ON modules(instance_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
