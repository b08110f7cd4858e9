// crates/db/src/lib.rs
// Session repository for the context-hub service: sessions, their message
// forests, per-session tasks, and reference-counted binary assets.

pub mod cursor;
mod error;
mod fork;
mod migrations;
mod queries;

pub use cursor::{Cursor, Page};
pub use error::{DbResult, ErrorKind, StoreError};
pub use queries::assets::collect_part_assets;
pub use queries::SessionListFilter;

use context_hub_blobstore::BlobStore;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Fork refuses sessions with more messages than this.
pub const MAX_FORK_MESSAGES: i64 = 5000;
/// Fork refuses sessions referencing more unique assets than this.
pub const MAX_FORK_ASSETS: usize = 1000;
/// Messages are inserted in chunks of this size during fork.
pub const MESSAGE_BATCH_SIZE: usize = 100;
/// Deadline for the observing-status aggregate query.
pub const STATUS_QUERY_TIMEOUT: Duration = Duration::from_secs(30);
/// List page size when the caller passes 0.
pub const DEFAULT_LIST_LIMIT: i64 = 20;
/// Hard cap on list page size.
pub const MAX_LIST_LIMIT: i64 = 200;

/// Connection settings for the backing PostgreSQL database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// Minimum number of idle connections.
    pub min_connections: u32,
    /// How long to wait for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/context_hub".to_string(),
            max_connections: 16,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Main repository handle: a PostgreSQL pool plus the object store holding
/// message parts envelopes.
///
/// All mutations go through transactions; there is no process-wide mutable
/// state. Clones share the pool and the blob store.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    blobs: Arc<dyn BlobStore>,
}

impl Database {
    /// Connect to PostgreSQL and run inline migrations.
    pub async fn connect(config: &DatabaseConfig, blobs: Arc<dyn BlobStore>) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        let db = Self { pool, blobs };
        db.run_migrations().await?;

        info!(
            "database pool ready ({} max connections)",
            config.max_connections
        );
        Ok(db)
    }

    /// Wrap an existing pool (tests, embedded setups). Runs migrations.
    pub async fn with_pool(pool: PgPool, blobs: Arc<dyn BlobStore>) -> DbResult<Self> {
        let db = Self { pool, blobs };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all inline migrations.
    ///
    /// Uses a `_migrations` table to track which migrations have already been
    /// applied, so that non-idempotent statements are only executed once.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1; // 1-based
            if version > current_version {
                sqlx::raw_sql(migration).execute(&self.pool).await?;
                sqlx::query("INSERT INTO _migrations (version) VALUES ($1)")
                    .bind(version as i64)
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the object store.
    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }
}
