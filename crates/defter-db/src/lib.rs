//! # defter-db
//!
//! Persistence for the defter ingestion pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - The PostgreSQL upload record repository and audit log
//! - An in-memory repository with the same semantics
//! - The content store for uploaded bytes
//!
//! ## Example
//!
//! ```rust,ignore
//! use defter_db::Database;
//!
//! let db = Database::connect_with_config("postgres://localhost/defter", PoolConfig::new()).await?;
//! db.migrate().await?;
//! let records = db.uploads.list(ListDocumentsRequest::new(scope)).await?;
//! ```

pub mod content_store;
pub mod memory;
pub mod pool;
pub mod uploads;

// Always compiled so integration tests in tests/ can use it
pub mod test_fixtures;

pub use defter_core::*;

pub use content_store::{
    compute_content_hash, generate_storage_path, ContentStore, FilesystemBackend, StorageBackend,
    StoredObject,
};
pub use memory::InMemoryUploadRepository;
pub use pool::{create_pool_with_config, log_pool_metrics, PoolConfig};
pub use uploads::PgUploadRepository;

/// Database context: the pool plus the repositories built on it.
#[derive(Clone)]
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub uploads: PgUploadRepository,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            uploads: PgUploadRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
