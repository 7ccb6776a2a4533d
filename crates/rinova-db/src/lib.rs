//! # rinova-db
//!
//! PostgreSQL database layer for rinova.
//!
//! This crate provides:
//! - Connection pool management
//! - The medical note repository with compare-and-set status transitions
//! - Dashboard and admin analytics computed in SQL
//! - Full-text search with PostgreSQL tsvector
//! - An in-memory store implementing the same traits (feature `memory`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use rinova_db::{Database, NewNote, NoteRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/rinova").await?;
//!     let note = db.notes.insert(NewNote::new("Pt presents with HTN")).await?;
//!     println!("Stored note: {}", note.id);
//!     Ok(())
//! }
//! ```
pub mod analytics;
pub mod filter;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod notes;
pub mod pool;

// Always compiled so integration tests (in tests/) can share the setup.
pub mod test_fixtures;

// Re-export core types
pub use rinova_core::*;

pub use analytics::PgAnalyticsRepository;
pub use filter::{bind_params, NoteFilterQueryBuilder, QueryParam};
#[cfg(any(test, feature = "memory"))]
pub use memory::MemoryNoteRepository;
pub use notes::PgNoteRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Note repository for storage and the extraction lifecycle.
    pub notes: PgNoteRepository,
    /// Aggregate views for the dashboard and admin endpoints.
    pub analytics: PgAnalyticsRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            notes: PgNoteRepository::new(pool.clone()),
            analytics: PgAnalyticsRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
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

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
