//! Database layer
//!
//! SQLite through sqlx, with embedded migrations and one repository per
//! resource.
//!
//! ```ignore
//! use preppal::config::DatabaseConfig;
//! use preppal::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool, SqliteDatabase};

/// True when the error chain bottoms out in a UNIQUE constraint violation.
///
/// Repositories wrap sqlx errors in `anyhow` context, so services use this to
/// turn a duplicate insert into a conflict instead of an internal error.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .map(|db| db.is_unique_violation())
            .unwrap_or(false)
    })
}
