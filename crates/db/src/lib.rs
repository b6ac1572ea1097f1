//! Persistence for notes, audit entries, delivery records and notifications.
//!
//! The engine talks to storage through the traits in [`store`]. Two
//! implementations are provided:
//!
//! - [`PgStore`]: PostgreSQL via `sqlx`, built on the zero-sized
//!   repositories in [`repositories`].
//! - [`MemoryStore`]: process-local maps, used by tests and local runs
//!   without a database.

use sqlx::postgres::PgPoolOptions;

pub mod memory;
pub mod models;
pub mod pg;
pub mod repositories;
pub mod store;

pub use memory::MemoryStore;
pub use pg::PgStore;
pub use store::{AuditStore, DeliveryStore, NoteStore, NotificationStore, StoreError, StoreResult};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
