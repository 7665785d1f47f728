//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! storelink migrate
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! # Migration Files
//!
//! Migrations are embedded from `crates/sync/migrations/`:
//! ```text
//! migrations/
//! ├── 20260301000001_create_shop_tokens.sql
//! └── 20260301000002_create_orders.sql
//! ```

use storelink_sync::SyncConfig;
use storelink_sync::db::run_migrations;
use thiserror::Error;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Apply all pending migrations.
pub async fn run(config: &SyncConfig) -> Result<(), MigrationError> {
    let pool = super::connect(config).await?;

    tracing::info!("Running migrations...");
    run_migrations(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
