//! CLI command implementations.

pub mod migrate;
pub mod orders;
pub mod shops;
pub mod sync;

use sqlx::PgPool;
use storelink_sync::SyncConfig;
use storelink_sync::db::create_pool;

/// Connect to the database named by `DATABASE_URL`.
async fn connect(config: &SyncConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Connecting to database...");
    create_pool(&config.database_url).await
}
