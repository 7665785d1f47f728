//! Account order sync command.
//!
//! # Usage
//!
//! ```bash
//! storelink sync --account acct-1
//! storelink sync --account acct-1 --deadline-secs 600
//! ```
//!
//! Prints the per-shop report as JSON. Exits with status 1 unless every shop
//! synced successfully.

use std::sync::Arc;
use std::time::Duration;

use storelink_core::{AccountId, NameError};
use storelink_sync::db::{PgCredentialStore, PgOrderStore};
use storelink_sync::shopify::{ShopApiError, ShopifyRestClient};
use storelink_sync::{SyncConfig, SyncCoordinator, SyncError};
use thiserror::Error;
use tokio::time::Instant;

/// Errors that prevent a sync from running.
#[derive(Debug, Error)]
pub enum SyncCommandError {
    /// Invalid account identifier.
    #[error("Invalid account: {0}")]
    InvalidAccount(#[from] NameError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client could not be built.
    #[error("Shopify client error: {0}")]
    Client(#[from] ShopApiError),

    /// The sync could not start.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The report could not be serialized.
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sync every shop of `account` and print the report.
///
/// Returns whether every shop synced successfully.
pub async fn run(
    config: &SyncConfig,
    account: &str,
    deadline_secs: Option<u64>,
) -> Result<bool, SyncCommandError> {
    let account = AccountId::parse(account)?;
    let deadline = deadline_after(Instant::now(), deadline_secs);

    let pool = super::connect(config).await?;
    let coordinator = SyncCoordinator::new(
        Arc::new(PgCredentialStore::new(pool.clone())),
        Arc::new(ShopifyRestClient::new(&config.shopify)?),
        Arc::new(PgOrderStore::new(pool)),
        config.settings.clone(),
    );

    let report = coordinator.sync_account(&account, deadline).await?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    let unsuccessful = report.unsuccessful_shops();
    if !unsuccessful.is_empty() {
        tracing::warn!(shops = ?unsuccessful, "Some shops did not sync");
    }
    Ok(report.is_fully_successful())
}

/// The instant `secs` seconds after `now`.
///
/// A value too large to represent is treated as no deadline.
fn deadline_after(now: Instant, secs: Option<u64>) -> Option<Instant> {
    let secs = secs?;
    let deadline = now.checked_add(Duration::from_secs(secs));
    if deadline.is_none() {
        tracing::warn!(deadline_secs = secs, "Deadline out of range, running without one");
    }
    deadline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_after_adds_seconds() {
        let now = Instant::now();
        assert_eq!(
            deadline_after(now, Some(600)),
            Some(now + Duration::from_secs(600))
        );
        assert_eq!(deadline_after(now, None), None);
    }

    #[test]
    fn test_out_of_range_deadline_is_ignored() {
        assert_eq!(deadline_after(Instant::now(), Some(u64::MAX)), None);
    }
}
