//! Order sync engine.
//!
//! One [`SyncCoordinator`] per request fans out one [`ShopSyncWorker`] per
//! connected shop. Each worker owns its own [`RateGovernor`] and retry state,
//! so a throttled or failing shop never slows down or fails another one.
//!
//! ```text
//! SyncCoordinator::sync_account
//!   ├── tokio::spawn ─ ShopSyncWorker::run (shop-a)
//!   │     PageFetcher ──► RateGovernor ──► ShopApi
//!   │     BatchWriter ──► OrderStore
//!   ├── tokio::spawn ─ ShopSyncWorker::run (shop-b)
//!   └── mpsc ◄── one ShopSyncResult per shop
//! ```

mod coordinator;
mod fetcher;
mod governor;
mod worker;
mod writer;

pub use coordinator::SyncCoordinator;
pub use fetcher::{FetchedPage, PageFetcher, RetryState};
pub use governor::RateGovernor;
pub use worker::{ShopSyncWorker, SyncProgress};
pub use writer::{BatchError, BatchWriter};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{CredentialError, RepositoryError};
use crate::shopify::ShopApiError;

/// Reasons a single shop's sync run stops early.
#[derive(Debug, Error)]
pub enum ShopSyncError {
    /// The stored credential is malformed; the shop was never contacted.
    #[error(transparent)]
    InvalidCredential(#[from] CredentialError),

    /// Fetching a page failed terminally.
    #[error("fetch failed after {retries} retries: {source}")]
    Fetch {
        /// Throttling retries spent on the failing page.
        retries: u32,
        /// Underlying API error.
        #[source]
        source: ShopApiError,
    },

    /// Committing a batch failed.
    #[error("batch write failed: {0}")]
    Batch(#[from] BatchError),

    /// The shop's deadline passed before the next page fetch.
    #[error("shop sync deadline exceeded")]
    Deadline,

    /// The remote listing went back in time, so committing it could move the
    /// watermark past orders that were not stored yet.
    #[error("order {order_id} updated at {updated_at} listed after {previous}; listing is not sorted by updated_at")]
    OutOfOrder {
        /// Remote ID of the offending order.
        order_id: i64,
        /// Its `updated_at`.
        updated_at: DateTime<Utc>,
        /// Latest `updated_at` listed before it in this run.
        previous: DateTime<Utc>,
    },
}

/// Failure of a whole account sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The account's shop credentials could not be listed.
    #[error("failed to list shop credentials: {0}")]
    Credentials(#[source] RepositoryError),
}
