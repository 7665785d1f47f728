//! Atomic batch commits with their own timeout.

use std::time::Duration;

use storelink_core::{AccountId, Order, ShopName};
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::{BatchOutcome, OrderStore, RepositoryError};

/// Errors from a batch commit.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The store rejected the batch.
    #[error(transparent)]
    Store(#[from] RepositoryError),

    /// The commit did not finish within the batch timeout.
    #[error("batch write timed out after {0:?}")]
    Timeout(Duration),

    /// The store returned without committing.
    #[error("batch was not committed")]
    NotCommitted,
}

/// Commits batches of orders for one shop.
pub struct BatchWriter<'a> {
    store: &'a dyn OrderStore,
    timeout: Duration,
}

impl<'a> BatchWriter<'a> {
    /// Create a writer with a per-batch timeout.
    #[must_use]
    pub fn new(store: &'a dyn OrderStore, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Commit one batch atomically.
    ///
    /// # Errors
    ///
    /// Returns `BatchError` if the store fails, the timeout elapses, or the
    /// store reports the batch as not committed. A failed batch leaves no
    /// partial rows behind.
    pub async fn write(
        &self,
        batch: &[Order],
        shop: &ShopName,
        account_id: &AccountId,
    ) -> Result<BatchOutcome, BatchError> {
        if batch.is_empty() {
            return Ok(BatchOutcome {
                committed: true,
                ..BatchOutcome::default()
            });
        }

        let outcome = tokio::time::timeout(
            self.timeout,
            self.store.upsert_order_batch(batch, shop, account_id),
        )
        .await
        .map_err(|_| BatchError::Timeout(self.timeout))??;

        if !outcome.committed {
            return Err(BatchError::NotCommitted);
        }

        if outcome.duplicates_skipped > 0 {
            warn!(
                duplicates_skipped = outcome.duplicates_skipped,
                "Skipped conflicting orders while committing batch"
            );
        }
        debug!(
            batch_len = batch.len(),
            written = outcome.written,
            unchanged = outcome.unchanged,
            "Committed batch"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::super::testing::{RecordingStore, remote_order};
    use super::*;

    fn orders(n: i64) -> Vec<Order> {
        (1..=n)
            .map(|id| Order::try_from(remote_order(id)).unwrap())
            .collect()
    }

    fn ids() -> (ShopName, AccountId) {
        (
            ShopName::parse("shop-a").unwrap(),
            AccountId::parse("acct-1").unwrap(),
        )
    }

    /// Never finishes a write.
    struct StalledStore;

    #[async_trait]
    impl OrderStore for StalledStore {
        async fn upsert_order_batch(
            &self,
            _orders: &[Order],
            _shop: &ShopName,
            _account_id: &AccountId,
        ) -> Result<BatchOutcome, RepositoryError> {
            std::future::pending().await
        }

        async fn latest_order_timestamp(
            &self,
            _shop: &ShopName,
            _account_id: &AccountId,
        ) -> Result<DateTime<Utc>, RepositoryError> {
            Ok(DateTime::UNIX_EPOCH)
        }
    }

    /// Reports every batch as rolled back.
    struct UncommittedStore;

    #[async_trait]
    impl OrderStore for UncommittedStore {
        async fn upsert_order_batch(
            &self,
            _orders: &[Order],
            _shop: &ShopName,
            _account_id: &AccountId,
        ) -> Result<BatchOutcome, RepositoryError> {
            Ok(BatchOutcome::default())
        }

        async fn latest_order_timestamp(
            &self,
            _shop: &ShopName,
            _account_id: &AccountId,
        ) -> Result<DateTime<Utc>, RepositoryError> {
            Ok(DateTime::UNIX_EPOCH)
        }
    }

    #[tokio::test]
    async fn test_write_commits_batch() {
        let store = RecordingStore::default();
        let writer = BatchWriter::new(&store, Duration::from_secs(300));
        let (shop, account) = ids();

        let outcome = writer.write(&orders(10), &shop, &account).await.unwrap();

        assert!(outcome.committed);
        assert_eq!(outcome.written, 10);
        assert_eq!(store.batch_sizes(), vec![10]);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_store() {
        let store = RecordingStore::default();
        let writer = BatchWriter::new(&store, Duration::from_secs(300));
        let (shop, account) = ids();

        let outcome = writer.write(&[], &shop, &account).await.unwrap();

        assert_eq!(outcome.written, 0);
        assert!(store.batch_sizes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_times_out() {
        let writer = BatchWriter::new(&StalledStore, Duration::from_secs(300));
        let (shop, account) = ids();

        let err = writer.write(&orders(1), &shop, &account).await.unwrap_err();

        assert!(matches!(err, BatchError::Timeout(t) if t == Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn test_store_error_is_batch_failure() {
        let store = RecordingStore {
            fail_writes: true,
            ..RecordingStore::default()
        };
        let writer = BatchWriter::new(&store, Duration::from_secs(300));
        let (shop, account) = ids();

        let err = writer.write(&orders(3), &shop, &account).await.unwrap_err();

        assert!(matches!(err, BatchError::Store(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_uncommitted_outcome_is_batch_failure() {
        let writer = BatchWriter::new(&UncommittedStore, Duration::from_secs(300));
        let (shop, account) = ids();

        let err = writer.write(&orders(3), &shop, &account).await.unwrap_err();

        assert!(matches!(err, BatchError::NotCommitted));
    }
}
