//! Syncs every order of one shop since its watermark.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use storelink_core::{AccountId, Order, ShopName, ShopSyncResult};
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::SyncSettings;
use crate::db::{OrderStore, ShopCredential};
use crate::shopify::{OrderListOptions, ShopApi};

use super::{BatchWriter, PageFetcher, RateGovernor, ShopSyncError};

/// Counters of committed work, readable even if the run panics.
#[derive(Debug, Default)]
pub struct SyncProgress {
    orders_synced: AtomicU64,
    duplicates_skipped: AtomicU64,
}

impl SyncProgress {
    /// Orders committed so far.
    #[must_use]
    pub fn orders_synced(&self) -> u64 {
        self.orders_synced.load(Ordering::Relaxed)
    }

    /// Conflicting rows skipped so far.
    #[must_use]
    pub fn duplicates_skipped(&self) -> u64 {
        self.duplicates_skipped.load(Ordering::Relaxed)
    }

    fn record(&self, written: u64, duplicates_skipped: u64) {
        self.orders_synced.fetch_add(written, Ordering::Relaxed);
        self.duplicates_skipped
            .fetch_add(duplicates_skipped, Ordering::Relaxed);
    }
}

/// Runs the sync of one shop.
#[derive(Clone)]
pub struct ShopSyncWorker {
    api: Arc<dyn ShopApi>,
    store: Arc<dyn OrderStore>,
    settings: Arc<SyncSettings>,
}

impl ShopSyncWorker {
    /// Create a worker.
    #[must_use]
    pub fn new(
        api: Arc<dyn ShopApi>,
        store: Arc<dyn OrderStore>,
        settings: Arc<SyncSettings>,
    ) -> Self {
        Self {
            api,
            store,
            settings,
        }
    }

    /// Sync one shop and report how it went.
    ///
    /// Never fails: every outcome, including a malformed credential, becomes
    /// a [`ShopSyncResult`]. Committed counts are also published through
    /// `progress` as each batch lands.
    pub async fn run(
        &self,
        credential: &ShopCredential,
        deadline: Instant,
        progress: &SyncProgress,
    ) -> ShopSyncResult {
        let span = info_span!(
            "shop_sync",
            shop = %credential.shop,
            account_id = %credential.account_id
        );

        async move {
            let shop = credential.shop.as_str();
            let result = match self.sync_shop(credential, deadline, progress).await {
                Ok(()) => ShopSyncResult::succeeded(shop, progress.orders_synced()),
                Err(ShopSyncError::Deadline) => ShopSyncResult::timed_out(
                    shop,
                    ShopSyncError::Deadline.to_string(),
                    progress.orders_synced(),
                ),
                Err(e) => ShopSyncResult::failed(shop, e.to_string(), progress.orders_synced()),
            }
            .with_duplicates_skipped(progress.duplicates_skipped());

            if result.is_success() {
                info!(orders_synced = result.orders_synced, "Shop sync complete");
            } else {
                warn!(
                    outcome = %result.outcome,
                    orders_synced = result.orders_synced,
                    error = result.error_message.as_deref().unwrap_or_default(),
                    "Shop sync stopped"
                );
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn sync_shop(
        &self,
        credential: &ShopCredential,
        deadline: Instant,
        progress: &SyncProgress,
    ) -> Result<(), ShopSyncError> {
        let shop = credential.validated_shop()?;
        let account_id = &credential.account_id;
        let batch_size = self.settings.batch_size;

        let watermark = match self.store.latest_order_timestamp(&shop, account_id).await {
            Ok(watermark) => watermark,
            Err(e) => {
                warn!(error = %e, "Failed to read watermark, pulling all orders");
                DateTime::UNIX_EPOCH
            }
        };
        debug!(%watermark, "Starting shop sync");

        let governor = RateGovernor::new(self.settings.governor);
        let mut fetcher = PageFetcher::new(
            self.api.as_ref(),
            &shop,
            &credential.access_token,
            &governor,
            &self.settings,
        );
        let writer = BatchWriter::new(self.store.as_ref(), self.settings.batch_timeout);

        let mut options = OrderListOptions::first_page(batch_size, watermark);
        let mut batch: Vec<Order> = Vec::with_capacity(batch_size);
        let mut pages: u64 = 0;
        let mut latest_listed: Option<DateTime<Utc>> = None;

        loop {
            let page = fetcher.fetch_page(&options, deadline).await?;
            pages += 1;
            debug!(page = pages, orders = page.orders.len(), "Fetched page");
            latest_listed = ensure_ascending(&page.orders, latest_listed)?;

            for order in page.orders {
                batch.push(order);
                if batch.len() >= batch_size {
                    commit(&writer, &mut batch, &shop, account_id, progress).await?;
                }
            }

            match page.next_cursor {
                Some(cursor) => options = options.next_page(cursor),
                None => break,
            }
        }

        if !batch.is_empty() {
            commit(&writer, &mut batch, &shop, account_id, progress).await?;
        }

        Ok(())
    }
}

/// Check that `orders` continue the run in `updated_at` order.
///
/// The whole page is checked before any of it is batched, so a listing that
/// is newest-first fails on its first page without committing anything.
/// Returns the latest `updated_at` listed so far.
fn ensure_ascending(
    orders: &[Order],
    mut previous: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>, ShopSyncError> {
    for order in orders {
        if let Some(previous) = previous
            && order.updated_at < previous
        {
            return Err(ShopSyncError::OutOfOrder {
                order_id: order.id,
                updated_at: order.updated_at,
                previous,
            });
        }
        previous = Some(order.updated_at);
    }
    Ok(previous)
}

async fn commit(
    writer: &BatchWriter<'_>,
    batch: &mut Vec<Order>,
    shop: &ShopName,
    account_id: &AccountId,
    progress: &SyncProgress,
) -> Result<(), ShopSyncError> {
    let outcome = writer.write(batch, shop, account_id).await?;
    progress.record(outcome.written, outcome.duplicates_skipped);
    batch.clear();
    Ok(())
}
