//! Paced, retrying page fetches for one shop.

use std::time::Duration;

use secrecy::SecretString;
use storelink_core::{Order, ShopName};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::SyncSettings;
use crate::shopify::{OrderListOptions, ShopApi, ShopApiError};

use super::{RateGovernor, ShopSyncError};

/// Throttling retry state of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    backoff: Duration,
}

impl RetryState {
    /// Fresh state with no retries spent.
    #[must_use]
    pub const fn new(initial_backoff: Duration) -> Self {
        Self {
            attempts: 0,
            backoff: initial_backoff,
        }
    }

    /// Retries spent on the current page.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next retry.
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        self.backoff
    }
}

/// A page of normalized orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Orders in API order.
    pub orders: Vec<Order>,
    /// Cursor of the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Fetches pages for one shop through its [`RateGovernor`].
pub struct PageFetcher<'a> {
    api: &'a dyn ShopApi,
    shop: &'a ShopName,
    access_token: &'a SecretString,
    governor: &'a RateGovernor,
    settings: &'a SyncSettings,
    retry: RetryState,
}

impl<'a> PageFetcher<'a> {
    /// Create a fetcher for one shop.
    #[must_use]
    pub fn new(
        api: &'a dyn ShopApi,
        shop: &'a ShopName,
        access_token: &'a SecretString,
        governor: &'a RateGovernor,
        settings: &'a SyncSettings,
    ) -> Self {
        Self {
            api,
            shop,
            access_token,
            governor,
            settings,
            retry: RetryState::new(settings.initial_backoff),
        }
    }

    /// Retries spent since the last successful fetch.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retry.attempts
    }

    /// Fetch one page, retrying while the shop throttles.
    ///
    /// The deadline is checked before every attempt, including retries.
    ///
    /// # Errors
    ///
    /// - `ShopSyncError::Deadline` if `deadline` passes before an attempt
    /// - `ShopSyncError::Fetch` for non-throttling errors, for throttling once
    ///   `max_retries` is spent, and for orders that cannot be normalized
    pub async fn fetch_page(
        &mut self,
        options: &OrderListOptions,
        deadline: Instant,
    ) -> Result<FetchedPage, ShopSyncError> {
        loop {
            if Instant::now() >= deadline {
                return Err(ShopSyncError::Deadline);
            }

            self.governor.wait().await;

            match self
                .api
                .list_orders_page(self.shop, self.access_token, options)
                .await
            {
                Ok(page) => {
                    self.governor.adjust(false).await;
                    self.retry = RetryState::new(self.settings.initial_backoff);

                    let orders = page
                        .orders
                        .into_iter()
                        .map(Order::try_from)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|e| ShopSyncError::Fetch {
                            retries: 0,
                            source: ShopApiError::Conversion(e),
                        })?;

                    return Ok(FetchedPage {
                        orders,
                        next_cursor: page.next_cursor,
                    });
                }
                Err(e) if e.is_throttled() && self.retry.attempts < self.settings.max_retries => {
                    self.retry.attempts += 1;
                    warn!(
                        attempt = self.retry.attempts,
                        backoff_ms = self.retry.backoff.as_millis(),
                        error = %e,
                        "Throttled, backing off"
                    );

                    self.governor.adjust(true).await;
                    tokio::time::sleep(self.retry.backoff).await;
                    self.retry.backoff =
                        (self.retry.backoff * 2).min(self.settings.governor.max_interval);
                }
                Err(e) => {
                    debug!(retries = self.retry.attempts, error = %e, "Page fetch failed");
                    return Err(ShopSyncError::Fetch {
                        retries: self.retry.attempts,
                        source: e,
                    });
                }
            }
        }
    }
}
