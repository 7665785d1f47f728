//! Fans an account sync out to one task per shop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use storelink_core::{AccountId, ShopSyncResult, SyncReport};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, instrument};

use crate::config::SyncSettings;
use crate::db::{CredentialStore, OrderStore, ShopCredential};
use crate::shopify::ShopApi;

use super::{ShopSyncWorker, SyncError, SyncProgress};

/// Syncs every shop of an account concurrently.
///
/// Each shop runs in its own task with its own deadline; at most
/// `max_concurrent_shops` run at once. A failing, slow or panicking shop only
/// affects its own entry in the [`SyncReport`].
#[derive(Clone)]
pub struct SyncCoordinator {
    credentials: Arc<dyn CredentialStore>,
    worker: ShopSyncWorker,
    settings: Arc<SyncSettings>,
}

impl SyncCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        api: Arc<dyn ShopApi>,
        store: Arc<dyn OrderStore>,
        settings: SyncSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        Self {
            credentials,
            worker: ShopSyncWorker::new(api, store, Arc::clone(&settings)),
            settings,
        }
    }

    /// Sync every shop connected to `account_id`.
    ///
    /// Each shop's deadline is `shop_timeout` from when it starts, or
    /// `deadline` if that comes first.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Credentials` if the account's credentials cannot
    /// be listed. Per-shop failures are reported inside the [`SyncReport`].
    #[instrument(skip(self, deadline), fields(account_id = %account_id))]
    pub async fn sync_account(
        &self,
        account_id: &AccountId,
        deadline: Option<Instant>,
    ) -> Result<SyncReport, SyncError> {
        let credentials = self
            .credentials
            .list_shop_credentials(account_id)
            .await
            .map_err(SyncError::Credentials)?;

        if credentials.is_empty() {
            info!("No shops connected, nothing to sync");
            return Ok(SyncReport::new());
        }

        let shop_count = credentials.len();
        info!(shops = shop_count, "Starting account sync");

        let (tx, mut rx) = mpsc::channel(shop_count);
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent_shops.max(1)));
        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(shop_count);

        for credential in credentials {
            let shop = credential.shop.clone();
            let tx = tx.clone();
            let permits = Arc::clone(&permits);
            let worker = self.worker.clone();
            let shop_timeout = self.settings.shop_timeout;

            let handle = tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let shop_deadline = shop_deadline(Instant::now(), shop_timeout, deadline);
                let result = supervise(&worker, &credential, shop_deadline).await;
                // Capacity equals the shop count, so this never waits.
                let _ = tx.send(result).await;
            });
            handles.push((shop, handle));
        }
        drop(tx);

        let mut lost = Vec::new();
        for (shop, handle) in handles {
            if let Err(e) = handle.await {
                error!(shop = %shop, error = %e, "Shop sync task failed");
                lost.push((shop, format!("internal fault: {e}")));
            }
        }

        let mut report = SyncReport::new();
        while let Some(result) = rx.recv().await {
            report.insert(result);
        }
        for (shop, message) in lost {
            if report.get(&shop).is_none() {
                report.insert(ShopSyncResult::failed(shop, message, 0));
            }
        }

        info!(
            shops = report.len(),
            succeeded = report.iter().filter(|r| r.is_success()).count(),
            orders_synced = report.total_orders_synced(),
            "Account sync complete"
        );
        Ok(report)
    }
}

/// Roughly 30 years; stands in for a timeout too large to add to an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The earlier of `start + shop_timeout` and the caller's deadline.
///
/// A timeout that overflows `Instant` means the shop has no timeout of its
/// own.
fn shop_deadline(start: Instant, shop_timeout: Duration, deadline: Option<Instant>) -> Instant {
    let own = start
        .checked_add(shop_timeout)
        .unwrap_or_else(|| start + FAR_FUTURE);
    deadline.map_or(own, |deadline| own.min(deadline))
}

/// Run one worker, turning a panic into a failure result for its shop.
async fn supervise(
    worker: &ShopSyncWorker,
    credential: &ShopCredential,
    deadline: Instant,
) -> ShopSyncResult {
    let progress = SyncProgress::default();

    match AssertUnwindSafe(worker.run(credential, deadline, &progress))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(shop = %credential.shop, panic = %message, "Shop sync panicked");
            ShopSyncResult::failed(
                credential.shop.as_str(),
                format!("internal fault: {message}"),
                progress.orders_synced(),
            )
            .with_duplicates_skipped(progress.duplicates_skipped())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use secrecy::SecretString;
    use storelink_core::{ShopName, SyncOutcome};

    use super::super::testing::{RecordingStore, ScriptedApi, page};
    use super::*;
    use crate::db::RepositoryError;

    struct FixedCredentials(Result<Vec<ShopCredential>, String>);

    #[async_trait]
    impl CredentialStore for FixedCredentials {
        async fn list_shop_credentials(
            &self,
            _account_id: &AccountId,
        ) -> Result<Vec<ShopCredential>, RepositoryError> {
            self.0
                .clone()
                .map_err(RepositoryError::DataCorruption)
        }

        async fn save_shop_credential(
            &self,
            _shop: &ShopName,
            _account_id: &AccountId,
            _access_token: &SecretString,
        ) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    fn account() -> AccountId {
        AccountId::parse("acct-1").unwrap()
    }

    fn coordinator(
        credentials: Result<Vec<ShopCredential>, String>,
        api: Arc<ScriptedApi>,
    ) -> SyncCoordinator {
        SyncCoordinator::new(
            Arc::new(FixedCredentials(credentials)),
            api,
            Arc::new(RecordingStore::default()),
            SyncSettings::default(),
        )
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(payload.as_ref()), "kaboom");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shop_deadline_takes_the_earlier_bound() {
        let start = Instant::now();
        let timeout = Duration::from_secs(1800);
        let caller = start + Duration::from_secs(60);

        assert_eq!(shop_deadline(start, timeout, None), start + timeout);
        assert_eq!(shop_deadline(start, timeout, Some(caller)), caller);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shop_deadline_survives_huge_timeout() {
        let start = Instant::now();
        let caller = start + Duration::from_secs(60);

        assert_eq!(shop_deadline(start, Duration::MAX, None), start + FAR_FUTURE);
        assert_eq!(shop_deadline(start, Duration::MAX, Some(caller)), caller);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_shop_timeout_still_syncs() {
        let credentials = vec![ShopCredential::new("shop-a", account(), "tok")];
        let api = Arc::new(ScriptedApi::new(vec![Ok(page(1..=3, None))]));
        let settings = SyncSettings {
            shop_timeout: Duration::from_secs(u64::MAX),
            ..SyncSettings::default()
        };
        let coordinator = SyncCoordinator::new(
            Arc::new(FixedCredentials(Ok(credentials))),
            api,
            Arc::new(RecordingStore::default()),
            settings,
        );

        let report = coordinator.sync_account(&account(), None).await.unwrap();

        assert_eq!(report.get("shop-a").unwrap().outcome, SyncOutcome::Succeeded);
        assert_eq!(report.get("shop-a").unwrap().orders_synced, 3);
    }

    #[tokio::test]
    async fn test_no_shops_yields_empty_report() {
        let report = coordinator(Ok(vec![]), Arc::new(ScriptedApi::default()))
            .sync_account(&account(), None)
            .await
            .unwrap();

        assert!(report.is_empty());
        assert!(report.is_fully_successful());
    }

    #[tokio::test]
    async fn test_credential_listing_failure_fails_outright() {
        let err = coordinator(Err("bad row".to_string()), Arc::new(ScriptedApi::default()))
            .sync_account(&account(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Credentials(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_result_per_shop() {
        let credentials = vec![
            ShopCredential::new("shop-a", account(), "tok"),
            ShopCredential::new("", account(), "tok"),
        ];
        let api = Arc::new(ScriptedApi::new(vec![Ok(page(1..=5, None))]));

        let report = coordinator(Ok(credentials), api)
            .sync_account(&account(), None)
            .await
            .unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(report.get("shop-a").unwrap().orders_synced, 5);
        assert_eq!(report.get("").unwrap().outcome, SyncOutcome::Failed);
        assert!(!report.is_fully_successful());
    }
}
