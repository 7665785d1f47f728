//! Per-shop sync results and the account-level report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a shop's sync run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Every page was fetched and committed.
    Succeeded,
    /// The run stopped on an error.
    Failed,
    /// The run stopped because its deadline passed.
    TimedOut,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Result of syncing one shop.
///
/// `orders_synced` counts orders committed by this run, including runs that
/// stopped part way through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopSyncResult {
    /// Shop name as listed in the credential store (may be malformed).
    pub shop: String,
    /// How the run ended.
    pub outcome: SyncOutcome,
    /// Diagnostic message for failed or timed out runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Orders inserted or advanced by this run.
    pub orders_synced: u64,
    /// Rows skipped because of a non-identity uniqueness conflict.
    #[serde(default)]
    pub duplicates_skipped: u64,
}

impl ShopSyncResult {
    /// A successful run.
    #[must_use]
    pub fn succeeded(shop: impl Into<String>, orders_synced: u64) -> Self {
        Self {
            shop: shop.into(),
            outcome: SyncOutcome::Succeeded,
            error_message: None,
            orders_synced,
            duplicates_skipped: 0,
        }
    }

    /// A run that stopped on an error.
    #[must_use]
    pub fn failed(shop: impl Into<String>, message: impl Into<String>, orders_synced: u64) -> Self {
        Self {
            shop: shop.into(),
            outcome: SyncOutcome::Failed,
            error_message: Some(message.into()),
            orders_synced,
            duplicates_skipped: 0,
        }
    }

    /// A run that stopped at its deadline.
    #[must_use]
    pub fn timed_out(
        shop: impl Into<String>,
        message: impl Into<String>,
        orders_synced: u64,
    ) -> Self {
        Self {
            shop: shop.into(),
            outcome: SyncOutcome::TimedOut,
            error_message: Some(message.into()),
            orders_synced,
            duplicates_skipped: 0,
        }
    }

    /// Attach the number of skipped duplicate rows.
    #[must_use]
    pub const fn with_duplicates_skipped(mut self, skipped: u64) -> Self {
        self.duplicates_skipped = skipped;
        self
    }

    /// Whether the run completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == SyncOutcome::Succeeded
    }
}

/// Results for every shop of one account, keyed by shop name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncReport {
    results: BTreeMap<String, ShopSyncResult>,
}

impl SyncReport {
    /// An empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a shop result, replacing any earlier result for the same shop.
    pub fn insert(&mut self, result: ShopSyncResult) {
        self.results.insert(result.shop.clone(), result);
    }

    /// Look up a shop's result.
    #[must_use]
    pub fn get(&self, shop: &str) -> Option<&ShopSyncResult> {
        self.results.get(shop)
    }

    /// Number of shops in the report.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the report is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterate over results in shop name order.
    pub fn iter(&self) -> impl Iterator<Item = &ShopSyncResult> {
        self.results.values()
    }

    /// True only if every shop synced successfully. An empty report counts as
    /// successful.
    #[must_use]
    pub fn is_fully_successful(&self) -> bool {
        self.results.values().all(ShopSyncResult::is_success)
    }

    /// Orders synced across all shops.
    #[must_use]
    pub fn total_orders_synced(&self) -> u64 {
        self.results.values().map(|r| r.orders_synced).sum()
    }

    /// Shops whose run did not succeed.
    #[must_use]
    pub fn unsuccessful_shops(&self) -> Vec<&str> {
        self.results
            .values()
            .filter(|r| !r.is_success())
            .map(|r| r.shop.as_str())
            .collect()
    }
}

impl FromIterator<ShopSyncResult> for SyncReport {
    fn from_iter<I: IntoIterator<Item = ShopSyncResult>>(iter: I) -> Self {
        let mut report = Self::new();
        for result in iter {
            report.insert(result);
        }
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_fully_successful() {
        let report = SyncReport::new();
        assert!(report.is_empty());
        assert!(report.is_fully_successful());
        assert_eq!(report.total_orders_synced(), 0);
    }

    #[test]
    fn test_partial_failure() {
        let report: SyncReport = [
            ShopSyncResult::succeeded("shop-b", 12),
            ShopSyncResult::failed("shop-a", "boom", 3),
            ShopSyncResult::timed_out("shop-c", "deadline exceeded", 0),
        ]
        .into_iter()
        .collect();

        assert_eq!(report.len(), 3);
        assert!(!report.is_fully_successful());
        assert_eq!(report.total_orders_synced(), 15);
        assert_eq!(report.unsuccessful_shops(), vec!["shop-a", "shop-c"]);
        assert_eq!(report.get("shop-c").unwrap().outcome, SyncOutcome::TimedOut);
    }

    #[test]
    fn test_report_serializes_as_map() {
        let report: SyncReport = [ShopSyncResult::succeeded("shop-a", 260)]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["shop-a"]["outcome"], "succeeded");
        assert_eq!(json["shop-a"]["orders_synced"], 260);
        assert!(json["shop-a"].get("error_message").is_none());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(SyncOutcome::TimedOut.to_string(), "timed out");
    }
}
