//! Shop credential repository.
//!
//! Stores the access token of every shop connected to an account. Tokens are
//! issued elsewhere (OAuth install flow); this module only persists and lists
//! them.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use storelink_core::{AccountId, NameError, ShopName};
use thiserror::Error;
use tracing::instrument;

use super::RepositoryError;

// =============================================================================
// Types
// =============================================================================

/// Reasons a stored credential cannot be used.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The stored shop name is not a valid shop name.
    #[error("invalid shop name: {0}")]
    InvalidShop(#[from] NameError),
    /// The stored token is empty.
    #[error("invalid shop token: token is empty")]
    EmptyToken,
}

/// A shop's access credential as stored.
///
/// `shop` is kept as the raw stored string: a malformed entry must still be
/// reportable by name. Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct ShopCredential {
    /// Shop name (e.g., acme.myshopify.com).
    pub shop: String,
    /// Owning account.
    pub account_id: AccountId,
    /// Admin API access token (HIGH PRIVILEGE - redacted in debug output).
    pub access_token: SecretString,
}

impl std::fmt::Debug for ShopCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopCredential")
            .field("shop", &self.shop)
            .field("account_id", &self.account_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl ShopCredential {
    /// Create a credential.
    #[must_use]
    pub fn new(
        shop: impl Into<String>,
        account_id: AccountId,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            shop: shop.into(),
            account_id,
            access_token: SecretString::from(access_token.into()),
        }
    }

    /// Validate the shop name and token.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError` if the entry cannot be synced.
    pub fn validated_shop(&self) -> Result<ShopName, CredentialError> {
        let shop = ShopName::parse(&self.shop)?;
        if self.access_token.expose_secret().trim().is_empty() {
            return Err(CredentialError::EmptyToken);
        }
        Ok(shop)
    }
}

/// Internal row type for `PostgreSQL` queries.
#[derive(Debug, sqlx::FromRow)]
struct ShopTokenRow {
    shop_name: String,
    account_id: AccountId,
    access_token: String,
}

impl From<ShopTokenRow> for ShopCredential {
    fn from(row: ShopTokenRow) -> Self {
        Self {
            shop: row.shop_name,
            account_id: row.account_id,
            access_token: SecretString::from(row.access_token),
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Source of shop credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// List every shop credential of an account.
    async fn list_shop_credentials(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<ShopCredential>, RepositoryError>;

    /// Save or replace the token for a shop.
    async fn save_shop_credential(
        &self,
        shop: &ShopName,
        account_id: &AccountId,
        access_token: &SecretString,
    ) -> Result<(), RepositoryError>;
}

/// `PostgreSQL` credential store.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Create a new credential store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete the token for a shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(
        &self,
        shop: &ShopName,
        account_id: &AccountId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM shop_tokens
            WHERE shop_name = $1 AND account_id = $2
            ",
        )
        .bind(shop)
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn list_shop_credentials(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<ShopCredential>, RepositoryError> {
        let rows = sqlx::query_as::<_, ShopTokenRow>(
            r"
            SELECT shop_name, account_id, access_token
            FROM shop_tokens
            WHERE account_id = $1
            ORDER BY shop_name
            ",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ShopCredential::from).collect())
    }

    #[instrument(skip(self, access_token), fields(shop = %shop, account_id = %account_id))]
    async fn save_shop_credential(
        &self,
        shop: &ShopName,
        account_id: &AccountId,
        access_token: &SecretString,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO shop_tokens (shop_name, account_id, access_token)
            VALUES ($1, $2, $3)
            ON CONFLICT (shop_name, account_id) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                updated_at = NOW()
            ",
        )
        .bind(shop)
        .bind(account_id)
        .bind(access_token.expose_secret())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn account() -> AccountId {
        AccountId::parse("acct-1").unwrap()
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = ShopCredential::new("shop-a", account(), "shpat_super_secret");
        let debug_output = format!("{credential:?}");

        assert!(debug_output.contains("shop-a"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("shpat_super_secret"));
    }

    #[test]
    fn test_validated_shop_accepts_well_formed_entry() {
        let credential = ShopCredential::new("shop-a", account(), "shpat_token");
        assert_eq!(credential.validated_shop().unwrap().as_str(), "shop-a");
    }

    #[test]
    fn test_validated_shop_rejects_empty_shop() {
        let credential = ShopCredential::new("", account(), "shpat_token");
        let err = credential.validated_shop().unwrap_err();
        assert_eq!(err, CredentialError::InvalidShop(NameError::Empty));
        assert_eq!(err.to_string(), "invalid shop name: identifier cannot be empty");
    }

    #[test]
    fn test_validated_shop_rejects_empty_token() {
        let credential = ShopCredential::new("shop-a", account(), "  ");
        assert_eq!(
            credential.validated_shop().unwrap_err(),
            CredentialError::EmptyToken
        );
    }
}
