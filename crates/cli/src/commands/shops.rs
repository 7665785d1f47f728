//! Shop token management commands.
//!
//! # Usage
//!
//! ```bash
//! storelink shops add --account acct-1 --shop acme --token shpat_xxx
//! storelink shops list --account acct-1
//! storelink shops remove --account acct-1 --shop acme
//! ```

use secrecy::{ExposeSecret, SecretString};
use storelink_core::{AccountId, NameError, ShopName};
use storelink_sync::SyncConfig;
use storelink_sync::db::{CredentialStore, PgCredentialStore, RepositoryError};
use thiserror::Error;

/// Errors that can occur during shop operations.
#[derive(Debug, Error)]
pub enum ShopsError {
    /// Invalid account identifier.
    #[error("Invalid account: {0}")]
    InvalidAccount(NameError),

    /// Invalid shop name.
    #[error("Invalid shop: {0}")]
    InvalidShop(NameError),

    /// Empty access token.
    #[error("Access token cannot be empty")]
    EmptyToken,

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Query failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

fn parse_ids(account: &str, shop: &str) -> Result<(AccountId, ShopName), ShopsError> {
    let account = AccountId::parse(account).map_err(ShopsError::InvalidAccount)?;
    let shop = ShopName::parse(shop).map_err(ShopsError::InvalidShop)?;
    Ok((account, shop))
}

/// Save or replace a shop's access token.
pub async fn add(
    config: &SyncConfig,
    account: &str,
    shop: &str,
    token: String,
) -> Result<(), ShopsError> {
    let (account, shop) = parse_ids(account, shop)?;
    let token = SecretString::from(token);
    if token.expose_secret().trim().is_empty() {
        return Err(ShopsError::EmptyToken);
    }

    let pool = super::connect(config).await?;
    PgCredentialStore::new(pool)
        .save_shop_credential(&shop, &account, &token)
        .await?;

    tracing::info!(shop = %shop, account_id = %account, "Saved shop token");
    Ok(())
}

/// Print the shops connected to an account, one per line.
pub async fn list(config: &SyncConfig, account: &str) -> Result<(), ShopsError> {
    let account = AccountId::parse(account).map_err(ShopsError::InvalidAccount)?;

    let pool = super::connect(config).await?;
    let credentials = PgCredentialStore::new(pool)
        .list_shop_credentials(&account)
        .await?;

    #[allow(clippy::print_stdout)]
    {
        for credential in &credentials {
            println!("{}", credential.shop);
        }
    }
    Ok(())
}

/// Remove a shop's access token.
pub async fn remove(config: &SyncConfig, account: &str, shop: &str) -> Result<(), ShopsError> {
    let (account, shop) = parse_ids(account, shop)?;

    let pool = super::connect(config).await?;
    let removed = PgCredentialStore::new(pool).delete(&shop, &account).await?;

    if removed {
        tracing::info!(shop = %shop, account_id = %account, "Removed shop token");
    } else {
        tracing::warn!(shop = %shop, account_id = %account, "No token stored for shop");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids_rejects_bad_shop() {
        let err = parse_ids("acct-1", "acme shop").unwrap_err();
        assert!(matches!(err, ShopsError::InvalidShop(NameError::InvalidCharacter(' '))));
    }

    #[test]
    fn test_parse_ids_rejects_empty_account() {
        let err = parse_ids("", "acme").unwrap_err();
        assert!(matches!(err, ShopsError::InvalidAccount(NameError::Empty)));
    }
}
