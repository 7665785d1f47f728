//! Storelink Sync - Multi-shop order synchronization engine.
//!
//! Pulls orders from every Shopify shop connected to an account and persists
//! them in `PostgreSQL`.
//!
//! # Architecture
//!
//! - [`sync::SyncCoordinator`] fans out one task per shop and aggregates a
//!   [`storelink_core::SyncReport`]
//! - [`sync::ShopSyncWorker`] walks all pages since the shop's watermark,
//!   pacing requests with a [`sync::RateGovernor`] and committing through a
//!   [`sync::BatchWriter`]
//! - [`shopify::ShopifyRestClient`] talks to the Shopify Admin REST API
//! - [`db`] holds the `PostgreSQL` credential and order repositories
//!
//! Every collaborator sits behind a trait ([`db::CredentialStore`],
//! [`db::OrderStore`], [`shopify::ShopApi`]) so the engine can be driven by
//! in-memory implementations in tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod shopify;
pub mod sync;

pub use config::{ConfigError, GovernorSettings, SyncConfig, SyncSettings};
pub use sync::{SyncCoordinator, SyncError};
