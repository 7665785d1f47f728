//! Core types for Storelink.
//!
//! This module provides type-safe wrappers for the order sync domain.

pub mod id;
pub mod order;
pub mod report;

pub use id::{AccountId, NameError, ShopName};
pub use order::{Customer, Order};
pub use report::{ShopSyncResult, SyncOutcome, SyncReport};
