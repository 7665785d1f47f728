//! Storelink Core - Shared domain types.
//!
//! This crate provides the types shared by the order synchronization engine
//! and its command-line front end:
//! - `sync` - The multi-shop order synchronization engine
//! - `cli` - Command-line tools for migrations, credentials and sync runs
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. Enable the `postgres` feature to get `sqlx` encode/decode
//! support for the identifier newtypes.
//!
//! # Modules
//!
//! - [`types`] - Validated identifiers, the normalized order record, and
//!   per-shop sync results

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
