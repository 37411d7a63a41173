//! talkbridge-core library.
//!
//! Imports talk signups from CSV exports, pairs talks into sync groups,
//! seeds cross-promotion work items, and keeps an idempotent ledger of every
//! outbound submission so bulk runs never process the same pair twice.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` with `.context(..)` on storage calls; typed
//!   `thiserror` enums where callers must match.
//! - **Logging**: `tracing` macros with structured fields.

pub mod actuate;
pub mod config;
pub mod csv_io;
pub mod db;
pub mod dedup;
pub mod error;
pub mod ledger;
pub mod reconcile;
pub mod signups;
pub mod sync_group;
