// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Corral relay.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed CRUD operations for
//! channel bindings, the conversation message cache, the pending write-ahead
//! log, and relay run accounting.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod store;

pub use database::Database;
pub use models::*;
pub use queries::cleanup::CleanupCounts;
pub use queries::runs::{CostSummary, RunUpdate};
pub use store::RelayStore;
