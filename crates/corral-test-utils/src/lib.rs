// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Corral integration tests.
//!
//! Mock collaborators and a full-stack harness for fast, deterministic,
//! CI-runnable tests without Telegram or a real agent engine.
//!
//! - [`MockEngine`] - scripted agent engine with request capture
//! - [`MockChannel`] - channel adapter with event injection and capture
//! - [`RelayHarness`] - complete relay stack over a temp SQLite database

pub mod harness;
pub mod mock_channel;
pub mod mock_engine;

pub use harness::RelayHarness;
pub use mock_channel::MockChannel;
pub use mock_engine::MockEngine;
