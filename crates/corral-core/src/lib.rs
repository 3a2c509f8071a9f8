// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Corral relay.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types used throughout the Corral workspace. The agent engine, the
//! tool-use policy, and the chat platform adapters all implement traits
//! defined here.

pub mod error;
pub mod jsonl;
pub mod traits;
pub mod types;

pub use error::CorralError;
pub use traits::{AgentEngine, ChannelAdapter, PluginAdapter, ToolPolicy};
pub use types::{HealthStatus, MessageId, Platform};
