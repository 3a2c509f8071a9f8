// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Emoji-reaction feedback pipeline for the Corral relay.
//!
//! Classifies reactions into feedback categories, rate-limits per user, and
//! records entries to a capped JSONL log with optional save-to-memory
//! markdown snapshots.

pub mod classify;
pub mod pipeline;
pub mod rate_limit;

pub use classify::classify_reaction;
pub use pipeline::FeedbackPipeline;
pub use rate_limit::RateLimiter;
