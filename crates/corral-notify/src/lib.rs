// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run-completion notification pipeline for the Corral relay.
//!
//! Fans out completed-run events to configured webhook destinations with
//! exponential-backoff retry and a capped dead-letter log. URL safety is
//! validated before any network attempt.

pub mod dead_letter;
pub mod notify;

pub use dead_letter::DeadLetterLog;
pub use notify::Notifier;
