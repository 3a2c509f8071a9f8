// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message routing for the Corral relay.
//!
//! Classifies inbound chat into commands and free-form conversation,
//! enforces channel authorization, and drives agent executions through the
//! admission-control pool under the project run lock.

pub mod command;
pub mod router;

pub use command::{Command, parse_command};
pub use router::Router;
