// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation-context assembly for the Corral relay.
//!
//! Turns cached thread history into a budgeted, delimiter-safe prompt:
//! staleness detection, message normalization with `<user_message>`
//! delimiters, char-ratio token budgeting with oldest-first eviction, and a
//! fixed prompt template.

pub mod assemble;
pub mod budget;
pub mod normalize;

pub use assemble::{AssembledContext, INJECTION_DEFENSE, assemble_context};
pub use budget::estimate_tokens;
