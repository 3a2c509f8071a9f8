// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool-use security policy trait.

use crate::types::PolicyDecision;

/// Security policy consulted by the agent engine on every file and shell
/// operation.
///
/// Injected into the engine call rather than hard-wired, so the relay core
/// can be tested with a permissive stub.
pub trait ToolPolicy: Send + Sync + 'static {
    /// Decide whether a tool invocation may proceed, optionally rewriting
    /// its input.
    fn check(&self, tool_name: &str, input: &serde_json::Value) -> PolicyDecision;
}
