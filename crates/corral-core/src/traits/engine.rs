// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent execution engine trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CorralError;
use crate::traits::policy::ToolPolicy;
use crate::types::{AgentOutcome, AgentRequest};

/// The opaque agent execution engine.
///
/// Runs are long (seconds to minutes) and costly; callers route them
/// through the admission-control pool and hold the project's run lock for
/// the duration. The engine consults `policy` on every file and shell
/// operation.
#[async_trait]
pub trait AgentEngine: Send + Sync + 'static {
    /// Executes the agent once and returns its outcome.
    ///
    /// A timed-out or cancelled run returns an unsuccessful outcome rather
    /// than an error where possible, so audit rows are still written.
    async fn run(
        &self,
        request: AgentRequest,
        policy: Arc<dyn ToolPolicy>,
    ) -> Result<AgentOutcome, CorralError>;
}
