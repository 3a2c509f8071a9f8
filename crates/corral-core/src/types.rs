// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Corral workspace.
//!
//! Platform-specific event shapes are normalized into these fixed types at
//! the adapter boundary; nothing downstream of an adapter depends on raw
//! platform field names.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

/// Unique identifier for a platform message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Chat platform a message originated from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Telegram,
    Webhook,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// An inbound chat message, normalized at the adapter boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub platform: Platform,
    pub channel_id: String,
    /// Logical thread grouping (reply-chain root or platform thread id).
    pub conversation_id: String,
    pub message_id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// An emoji reaction to a previously sent message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionSignal {
    pub platform: Platform,
    pub channel_id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub user_id: String,
    pub user_name: String,
    pub emoji: String,
    pub timestamp: DateTime<Utc>,
}

/// Events emitted by a channel adapter.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message(InboundMessage),
    Reaction(ReactionSignal),
}

/// An outbound message to be delivered by a channel adapter.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub channel_id: String,
    pub text: String,
    /// Thread to reply into; `None` sends to the channel root.
    pub thread_id: Option<String>,
}

/// Capabilities reported by a channel adapter.
///
/// Layers above the adapter must respect these: platforms without native
/// streaming fall back to edit-in-place or final-only delivery.
#[derive(Debug, Clone)]
pub struct ChannelCapabilities {
    pub supports_streaming: bool,
    pub supports_edit: bool,
    pub supports_threads: bool,
    /// Minimum interval between message updates, in milliseconds.
    pub min_update_interval_ms: u64,
    pub max_message_length: Option<usize>,
}

// --- Persisted entities ---

/// Mapping from a `(platform, channel_id)` pair to the project it controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub platform: Platform,
    pub channel_id: String,
    pub project: String,
    pub bound_by: String,
    pub bound_at: DateTime<Utc>,
}

/// A cached conversation message, used for context assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMessage {
    pub platform: Platform,
    pub channel_id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub is_bot: bool,
    pub timestamp: DateTime<Utc>,
}

/// Processing state of a write-ahead pending message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl PendingStatus {
    /// Terminal rows are garbage-collected by retention.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PendingStatus::Done | PendingStatus::Failed)
    }
}

/// Write-ahead record of an inbound message, persisted before any processing
/// so a crash mid-run can be detected and the message retried or surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMessage {
    pub id: i64,
    pub platform: Platform,
    pub channel_id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
    pub status: PendingStatus,
}

/// Status of a relay-triggered agent run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Complete,
    Failed,
    Cancelled,
}

/// One row per agent invocation triggered via the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRun {
    pub id: String,
    pub platform: Platform,
    pub channel_id: String,
    pub conversation_id: String,
    pub project: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    pub model: Option<String>,
}

/// Feedback category derived from an emoji reaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Positive,
    Negative,
    Acknowledge,
    Save,
}

/// One entry in the append-only feedback log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFeedbackEntry {
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    pub platform: Platform,
    pub conversation_id: String,
    pub message_id: String,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_output_summary: Option<String>,
}

/// A permanently undeliverable notification, logged for manual inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub timestamp: DateTime<Utc>,
    pub chat_id: String,
    pub channel: String,
    pub error: String,
    pub payload: serde_json::Value,
}

// --- Agent engine types ---

/// Permission posture passed through to the agent engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    BypassPermissions,
}

/// A request to execute the agent engine once.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub system_prompt: String,
    pub permission_mode: PermissionMode,
    pub max_turns: u32,
    /// Cooperative cancellation; a cancelled run must still release its
    /// run lock and pool slot.
    pub cancel: CancellationToken,
}

/// The result of one agent engine execution.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub success: bool,
    pub text: String,
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    pub model: Option<String>,
}

/// Decision returned by a tool-use security policy.
#[derive(Debug, Clone)]
pub enum PolicyDecision {
    /// The operation may proceed, optionally with a rewritten input
    /// (e.g. a shell command wrapped in a sandbox prefix).
    Allow {
        rewritten_input: Option<serde_json::Value>,
    },
    /// The operation is denied.
    Deny { reason: String },
}
