// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Corral relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level Corral configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CorralConfig {
    /// Relay service settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Admission-control pool settings.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Run-lock settings.
    #[serde(default)]
    pub lock: LockConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Context assembler settings.
    #[serde(default)]
    pub context: ContextConfig,

    /// Time-tiered retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Notification pipeline settings.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Feedback pipeline settings.
    #[serde(default)]
    pub feedback: FeedbackConfig,

    /// Agent engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Telegram platform settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Project registry: name -> project entry.
    #[serde(default)]
    pub projects: HashMap<String, ProjectEntry>,

    /// Cron-style schedules evaluated by the serve loop.
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
}

/// Relay service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Master switch; a disabled relay handles no inbound traffic and sends
    /// no notifications.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-platform admin user ids; bind/unbind/projects require membership.
    #[serde(default)]
    pub admins: HashMap<String, Vec<String>>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            admins: HashMap::new(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Admission-control pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Maximum simultaneously active agent executions across all projects.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Maximum `pending + active` depth per project queue.
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,

    /// Process RSS ceiling in MiB; enqueues are rejected above it.
    #[serde(default = "default_max_rss_mb")]
    pub max_rss_mb: u64,

    /// Minutes an empty project queue survives before eviction.
    #[serde(default = "default_idle_evict_minutes")]
    pub idle_evict_minutes: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_queue_depth: default_max_queue_depth(),
            max_rss_mb: default_max_rss_mb(),
            idle_evict_minutes: default_idle_evict_minutes(),
        }
    }
}

fn default_max_concurrent() -> usize {
    2
}

fn default_max_queue_depth() -> usize {
    5
}

fn default_max_rss_mb() -> u64 {
    4096
}

fn default_idle_evict_minutes() -> u64 {
    30
}

/// Run-lock configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Directory holding per-project lock marker files.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: String,

    /// Seconds after which a held lock is considered stale and may be broken.
    #[serde(default = "default_lock_stale_secs")]
    pub stale_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
            stale_secs: default_lock_stale_secs(),
        }
    }
}

fn default_lock_dir() -> String {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .map(|p| p.join("corral/locks"))
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "/tmp/corral/locks".to_string())
}

fn default_lock_stale_secs() -> u64 {
    300
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("corral").join("corral.db"))
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "corral.db".to_string())
}

/// Context assembler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Token budget for assembled conversation history.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Maximum cached messages considered per thread before budgeting.
    #[serde(default = "default_max_messages_per_thread")]
    pub max_messages_per_thread: usize,

    /// Maximum characters per historical message before truncation.
    #[serde(default = "default_max_chars_per_message")]
    pub max_chars_per_message: usize,

    /// Days without activity after which a thread's history is excluded.
    #[serde(default = "default_stale_thread_days")]
    pub stale_thread_days: i64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            max_messages_per_thread: default_max_messages_per_thread(),
            max_chars_per_message: default_max_chars_per_message(),
            stale_thread_days: default_stale_thread_days(),
        }
    }
}

fn default_token_budget() -> usize {
    8_000
}

fn default_max_messages_per_thread() -> usize {
    50
}

fn default_max_chars_per_message() -> usize {
    2_000
}

fn default_stale_thread_days() -> i64 {
    7
}

/// Time-tiered retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Hours before terminal pending-message rows are garbage-collected.
    #[serde(default = "default_hot_hours")]
    pub hot_hours: i64,

    /// Days after which conversation history is thinned per thread.
    #[serde(default = "default_cold_days")]
    pub cold_days: i64,

    /// Days after which messages and run records are deleted outright.
    #[serde(default = "default_expired_days")]
    pub expired_days: i64,

    /// Minutes between cleanup passes in the serve loop.
    #[serde(default = "default_cleanup_interval_minutes")]
    pub interval_minutes: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            hot_hours: default_hot_hours(),
            cold_days: default_cold_days(),
            expired_days: default_expired_days(),
            interval_minutes: default_cleanup_interval_minutes(),
        }
    }
}

fn default_hot_hours() -> i64 {
    24
}

fn default_cold_days() -> i64 {
    7
}

fn default_expired_days() -> i64 {
    30
}

fn default_cleanup_interval_minutes() -> u64 {
    60
}

/// Notification pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Notify on successful run completion.
    #[serde(default = "default_true")]
    pub on_complete: bool,

    /// Notify on run failure.
    #[serde(default = "default_true")]
    pub on_failure: bool,

    /// Maximum delivery attempts per destination.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Base backoff in milliseconds; doubled per attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Per-request timeout in seconds for outbound HTTP.
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,

    /// Path to the dead-letter JSONL log.
    #[serde(default = "default_dead_letter_path")]
    pub dead_letter_path: String,

    /// Outbound webhook destinations, optionally scoped to one project.
    #[serde(default)]
    pub webhooks: Vec<WebhookDestination>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            on_complete: true,
            on_failure: true,
            retry_limit: default_retry_limit(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_secs: default_notify_timeout_secs(),
            dead_letter_path: default_dead_letter_path(),
            webhooks: Vec::new(),
        }
    }
}

fn default_retry_limit() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_notify_timeout_secs() -> u64 {
    30
}

fn default_dead_letter_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("corral").join("dead_letters.jsonl"))
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "dead_letters.jsonl".to_string())
}

/// One outbound webhook notification destination.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookDestination {
    /// Destination URL; must be https and must not target private ranges.
    pub url: String,

    /// Restrict this destination to a single project's runs.
    #[serde(default)]
    pub project: Option<String>,
}

/// Feedback pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeedbackConfig {
    /// Maximum recorded reactions per user per sliding hour.
    #[serde(default = "default_max_reactions_per_hour")]
    pub max_reactions_per_hour: usize,

    /// Path to the feedback JSONL log.
    #[serde(default = "default_feedback_log_path")]
    pub log_path: String,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            max_reactions_per_hour: default_max_reactions_per_hour(),
            log_path: default_feedback_log_path(),
        }
    }
}

fn default_max_reactions_per_hour() -> usize {
    20
}

fn default_feedback_log_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("corral").join("feedback.jsonl"))
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "feedback.jsonl".to_string())
}

/// Agent engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Agent command invoked per execution; the first element is the
    /// program, the rest are fixed arguments.
    #[serde(default = "default_engine_command")]
    pub command: Vec<String>,

    /// Hard ceiling on one agent execution, in seconds.
    #[serde(default = "default_engine_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum agent turns per execution.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Wrap shell commands in a network-isolated sandbox prefix.
    #[serde(default)]
    pub network_isolation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            timeout_secs: default_engine_timeout_secs(),
            max_turns: default_max_turns(),
            network_isolation: false,
        }
    }
}

fn default_engine_command() -> Vec<String> {
    vec!["corral-agent".to_string()]
}

fn default_engine_timeout_secs() -> u64 {
    900
}

fn default_max_turns() -> u32 {
    50
}

/// Telegram platform configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token. `None` disables the Telegram adapter.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Platform-wide default channel policy.
    #[serde(default)]
    pub defaults: ChannelPolicy,

    /// Per-channel policy overrides, keyed by channel id.
    #[serde(default)]
    pub channels: HashMap<String, ChannelPolicy>,
}

impl TelegramConfig {
    /// Resolve the effective policy for a channel, falling back to the
    /// platform-wide defaults.
    pub fn policy_for(&self, channel_id: &str) -> &ChannelPolicy {
        self.channels.get(channel_id).unwrap_or(&self.defaults)
    }
}

/// Authorization and capability policy for one channel.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelPolicy {
    /// Allowlist of user ids; empty allows everyone.
    #[serde(default)]
    pub allowed_users: Vec<String>,

    /// Permit `run` commands on this channel.
    #[serde(default = "default_true")]
    pub allow_run: bool,

    /// Permit free-form chat on this channel.
    #[serde(default = "default_true")]
    pub allow_chat: bool,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            allowed_users: Vec::new(),
            allow_run: true,
            allow_chat: true,
        }
    }
}

/// One registered project.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectEntry {
    /// Filesystem path to the project's working tree.
    pub path: String,

    /// Extra environment for agent runs in this project.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// One cron-style schedule evaluated by the serve loop.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleEntry {
    /// Target project name.
    pub project: String,

    /// Workflow name passed to the agent engine.
    pub workflow: String,

    /// Cron expression (five-field, local time).
    pub cron: String,
}
