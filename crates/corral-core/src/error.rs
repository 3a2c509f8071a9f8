// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Corral relay.

use thiserror::Error;

/// The primary error type used across all Corral crates.
#[derive(Debug, Error)]
pub enum CorralError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel adapter errors (connection failure, message format, rate limiting).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Agent engine errors (spawn failure, protocol error, abnormal exit).
    #[error("engine error: {message}")]
    Engine {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Notification delivery errors (transport failure, bad destination).
    #[error("notification error: {message}")]
    Notify {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The per-project queue is at its configured depth limit.
    #[error("queue full for project {project}: depth {depth} at limit")]
    QueueFull { project: String, depth: usize },

    /// Process resident memory exceeds the configured ceiling; work is rejected
    /// before any queue is touched.
    #[error("memory pressure: rss {rss_mb} MiB exceeds limit {limit_mb} MiB")]
    MemoryPressure { rss_mb: u64, limit_mb: u64 },

    /// The named project is not present in the registry.
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// Security policy rejected an operation (unsafe URL, blocked path).
    #[error("security policy violation: {0}")]
    Security(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The component is shutting down and no longer accepts work.
    #[error("shutting down")]
    ShuttingDown,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CorralError {
    /// Wrap an arbitrary error as a storage error.
    pub fn storage<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
        CorralError::Storage {
            source: Box::new(e),
        }
    }
}
