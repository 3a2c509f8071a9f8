// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dead-letter log for permanently undeliverable notifications.

use std::path::PathBuf;

use chrono::Utc;
use tracing::error;

use corral_core::CorralError;
use corral_core::jsonl;
use corral_core::types::DeadLetter;

/// Entries kept before the oldest fall off.
const DEAD_LETTER_CAP: usize = 1000;

/// Capped JSONL dead-letter log.
#[derive(Debug, Clone)]
pub struct DeadLetterLog {
    path: PathBuf,
}

impl DeadLetterLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Record a terminal delivery failure.
    pub fn record(
        &self,
        chat_id: &str,
        channel: &str,
        error_text: &str,
        payload: serde_json::Value,
    ) -> Result<(), CorralError> {
        error!(
            chat_id = %chat_id,
            channel = %channel,
            error = %error_text,
            "notification dead-lettered"
        );
        let entry = DeadLetter {
            timestamp: Utc::now(),
            chat_id: chat_id.to_string(),
            channel: channel.to_string(),
            error: error_text.to_string(),
            payload,
        };
        jsonl::append_capped(&self.path, &entry, DEAD_LETTER_CAP)
    }

    /// All recorded dead letters, oldest first.
    pub fn read_all(&self) -> Result<Vec<DeadLetter>, CorralError> {
        jsonl::read_entries(&self.path)
    }
}
