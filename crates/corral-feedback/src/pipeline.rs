// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feedback recording pipeline.
//!
//! Classified reactions are appended to a capped JSONL log; `save`
//! reactions additionally drop a markdown snapshot into the project's
//! memory directory. Both writes are best-effort side channels: a failure
//! is logged, never propagated to the reaction handler's caller.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info, warn};

use corral_config::model::FeedbackConfig;
use corral_core::CorralError;
use corral_core::jsonl;
use corral_core::types::{ChatFeedbackEntry, FeedbackType, ReactionSignal};

use crate::classify::classify_reaction;
use crate::rate_limit::RateLimiter;

/// Entries kept in the feedback log before the oldest fall off.
const FEEDBACK_LOG_CAP: usize = 1000;

/// Reaction-to-feedback pipeline.
pub struct FeedbackPipeline {
    config: FeedbackConfig,
    limiter: Mutex<RateLimiter>,
}

impl FeedbackPipeline {
    pub fn new(config: FeedbackConfig) -> Self {
        Self {
            config,
            limiter: Mutex::new(RateLimiter::new()),
        }
    }

    /// Process one reaction. Returns the classification (even when the user
    /// is rate-limited; only the recording is suppressed).
    ///
    /// `project_dir` is the resolved project path for `save` snapshots;
    /// `None` silently skips the snapshot.
    pub fn handle_feedback(
        &self,
        signal: &ReactionSignal,
        project: &str,
        project_dir: Option<&Path>,
        agent_output_summary: Option<String>,
    ) -> Result<Option<FeedbackType>, CorralError> {
        let Some(feedback_type) = classify_reaction(&signal.emoji) else {
            debug!(emoji = %signal.emoji, "reaction is not feedback");
            return Ok(None);
        };

        let limited = self
            .limiter
            .lock()
            .map_err(|_| CorralError::Internal("rate limiter poisoned".to_string()))?
            .is_rate_limited(&signal.user_id, self.config.max_reactions_per_hour);
        if limited {
            info!(user = %signal.user_id, "feedback rate-limited, not recorded");
            return Ok(Some(feedback_type));
        }

        let entry = ChatFeedbackEntry {
            feedback_type,
            platform: signal.platform,
            conversation_id: signal.conversation_id.clone(),
            message_id: signal.message_id.clone(),
            user_id: signal.user_id.clone(),
            user_name: signal.user_name.clone(),
            timestamp: signal.timestamp,
            project: project.to_string(),
            agent_output_summary: agent_output_summary.clone(),
        };
        jsonl::append_capped(Path::new(&self.config.log_path), &entry, FEEDBACK_LOG_CAP)?;
        info!(
            feedback = %feedback_type,
            user = %signal.user_name,
            project = %project,
            "feedback recorded"
        );

        if feedback_type == FeedbackType::Save {
            match project_dir {
                Some(dir) => {
                    if let Err(e) = write_memory_snapshot(dir, &entry) {
                        warn!(error = %e, project = %project, "memory snapshot failed");
                    }
                }
                None => debug!(project = %project, "save reaction without resolvable project"),
            }
        }

        Ok(Some(feedback_type))
    }

    /// All recorded feedback entries, oldest first.
    pub fn read_log(&self) -> Result<Vec<ChatFeedbackEntry>, CorralError> {
        jsonl::read_entries(Path::new(&self.config.log_path))
    }
}

fn write_memory_snapshot(project_dir: &Path, entry: &ChatFeedbackEntry) -> Result<(), CorralError> {
    let memory_dir: PathBuf = project_dir.join("memory");
    std::fs::create_dir_all(&memory_dir)
        .map_err(|e| CorralError::Internal(format!("memory dir: {e}")))?;

    let stamp = entry.timestamp.format("%Y%m%d-%H%M%S");
    let path = memory_dir.join(format!("feedback-{stamp}.md"));
    let summary = entry
        .agent_output_summary
        .as_deref()
        .unwrap_or("(no output captured)");
    let body = format!(
        "# Saved by {user} on {date}\n\nProject: {project}\nThread: {conversation}\nMessage: {message}\n\n{summary}\n",
        user = entry.user_name,
        date = Utc::now().format("%Y-%m-%d %H:%M UTC"),
        project = entry.project,
        conversation = entry.conversation_id,
        message = entry.message_id,
    );
    std::fs::write(&path, body).map_err(|e| CorralError::Internal(format!("memory write: {e}")))?;
    debug!(path = %path.display(), "memory snapshot written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::types::Platform;
    use tempfile::tempdir;

    fn signal(emoji: &str, user: &str) -> ReactionSignal {
        ReactionSignal {
            platform: Platform::Telegram,
            channel_id: "chan".to_string(),
            conversation_id: "conv".to_string(),
            message_id: "m1".to_string(),
            user_id: user.to_string(),
            user_name: format!("{user}-name"),
            emoji: emoji.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn pipeline_in(dir: &tempfile::TempDir, max_per_hour: usize) -> FeedbackPipeline {
        FeedbackPipeline::new(FeedbackConfig {
            max_reactions_per_hour: max_per_hour,
            log_path: dir.path().join("feedback.jsonl").to_string_lossy().into_owned(),
        })
    }

    #[test]
    fn feedback_is_classified_and_logged() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_in(&dir, 20);

        let result = pipeline
            .handle_feedback(&signal("+1", "u1"), "demo", None, None)
            .unwrap();
        assert_eq!(result, Some(FeedbackType::Positive));

        let log = pipeline.read_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].feedback_type, FeedbackType::Positive);
        assert_eq!(log[0].project, "demo");
    }

    #[test]
    fn non_feedback_reactions_are_ignored() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_in(&dir, 20);

        let result = pipeline
            .handle_feedback(&signal("shrug", "u1"), "demo", None, None)
            .unwrap();
        assert_eq!(result, None);
        assert!(pipeline.read_log().unwrap().is_empty());
    }

    #[test]
    fn rate_limited_user_still_gets_classification() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_in(&dir, 2);

        for _ in 0..2 {
            pipeline
                .handle_feedback(&signal("+1", "u1"), "demo", None, None)
                .unwrap();
        }
        let result = pipeline
            .handle_feedback(&signal("+1", "u1"), "demo", None, None)
            .unwrap();
        assert_eq!(result, Some(FeedbackType::Positive));
        // But the third reaction was not recorded.
        assert_eq!(pipeline.read_log().unwrap().len(), 2);
    }

    #[test]
    fn save_writes_memory_snapshot() {
        let dir = tempdir().unwrap();
        let project_dir = tempdir().unwrap();
        let pipeline = pipeline_in(&dir, 20);

        pipeline
            .handle_feedback(
                &signal("star", "u1"),
                "demo",
                Some(project_dir.path()),
                Some("the agent said something worth keeping".to_string()),
            )
            .unwrap();

        let memory = project_dir.path().join("memory");
        let snapshots: Vec<_> = std::fs::read_dir(&memory).unwrap().collect();
        assert_eq!(snapshots.len(), 1);
        let content =
            std::fs::read_to_string(snapshots[0].as_ref().unwrap().path()).unwrap();
        assert!(content.contains("worth keeping"));
        assert!(content.contains("demo"));
    }

    #[test]
    fn save_without_project_dir_skips_snapshot() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline_in(&dir, 20);

        let result = pipeline
            .handle_feedback(&signal("star", "u1"), "ghost", None, None)
            .unwrap();
        // Still classified and logged, just no snapshot.
        assert_eq!(result, Some(FeedbackType::Save));
        assert_eq!(pipeline.read_log().unwrap().len(), 1);
    }
}
