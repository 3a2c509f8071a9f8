// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end relay harness.
//!
//! Assembles a full relay stack over a temp SQLite database: router, mock
//! engine, mock channel, and a registered `demo` project, with `admin`
//! holding Telegram admin rights. `send_as()` drives one message through
//! the complete pipeline and returns the reply.

use std::collections::HashMap;
use std::sync::Arc;

use corral_config::model::{CorralConfig, ProjectEntry};
use corral_core::CorralError;
use corral_core::types::{InboundMessage, OutboundMessage, Platform, ReactionSignal};
use corral_router::Router;
use corral_storage::RelayStore;

use crate::mock_channel::MockChannel;
use crate::mock_engine::MockEngine;

pub struct RelayHarnessBuilder {
    responses: Vec<String>,
    tweaks: Vec<Box<dyn FnOnce(&mut CorralConfig) + Send>>,
}

impl RelayHarnessBuilder {
    fn new() -> Self {
        Self {
            responses: Vec::new(),
            tweaks: Vec::new(),
        }
    }

    /// Queue scripted engine responses, returned in order.
    pub fn with_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Adjust the config before the stack is built.
    pub fn configure(mut self, tweak: impl FnOnce(&mut CorralConfig) + Send + 'static) -> Self {
        self.tweaks.push(Box::new(tweak));
        self
    }

    pub async fn build(self) -> Result<RelayHarness, CorralError> {
        let temp_dir = tempfile::TempDir::new()
            .map_err(|e| CorralError::Internal(format!("temp dir: {e}")))?;
        let project_dir = temp_dir.path().join("demo");
        std::fs::create_dir_all(&project_dir)
            .map_err(|e| CorralError::Internal(format!("project dir: {e}")))?;

        let mut config = CorralConfig::default();
        config.storage.database_path = temp_dir
            .path()
            .join("relay.db")
            .to_string_lossy()
            .into_owned();
        config.lock.lock_dir = temp_dir.path().join("locks").to_string_lossy().into_owned();
        config.notify.dead_letter_path = temp_dir
            .path()
            .join("dead-letter.jsonl")
            .to_string_lossy()
            .into_owned();
        config.feedback.log_path = temp_dir
            .path()
            .join("feedback.jsonl")
            .to_string_lossy()
            .into_owned();
        config
            .relay
            .admins
            .insert("telegram".to_string(), vec!["admin".to_string()]);
        config.projects.insert(
            "demo".to_string(),
            ProjectEntry {
                path: project_dir.to_string_lossy().into_owned(),
                env: HashMap::new(),
            },
        );
        for tweak in self.tweaks {
            tweak(&mut config);
        }

        let store = Arc::new(RelayStore::new(config.storage.clone()));
        store.initialize().await?;

        let engine = Arc::new(if self.responses.is_empty() {
            MockEngine::new()
        } else {
            MockEngine::with_responses(self.responses)
        });
        let router = Router::new(config.clone(), store.clone(), engine.clone())?;

        Ok(RelayHarness {
            router,
            store,
            engine,
            channel: Arc::new(MockChannel::new()),
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete relay environment over mock collaborators and temp storage.
pub struct RelayHarness {
    pub router: Router,
    pub store: Arc<RelayStore>,
    pub engine: Arc<MockEngine>,
    pub channel: Arc<MockChannel>,
    pub config: CorralConfig,
    _temp_dir: tempfile::TempDir,
}

impl RelayHarness {
    pub fn builder() -> RelayHarnessBuilder {
        RelayHarnessBuilder::new()
    }

    /// An inbound Telegram message on the harness channel/thread.
    pub fn message(&self, user: &str, text: &str) -> InboundMessage {
        InboundMessage {
            platform: Platform::Telegram,
            channel_id: "chan-1".to_string(),
            conversation_id: "conv-1".to_string(),
            message_id: uuid::Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            user_name: format!("{user}-name"),
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Route one message and return the reply, if any.
    pub async fn send_as(&self, user: &str, text: &str) -> Option<OutboundMessage> {
        self.router.handle_message(&self.message(user, text)).await
    }

    /// Route one reaction on the harness thread.
    pub async fn react_as(&self, user: &str, emoji: &str) {
        self.router
            .handle_reaction(&ReactionSignal {
                platform: Platform::Telegram,
                channel_id: "chan-1".to_string(),
                conversation_id: "conv-1".to_string(),
                message_id: "m1".to_string(),
                user_id: user.to_string(),
                user_name: format!("{user}-name"),
                emoji: emoji.to_string(),
                timestamp: chrono::Utc::now(),
            })
            .await;
    }

    /// Bind the harness channel to the `demo` project as the admin.
    pub async fn bind_demo(&self) {
        let reply = self.send_as("admin", "/corral bind demo").await;
        debug_assert!(reply.is_some_and(|r| r.text.contains("Bound")));
    }
}
