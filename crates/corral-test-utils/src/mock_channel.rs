// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! Implements `ChannelAdapter` with injectable inbound events and captured
//! outbound messages for assertion in tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use corral_core::CorralError;
use corral_core::traits::{ChannelAdapter, PluginAdapter};
use corral_core::types::{
    ChannelCapabilities, HealthStatus, InboundEvent, MessageId, OutboundMessage,
};

/// A captured `edit_message` call.
#[derive(Debug, Clone)]
pub struct EditedMessage {
    pub channel_id: String,
    pub message_id: String,
    pub text: String,
}

/// Mock messaging channel with two queues: events injected via
/// [`MockChannel::inject`] come back from `receive()`, and everything passed
/// to `send()` or `edit_message()` is captured for assertions.
pub struct MockChannel {
    inbound: Arc<Mutex<VecDeque<InboundEvent>>>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    edited: Arc<Mutex<Vec<EditedMessage>>>,
    notify: Arc<Notify>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            edited: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Queue an inbound event for the next `receive()` call.
    pub async fn inject(&self, event: InboundEvent) {
        self.inbound.lock().await.push_back(event);
        self.notify.notify_one();
    }

    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn edited_messages(&self) -> Vec<EditedMessage> {
        self.edited.lock().await.clone()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, CorralError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CorralError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_streaming: false,
            supports_edit: true,
            supports_threads: true,
            min_update_interval_ms: 0,
            max_message_length: None,
        }
    }

    async fn connect(&mut self) -> Result<(), CorralError> {
        Ok(())
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, CorralError> {
        let id = format!("mock-msg-{}", uuid::Uuid::new_v4());
        self.sent.lock().await.push(msg);
        Ok(MessageId(id))
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), CorralError> {
        self.edited.lock().await.push(EditedMessage {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn receive(&self) -> Result<InboundEvent, CorralError> {
        loop {
            {
                let mut queue = self.inbound.lock().await;
                if let Some(event) = queue.pop_front() {
                    return Ok(event);
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::types::{InboundMessage, Platform};

    fn make_inbound(text: &str) -> InboundEvent {
        InboundEvent::Message(InboundMessage {
            platform: Platform::Webhook,
            channel_id: "mock".to_string(),
            conversation_id: "mock".to_string(),
            message_id: uuid::Uuid::new_v4().to_string(),
            user_id: "test-user".to_string(),
            user_name: "tester".to_string(),
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
        })
    }

    #[tokio::test]
    async fn receive_returns_injected_events() {
        let channel = MockChannel::new();
        channel.inject(make_inbound("hello")).await;

        match channel.receive().await.unwrap() {
            InboundEvent::Message(msg) => assert_eq!(msg.text, "hello"),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_captures_outbound_messages() {
        let channel = MockChannel::new();
        let msg = OutboundMessage {
            channel_id: "mock".to_string(),
            text: "response text".to_string(),
            thread_id: None,
        };

        let id = channel.send(msg).await.unwrap();
        assert!(id.0.starts_with("mock-msg-"));

        let sent = channel.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "response text");
    }

    #[tokio::test]
    async fn events_come_back_in_order() {
        let channel = MockChannel::new();
        channel.inject(make_inbound("first")).await;
        channel.inject(make_inbound("second")).await;

        let texts: Vec<String> = [channel.receive().await, channel.receive().await]
            .into_iter()
            .map(|e| match e.unwrap() {
                InboundEvent::Message(m) => m.text,
                other => panic!("expected message, got {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn receive_waits_for_injection() {
        let channel = Arc::new(MockChannel::new());
        let injector = channel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            injector.inject(make_inbound("delayed")).await;
        });

        let event = tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            channel.receive(),
        )
        .await
        .expect("receive timed out")
        .unwrap();
        match event {
            InboundEvent::Message(msg) => assert_eq!(msg.text, "delayed"),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn edits_are_captured() {
        let channel = MockChannel::new();
        channel.edit_message("c1", "m1", "updated").await.unwrap();

        let edits = channel.edited_messages().await;
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].text, "updated");
    }
}
