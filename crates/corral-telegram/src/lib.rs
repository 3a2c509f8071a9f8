// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram channel adapter for the Corral relay.
//!
//! Implements [`ChannelAdapter`] over the Telegram Bot API via teloxide:
//! long polling for messages and emoji reactions, MarkdownV2 delivery with
//! plain-text fallback, and edit-in-place support.

pub mod handler;
pub mod markdown;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MessageReactionUpdated, ParseMode, Recipient, ThreadId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use corral_config::model::TelegramConfig;
use corral_core::error::CorralError;
use corral_core::traits::{ChannelAdapter, PluginAdapter};
use corral_core::types::{
    ChannelCapabilities, HealthStatus, InboundEvent, MessageId, OutboundMessage,
};

/// Telegram channel adapter.
///
/// Normalizes raw updates into [`InboundEvent`] and leaves authorization
/// and channel policy to the router.
pub struct TelegramChannel {
    bot: Bot,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundEvent>>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    polling_handle: Option<tokio::task::JoinHandle<()>>,
}

impl TelegramChannel {
    /// Requires `config.bot_token` to be set and non-empty.
    pub fn new(config: &TelegramConfig) -> Result<Self, CorralError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            CorralError::Config("telegram.bot_token is required for the Telegram adapter".into())
        })?;
        if token.is_empty() {
            return Err(CorralError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }

        let bot = Bot::new(token);
        let (inbound_tx, inbound_rx) = mpsc::channel(100);

        Ok(Self {
            bot,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            inbound_tx,
            polling_handle: None,
        })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

#[async_trait]
impl PluginAdapter for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, CorralError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), CorralError> {
        debug!("telegram channel shutting down");
        if let Some(handle) = &self.polling_handle {
            handle.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_streaming: false,
            supports_edit: true,
            supports_threads: true,
            min_update_interval_ms: 1000,
            max_message_length: Some(4096),
        }
    }

    async fn connect(&mut self) -> Result<(), CorralError> {
        if self.polling_handle.is_some() {
            return Ok(());
        }

        let bot = self.bot.clone();
        let message_tx = self.inbound_tx.clone();
        let reaction_tx = self.inbound_tx.clone();

        info!("starting Telegram long polling");

        let handle = tokio::spawn(async move {
            let tree = dptree::entry()
                .branch(Update::filter_message().endpoint(move |msg: Message| {
                    let tx = message_tx.clone();
                    async move {
                        if let Some(inbound) = handler::to_inbound(&msg)
                            && tx.send(InboundEvent::Message(inbound)).await.is_err()
                        {
                            warn!("inbound channel closed, dropping message");
                        }
                        respond(())
                    }
                }))
                .branch(Update::filter_message_reaction_updated().endpoint(
                    move |update: MessageReactionUpdated| {
                        let tx = reaction_tx.clone();
                        async move {
                            if let Some(signal) = handler::to_reaction(&update)
                                && tx.send(InboundEvent::Reaction(signal)).await.is_err()
                            {
                                warn!("inbound channel closed, dropping reaction");
                            }
                            respond(())
                        }
                    },
                ));

            Dispatcher::builder(bot, tree)
                .default_handler(|_| async {})
                .build()
                .dispatch()
                .await;
        });

        self.polling_handle = Some(handle);
        Ok(())
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, CorralError> {
        let chat_id = parse_chat_id(&msg.channel_id)?;
        let thread = thread_of(&msg);
        let escaped = markdown::escape_markdown_v2(&msg.text);

        let mut request = self
            .bot
            .send_message(Recipient::Id(chat_id), &escaped)
            .parse_mode(ParseMode::MarkdownV2);
        if let Some(thread) = thread {
            request = request.message_thread_id(thread);
        }

        let sent = match request.await {
            Ok(sent) => sent,
            Err(e) => {
                // Telegram rejects outputs that do not survive escaping
                // cleanly; deliver unformatted rather than not at all.
                warn!(error = %e, "MarkdownV2 send failed, retrying as plain text");
                let mut request = self.bot.send_message(Recipient::Id(chat_id), &msg.text);
                if let Some(thread) = thread {
                    request = request.message_thread_id(thread);
                }
                request.await.map_err(|e| CorralError::Channel {
                    message: format!("failed to send message: {e}"),
                    source: Some(Box::new(e)),
                })?
            }
        };

        Ok(MessageId(sent.id.0.to_string()))
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), CorralError> {
        let chat_id = parse_chat_id(channel_id)?;
        let msg_id = message_id
            .parse::<i32>()
            .map(teloxide::types::MessageId)
            .map_err(|e| CorralError::Channel {
                message: format!("invalid message_id: {e}"),
                source: None,
            })?;

        let escaped = markdown::escape_markdown_v2(text);
        let result = self
            .bot
            .edit_message_text(chat_id, msg_id, &escaped)
            .parse_mode(ParseMode::MarkdownV2)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("message is not modified") {
                    Ok(())
                } else if err_str.contains("can't parse entities") {
                    warn!(error = %e, "MarkdownV2 edit failed, retrying as plain text");
                    self.bot
                        .edit_message_text(chat_id, msg_id, text)
                        .await
                        .map_err(|e| CorralError::Channel {
                            message: format!("failed to edit message: {e}"),
                            source: Some(Box::new(e)),
                        })?;
                    Ok(())
                } else {
                    Err(CorralError::Channel {
                        message: format!("failed to edit message: {e}"),
                        source: Some(Box::new(e)),
                    })
                }
            }
        }
    }

    async fn receive(&self) -> Result<InboundEvent, CorralError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or_else(|| CorralError::Channel {
            message: "Telegram inbound channel closed".into(),
            source: None,
        })
    }
}

fn parse_chat_id(channel_id: &str) -> Result<ChatId, CorralError> {
    channel_id
        .parse::<i64>()
        .map(ChatId)
        .map_err(|e| CorralError::Channel {
            message: format!("invalid chat_id: {e}"),
            source: None,
        })
}

/// Forum topic to post into. Threads equal to the channel itself mean the
/// conversation is the chat root, not a topic.
fn thread_of(msg: &OutboundMessage) -> Option<ThreadId> {
    msg.thread_id
        .as_deref()
        .filter(|thread| *thread != msg.channel_id)
        .and_then(|thread| thread.parse::<i32>().ok())
        .map(|id| ThreadId(teloxide::types::MessageId(id)))
}
