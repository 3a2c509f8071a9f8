// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for messaging platform integrations.

use async_trait::async_trait;

use crate::error::CorralError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelCapabilities, InboundEvent, MessageId, OutboundMessage};

/// Adapter for bidirectional messaging channel integrations.
///
/// Adapters normalize raw platform events into [`InboundEvent`] at this
/// boundary; nothing downstream depends on platform-specific shapes.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Returns the capabilities supported by this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Establishes a connection to the messaging platform.
    async fn connect(&mut self) -> Result<(), CorralError>;

    /// Sends a message, preserving thread affinity via `msg.thread_id`.
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, CorralError>;

    /// Edits a previously sent message in place.
    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), CorralError>;

    /// Receives the next inbound event from the channel.
    async fn receive(&self) -> Result<InboundEvent, CorralError>;
}
