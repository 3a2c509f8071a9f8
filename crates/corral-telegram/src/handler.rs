// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalization of raw Telegram updates into relay events.
//!
//! The adapter stays permissive: authorization and channel policy are the
//! router's job. Only shape normalization happens here. Text messages and
//! emoji reactions are forwarded; every other update kind is dropped.

use teloxide::types::{Message, MessageReactionUpdated, ReactionType};

use corral_core::types::{InboundMessage, Platform, ReactionSignal};

/// Convert a Telegram message into a normalized [`InboundMessage`].
///
/// Returns `None` for non-text messages and for messages sent by bots
/// (including this one), so relayed replies never loop back in.
pub fn to_inbound(msg: &Message) -> Option<InboundMessage> {
    let text = msg.text()?;
    let from = msg.from.as_ref()?;
    if from.is_bot {
        return None;
    }

    let channel_id = msg.chat.id.0.to_string();
    let conversation_id = conversation_id_of(msg);

    Some(InboundMessage {
        platform: Platform::Telegram,
        channel_id,
        conversation_id,
        message_id: msg.id.0.to_string(),
        user_id: from.id.0.to_string(),
        user_name: from
            .username
            .clone()
            .unwrap_or_else(|| from.first_name.clone()),
        text: text.to_string(),
        timestamp: msg.date,
    })
}

/// Convert a reaction update into a [`ReactionSignal`].
///
/// Returns `None` for anonymous reactions and for reaction kinds that carry
/// no plain emoji (custom emoji packs, paid reactions).
pub fn to_reaction(update: &MessageReactionUpdated) -> Option<ReactionSignal> {
    let user = update.user()?;
    let emoji = update.new_reaction.iter().find_map(|r| match r {
        ReactionType::Emoji { emoji } => Some(emoji.clone()),
        _ => None,
    })?;

    let channel_id = update.chat.id.0.to_string();
    Some(ReactionSignal {
        platform: Platform::Telegram,
        conversation_id: channel_id.clone(),
        channel_id,
        message_id: update.message_id.0.to_string(),
        user_id: user.id.0.to_string(),
        user_name: user
            .username
            .clone()
            .unwrap_or_else(|| user.first_name.clone()),
        emoji,
        timestamp: update.date,
    })
}

/// Thread grouping: forum topic id when present, otherwise the chat itself.
fn conversation_id_of(msg: &Message) -> String {
    match msg.thread_id {
        Some(thread) => thread.0.0.to_string(),
        None => msg.chat.id.0.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_message(user_id: u64, username: Option<&str>, text: &str, is_bot: bool) -> Message {
        let mut from = serde_json::json!({
            "id": user_id,
            "is_bot": is_bot,
            "first_name": "Test",
        });
        if let Some(uname) = username {
            from["username"] = serde_json::json!(uname);
        }

        let json = serde_json::json!({
            "message_id": 1,
            "date": 1700000000i64,
            "chat": {
                "id": user_id as i64,
                "type": "private",
                "first_name": "Test",
            },
            "from": from,
            "text": text,
        });
        serde_json::from_value(json).expect("mock message")
    }

    fn make_thread_message(text: &str) -> Message {
        let json = serde_json::json!({
            "message_id": 9,
            "date": 1700000000i64,
            "message_thread_id": 77,
            "is_topic_message": true,
            "chat": {
                "id": -100123i64,
                "type": "supergroup",
                "title": "Forum",
                "is_forum": true,
            },
            "from": {
                "id": 5,
                "is_bot": false,
                "first_name": "Test",
            },
            "text": text,
        });
        serde_json::from_value(json).expect("mock thread message")
    }

    fn make_reaction(emoji_entries: serde_json::Value, with_user: bool) -> MessageReactionUpdated {
        let mut json = serde_json::json!({
            "chat": {
                "id": 42,
                "type": "private",
                "first_name": "Test",
            },
            "message_id": 7,
            "date": 1700000000i64,
            "old_reaction": [],
            "new_reaction": emoji_entries,
        });
        if with_user {
            json["user"] = serde_json::json!({
                "id": 5,
                "is_bot": false,
                "first_name": "Alice",
                "username": "alice",
            });
        } else {
            // Anonymous reactions arrive with `actor_chat` instead of `user`.
            json["actor_chat"] = serde_json::json!({
                "id": -100999i64,
                "type": "channel",
                "title": "Anon",
            });
        }
        serde_json::from_value(json).expect("mock reaction")
    }

    #[test]
    fn text_message_is_normalized() {
        let msg = make_message(12345, Some("testuser"), "hello", false);
        let inbound = to_inbound(&msg).unwrap();

        assert_eq!(inbound.platform, Platform::Telegram);
        assert_eq!(inbound.channel_id, "12345");
        assert_eq!(inbound.conversation_id, "12345");
        assert_eq!(inbound.message_id, "1");
        assert_eq!(inbound.user_id, "12345");
        assert_eq!(inbound.user_name, "testuser");
        assert_eq!(inbound.text, "hello");
    }

    #[test]
    fn missing_username_falls_back_to_first_name() {
        let msg = make_message(12345, None, "hello", false);
        assert_eq!(to_inbound(&msg).unwrap().user_name, "Test");
    }

    #[test]
    fn bot_messages_are_dropped() {
        let msg = make_message(12345, Some("somebot"), "hello", true);
        assert!(to_inbound(&msg).is_none());
    }

    #[test]
    fn forum_topic_becomes_conversation_id() {
        let msg = make_thread_message("topic chatter");
        let inbound = to_inbound(&msg).unwrap();
        assert_eq!(inbound.channel_id, "-100123");
        assert_eq!(inbound.conversation_id, "77");
    }

    #[test]
    fn emoji_reaction_is_normalized() {
        let update = make_reaction(
            serde_json::json!([{"type": "emoji", "emoji": "\u{1f44d}"}]),
            true,
        );
        let signal = to_reaction(&update).unwrap();
        assert_eq!(signal.emoji, "\u{1f44d}");
        assert_eq!(signal.channel_id, "42");
        assert_eq!(signal.message_id, "7");
        assert_eq!(signal.user_id, "5");
        assert_eq!(signal.user_name, "alice");
    }

    #[test]
    fn anonymous_reaction_is_dropped() {
        let update = make_reaction(
            serde_json::json!([{"type": "emoji", "emoji": "\u{1f44d}"}]),
            false,
        );
        assert!(to_reaction(&update).is_none());
    }

    #[test]
    fn custom_emoji_reaction_is_dropped() {
        let update = make_reaction(
            serde_json::json!([{"type": "custom_emoji", "custom_emoji_id": "xyz"}]),
            true,
        );
        assert!(to_reaction(&update).is_none());
    }

    #[test]
    fn cleared_reaction_is_dropped() {
        let update = make_reaction(serde_json::json!([]), true);
        assert!(to_reaction(&update).is_none());
    }
}
