// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message normalization for prompt assembly.
//!
//! Every history line carries its author and a minute-precision timestamp.
//! Text written by chat users is untrusted and gets wrapped in
//! `<user_message>` delimiters so the model can distinguish it from relay
//! instructions.

use corral_core::types::CachedMessage;

/// Marker appended when a message body is cut at the length ceiling.
const TRUNCATED: &str = "\u{2026}[truncated]";

/// Render one cached message as a history line.
pub fn format_message(msg: &CachedMessage, max_chars: usize) -> String {
    let stamp = msg.timestamp.format("%Y-%m-%dT%H:%MZ");
    let text = clamp(&msg.text, max_chars);
    if msg.is_bot {
        format!("[{} @ {stamp}]: {text}", msg.user_name)
    } else {
        format!("[{} @ {stamp}]: <user_message>{text}</user_message>", msg.user_name)
    }
}

/// Cut a string to at most `max_chars` characters, appending a marker.
pub fn clamp(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}{TRUNCATED}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use corral_core::types::Platform;

    fn msg(user: &str, text: &str, is_bot: bool) -> CachedMessage {
        CachedMessage {
            platform: Platform::Telegram,
            channel_id: "chan".to_string(),
            conversation_id: "conv".to_string(),
            message_id: "m1".to_string(),
            user_id: "u1".to_string(),
            user_name: user.to_string(),
            text: text.to_string(),
            is_bot,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap(),
        }
    }

    #[test]
    fn user_messages_are_delimited() {
        let line = format_message(&msg("alice", "deploy please", false), 2000);
        assert_eq!(
            line,
            "[alice @ 2026-03-14T15:09Z]: <user_message>deploy please</user_message>"
        );
    }

    #[test]
    fn bot_messages_are_not_delimited() {
        let line = format_message(&msg("corral", "done, 3 files changed", true), 2000);
        assert_eq!(line, "[corral @ 2026-03-14T15:09Z]: done, 3 files changed");
        assert!(!line.contains("<user_message>"));
    }

    #[test]
    fn long_text_is_clamped_inside_delimiters() {
        let long = "x".repeat(50);
        let line = format_message(&msg("alice", &long, false), 10);
        assert!(line.contains("xxxxxxxxxx\u{2026}[truncated]"));
        assert!(line.ends_with("</user_message>"));
    }

    #[test]
    fn clamp_is_char_aware() {
        assert_eq!(clamp("héllo", 10), "héllo");
        let cut = clamp("héllo wörld", 4);
        assert!(cut.starts_with("héll"));
        assert!(cut.ends_with("[truncated]"));
    }
}
