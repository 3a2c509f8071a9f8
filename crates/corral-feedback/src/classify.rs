// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Emoji reaction classification.
//!
//! Reactions arrive as shortcodes (`:thumbsup:`), bare names (`+1`), or raw
//! unicode depending on the platform. Names are normalized (colons stripped,
//! lowercased) before lookup; anything outside the four fixed sets is not
//! feedback.

use corral_core::types::FeedbackType;

const POSITIVE: &[&str] = &[
    "+1", "thumbsup", "thumbs_up", "\u{1f44d}", "heart", "\u{2764}\u{fe0f}", "\u{2764}",
    "fire", "\u{1f525}", "100", "\u{1f4af}", "tada", "\u{1f389}",
];

const NEGATIVE: &[&str] = &[
    "-1", "thumbsdown", "thumbs_down", "\u{1f44e}", "confused", "\u{1f615}", "x",
    "\u{274c}",
];

const ACKNOWLEDGE: &[&str] = &[
    "eyes", "\u{1f440}", "ok", "ok_hand", "\u{1f44c}", "white_check_mark", "\u{2705}",
];

const SAVE: &[&str] = &[
    "star", "\u{2b50}", "star2", "\u{1f31f}", "bookmark", "\u{1f516}", "floppy_disk",
    "\u{1f4be}", "pushpin", "\u{1f4cc}",
];

/// Map a reaction emoji to a feedback category, or `None` when the emoji
/// carries no feedback meaning.
pub fn classify_reaction(emoji: &str) -> Option<FeedbackType> {
    let name = emoji.trim().trim_matches(':').to_lowercase();
    if name.is_empty() {
        return None;
    }
    let name = name.as_str();
    if POSITIVE.contains(&name) {
        Some(FeedbackType::Positive)
    } else if NEGATIVE.contains(&name) {
        Some(FeedbackType::Negative)
    } else if ACKNOWLEDGE.contains(&name) {
        Some(FeedbackType::Acknowledge)
    } else if SAVE.contains(&name) {
        Some(FeedbackType::Save)
    } else {
        None
    }
}
