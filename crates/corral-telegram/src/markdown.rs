// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MarkdownV2 escaping for the Telegram Bot API.
//!
//! MarkdownV2 requires escaping 18 special characters outside code spans.
//! Content inside inline code (`` ` ``) and fenced blocks (`` ``` ``) is
//! passed through untouched.

/// Characters that must be escaped outside code spans.
const SPECIAL_CHARS: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escape text for Telegram's MarkdownV2 parse mode.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    let mut rest = text;

    while !rest.is_empty() {
        let Some(tick) = rest.find('`') else {
            escape_segment(rest, &mut out);
            break;
        };
        let (plain, code) = rest.split_at(tick);
        escape_segment(plain, &mut out);

        if let Some(body) = code.strip_prefix("```") {
            // Fenced block: copy verbatim through the closing fence. An
            // unclosed fence runs to the end of the text.
            match body.find("```") {
                Some(end) => {
                    let span = 3 + end + 3;
                    out.push_str(&code[..span]);
                    rest = &code[span..];
                }
                None => {
                    out.push_str(code);
                    break;
                }
            }
        } else {
            // Inline code, same unclosed-span rule.
            match code[1..].find('`') {
                Some(end) => {
                    let span = end + 2;
                    out.push_str(&code[..span]);
                    rest = &code[span..];
                }
                None => {
                    out.push_str(code);
                    break;
                }
            }
        }
    }

    out
}

fn escape_segment(segment: &str, out: &mut String) {
    for ch in segment.chars() {
        if SPECIAL_CHARS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
}
