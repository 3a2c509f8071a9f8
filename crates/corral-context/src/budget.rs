// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token budgeting over normalized history lines.

/// Rough token estimate: 4 chars per token. Good enough to keep prompts in
/// the same ballpark as the real tokenizer without shipping one.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Drop the oldest lines one at a time until the total estimate fits the
/// budget. The newest line always survives, even over budget on its own.
pub fn fit_to_budget(lines: Vec<String>, token_budget: usize) -> Vec<String> {
    let mut lines = lines;
    let mut total: usize = lines.iter().map(|l| estimate_tokens(l)).sum();
    while total > token_budget && lines.len() > 1 {
        let dropped = lines.remove(0);
        total -= estimate_tokens(&dropped);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_four_chars_per_token() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(400)), 100);
    }

    #[test]
    fn under_budget_keeps_everything() {
        let lines = vec!["a".repeat(40), "b".repeat(40)];
        assert_eq!(fit_to_budget(lines.clone(), 100), lines);
    }

    #[test]
    fn oldest_lines_are_dropped_first() {
        let lines = vec!["old ".repeat(100), "mid ".repeat(100), "new ".repeat(10)];
        let kept = fit_to_budget(lines, 120);
        assert_eq!(kept.len(), 2);
        assert!(kept[0].starts_with("mid"));
        assert!(kept[1].starts_with("new"));
    }

    #[test]
    fn newest_line_survives_even_over_budget() {
        let lines = vec!["old".to_string(), "n".repeat(4000)];
        let kept = fit_to_budget(lines, 10);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].starts_with('n'));
    }
}
