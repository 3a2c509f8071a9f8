// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user sliding-window rate limiting.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// In-memory per-user sliding one-hour window. Old entries are pruned on
/// every check, so an idle user's history costs nothing at steady state.
#[derive(Debug, Default)]
pub struct RateLimiter {
    events: HashMap<String, Vec<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event for the user and report whether they were already at
    /// the limit. At the limit the event is NOT recorded, so a spamming user
    /// recovers as their window slides.
    pub fn is_rate_limited(&mut self, user_id: &str, max_per_hour: usize) -> bool {
        self.check_at(user_id, max_per_hour, Utc::now())
    }

    fn check_at(&mut self, user_id: &str, max_per_hour: usize, now: DateTime<Utc>) -> bool {
        let cutoff = now - Duration::hours(1);
        let events = self.events.entry(user_id.to_string()).or_default();
        events.retain(|ts| *ts > cutoff);
        if events.len() >= max_per_hour {
            return true;
        }
        events.push(now);
        false
    }
}
