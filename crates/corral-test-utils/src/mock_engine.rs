// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock agent engine with scripted outcomes.
//!
//! Pops pre-configured outcomes in order and falls back to a fixed default;
//! every request is recorded for assertion. A request whose cancellation
//! token is already tripped returns an unsuccessful outcome, matching the
//! contract that cancelled runs still produce audit rows.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use corral_core::types::{AgentOutcome, AgentRequest};
use corral_core::{AgentEngine, CorralError, ToolPolicy};

pub struct MockEngine {
    outcomes: Mutex<VecDeque<AgentOutcome>>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue successful text outcomes, returned in order.
    pub fn with_responses(texts: Vec<String>) -> Self {
        let outcomes: VecDeque<AgentOutcome> =
            texts.into_iter().map(default_outcome).collect();
        Self {
            outcomes: Mutex::new(outcomes),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue an exact outcome.
    pub async fn push_outcome(&self, outcome: AgentOutcome) {
        self.outcomes.lock().await.push_back(outcome);
    }

    /// All requests seen so far, in execution order.
    pub async fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn default_outcome(text: String) -> AgentOutcome {
    AgentOutcome {
        success: true,
        text,
        cost_usd: 0.001,
        input_tokens: 50,
        output_tokens: 25,
        duration_ms: 5,
        model: Some("mock-model".to_string()),
    }
}

#[async_trait]
impl AgentEngine for MockEngine {
    async fn run(
        &self,
        request: AgentRequest,
        _policy: Arc<dyn ToolPolicy>,
    ) -> Result<AgentOutcome, CorralError> {
        let cancelled = request.cancel.is_cancelled();
        self.requests.lock().await.push(request);

        if cancelled {
            return Ok(AgentOutcome {
                success: false,
                text: "run cancelled".to_string(),
                cost_usd: 0.0,
                input_tokens: 0,
                output_tokens: 0,
                duration_ms: 0,
                model: None,
            });
        }

        let scripted = self.outcomes.lock().await.pop_front();
        Ok(scripted.unwrap_or_else(|| default_outcome("mock response".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    use corral_core::types::{PermissionMode, PolicyDecision};
    use tokio_util::sync::CancellationToken;

    struct AllowAll;
    impl ToolPolicy for AllowAll {
        fn check(&self, _tool: &str, _input: &serde_json::Value) -> PolicyDecision {
            PolicyDecision::Allow {
                rewritten_input: None,
            }
        }
    }

    fn request() -> AgentRequest {
        AgentRequest {
            prompt: "do something".to_string(),
            cwd: PathBuf::from("/tmp"),
            env: HashMap::new(),
            system_prompt: String::new(),
            permission_mode: PermissionMode::Default,
            max_turns: 10,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn scripted_outcomes_come_back_in_order() {
        let engine = MockEngine::with_responses(vec!["one".to_string(), "two".to_string()]);

        let a = engine.run(request(), Arc::new(AllowAll)).await.unwrap();
        let b = engine.run(request(), Arc::new(AllowAll)).await.unwrap();
        let c = engine.run(request(), Arc::new(AllowAll)).await.unwrap();

        assert_eq!(a.text, "one");
        assert_eq!(b.text, "two");
        assert_eq!(c.text, "mock response");
        assert_eq!(engine.request_count().await, 3);
    }

    #[tokio::test]
    async fn cancelled_request_is_unsuccessful() {
        let engine = MockEngine::new();
        let mut req = request();
        req.cancel = CancellationToken::new();
        req.cancel.cancel();

        let outcome = engine.run(req, Arc::new(AllowAll)).await.unwrap();
        assert!(!outcome.success);
    }
}
