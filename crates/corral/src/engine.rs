// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subprocess agent engine.
//!
//! Runs the configured agent command once per execution. The request is
//! written to the child's stdin as a single JSON document and the outcome
//! is read back from stdout: the last non-empty line is parsed as a JSON
//! outcome (`text`, `cost_usd`, `input_tokens`, `output_tokens`, `model`),
//! and anything that does not parse is treated as plain output text.
//!
//! Before spawning, the full command line is checked against the tool
//! policy as a shell execution, so network isolation rewrites apply to the
//! agent process itself. Configured command elements must not require
//! shell quoting, since a rewritten command runs through `sh -c`.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use corral_config::model::EngineConfig;
use corral_core::types::{AgentOutcome, AgentRequest, PermissionMode, PolicyDecision};
use corral_core::{AgentEngine, CorralError, ToolPolicy};

pub struct ProcessEngine {
    command: Vec<String>,
}

impl ProcessEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, CorralError> {
        if config.command.is_empty() {
            return Err(CorralError::Config(
                "engine.command must name the agent program".to_string(),
            ));
        }
        Ok(Self {
            command: config.command.clone(),
        })
    }

    /// Resolve the argv to spawn, applying any policy rewrite of the
    /// command line.
    fn resolved_argv(&self, policy: &dyn ToolPolicy) -> Result<Vec<String>, CorralError> {
        let joined = self.command.join(" ");
        match policy.check("bash", &serde_json::json!({ "command": joined })) {
            PolicyDecision::Deny { reason } => Err(CorralError::Security(reason)),
            PolicyDecision::Allow {
                rewritten_input: Some(input),
            } => {
                let rewritten = input
                    .get("command")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        CorralError::Security("policy rewrite dropped the command".to_string())
                    })?;
                Ok(vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    rewritten.to_string(),
                ])
            }
            PolicyDecision::Allow {
                rewritten_input: None,
            } => Ok(self.command.clone()),
        }
    }
}

/// Outcome document expected on the agent's stdout.
#[derive(Debug, Deserialize)]
struct WireOutcome {
    text: String,
    #[serde(default)]
    cost_usd: f64,
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    model: Option<String>,
}

#[async_trait]
impl AgentEngine for ProcessEngine {
    async fn run(
        &self,
        request: AgentRequest,
        policy: Arc<dyn ToolPolicy>,
    ) -> Result<AgentOutcome, CorralError> {
        let started = Instant::now();
        let argv = self.resolved_argv(policy.as_ref())?;

        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(&request.cwd)
            .envs(&request.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CorralError::Engine {
                message: format!("failed to spawn agent command '{}'", argv[0]),
                source: Some(Box::new(e)),
            })?;

        let payload = serde_json::json!({
            "prompt": request.prompt,
            "system_prompt": request.system_prompt,
            "max_turns": request.max_turns,
            "permission_mode": permission_mode_str(request.permission_mode),
        })
        .to_string();

        // Drain stdout and stderr concurrently so the child never blocks on
        // a full pipe.
        let mut stdout = child.stdout.take().ok_or_else(|| CorralError::Engine {
            message: "agent stdout unavailable".to_string(),
            source: None,
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| CorralError::Engine {
            message: "agent stderr unavailable".to_string(),
            source: None,
        })?;
        let output = tokio::spawn(async move {
            let mut out = String::new();
            let mut err = String::new();
            let _ = stdout.read_to_string(&mut out).await;
            let _ = stderr.read_to_string(&mut err).await;
            (out, err)
        });

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading its stdin closes the pipe;
            // that is not an engine failure.
            match stdin.write_all(payload.as_bytes()).await {
                Ok(()) => {
                    let _ = stdin.shutdown().await;
                }
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    let _ = child.kill().await;
                    return Err(CorralError::Engine {
                        message: "failed to write agent request".to_string(),
                        source: Some(Box::new(e)),
                    });
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| CorralError::Engine {
                message: "failed to wait for agent process".to_string(),
                source: Some(Box::new(e)),
            })?,
            _ = request.cancel.cancelled() => {
                let _ = child.kill().await;
                debug!("agent process killed after cancellation");
                return Ok(AgentOutcome {
                    success: false,
                    text: "run cancelled".to_string(),
                    cost_usd: 0.0,
                    input_tokens: 0,
                    output_tokens: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                    model: None,
                });
            }
        };

        let (out, err) = output.await.map_err(|e| CorralError::Engine {
            message: "agent output reader failed".to_string(),
            source: Some(Box::new(e)),
        })?;
        if !status.success() {
            warn!(
                code = status.code(),
                stderr = %err.trim(),
                "agent command exited abnormally"
            );
        }

        Ok(parse_outcome(
            status.success(),
            &out,
            started.elapsed().as_millis() as u64,
        ))
    }
}

fn parse_outcome(success: bool, stdout: &str, duration_ms: u64) -> AgentOutcome {
    let last_line = stdout.lines().rev().find(|line| !line.trim().is_empty());
    if let Some(line) = last_line {
        if let Ok(wire) = serde_json::from_str::<WireOutcome>(line) {
            return AgentOutcome {
                success,
                text: wire.text,
                cost_usd: wire.cost_usd,
                input_tokens: wire.input_tokens,
                output_tokens: wire.output_tokens,
                duration_ms,
                model: wire.model,
            };
        }
    }
    AgentOutcome {
        success,
        text: stdout.trim().to_string(),
        cost_usd: 0.0,
        input_tokens: 0,
        output_tokens: 0,
        duration_ms,
        model: None,
    }
}

fn permission_mode_str(mode: PermissionMode) -> &'static str {
    match mode {
        PermissionMode::Default => "default",
        PermissionMode::AcceptEdits => "acceptEdits",
        PermissionMode::BypassPermissions => "bypassPermissions",
    }
}
