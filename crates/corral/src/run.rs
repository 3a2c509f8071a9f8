// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `corral run` command implementation.
//!
//! Runs one workflow for a project directly, without going through the
//! relay pool. The project run lock is still acquired, so a CLI run and a
//! relay-triggered run can never touch the same project concurrently, and
//! the run is recorded in the store so `cost` reporting includes it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use corral_config::CorralConfig;
use corral_core::types::{
    AgentOutcome, AgentRequest, PermissionMode, Platform, RelayRun, RunStatus,
};
use corral_core::{AgentEngine, CorralError, ToolPolicy};
use corral_pool::RunLock;
use corral_security::PathRestrictedPolicy;
use corral_storage::{RelayStore, RunUpdate};

use crate::engine::ProcessEngine;

const SYSTEM_PROMPT: &str = "You are Corral, running a workflow inside a single \
project directory. Report what you did and the result, concisely.";

/// Runs the `corral run <project> <workflow>` command.
pub async fn run_workflow(
    config: CorralConfig,
    project: &str,
    workflow: &str,
) -> Result<(), CorralError> {
    let entry = config
        .projects
        .get(project)
        .cloned()
        .ok_or_else(|| CorralError::ProjectNotFound(project.to_string()))?;

    let lock = RunLock::new(&config.lock);
    let Some(_guard) = lock.acquire(project)? else {
        return Err(CorralError::Internal(format!(
            "a run for '{project}' is already in progress"
        )));
    };

    let store = RelayStore::new(config.storage.clone());
    store.initialize().await?;

    let engine = ProcessEngine::new(&config.engine)?;
    let policy: Arc<dyn ToolPolicy> = Arc::new(PathRestrictedPolicy::new(
        entry.path.clone(),
        config.engine.network_isolation,
    ));
    let request = AgentRequest {
        prompt: format!("Run the '{workflow}' workflow for this project and report the result."),
        cwd: PathBuf::from(&entry.path),
        env: entry.env.clone(),
        system_prompt: SYSTEM_PROMPT.to_string(),
        permission_mode: PermissionMode::Default,
        max_turns: config.engine.max_turns,
        cancel: CancellationToken::new(),
    };

    let mut run = cli_run_record(project, workflow);
    store.record_relay_run(&run).await?;

    let timeout = Duration::from_secs(config.engine.timeout_secs);
    let started = Instant::now();
    let result = match tokio::time::timeout(timeout, engine.run(request, policy)).await {
        Ok(result) => result,
        Err(_) => Err(CorralError::Timeout { duration: timeout }),
    };

    match result {
        Ok(outcome) => {
            let status = if outcome.success {
                RunStatus::Complete
            } else {
                RunStatus::Failed
            };
            finalize(&store, &mut run, status, Some(&outcome), started).await?;
            print_summary(workflow, &outcome);
            if outcome.success {
                Ok(())
            } else {
                Err(CorralError::Engine {
                    message: format!("workflow '{workflow}' failed"),
                    source: None,
                })
            }
        }
        Err(e) => {
            finalize(&store, &mut run, RunStatus::Failed, None, started).await?;
            Err(e)
        }
    }
}

fn cli_run_record(project: &str, workflow: &str) -> RelayRun {
    RelayRun {
        id: Uuid::new_v4().to_string(),
        platform: Platform::Webhook,
        channel_id: "cli".to_string(),
        conversation_id: format!("{project}/{workflow}"),
        project: project.to_string(),
        user_id: "cli".to_string(),
        started_at: Utc::now(),
        completed_at: None,
        status: RunStatus::Running,
        cost_usd: 0.0,
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: 0,
        model: None,
    }
}

async fn finalize(
    store: &RelayStore,
    run: &mut RelayRun,
    status: RunStatus,
    outcome: Option<&AgentOutcome>,
    started: Instant,
) -> Result<(), CorralError> {
    run.status = status;
    run.completed_at = Some(Utc::now());
    if let Some(outcome) = outcome {
        run.cost_usd = outcome.cost_usd;
        run.input_tokens = outcome.input_tokens;
        run.output_tokens = outcome.output_tokens;
        run.duration_ms = outcome.duration_ms;
        run.model = outcome.model.clone();
    } else {
        run.duration_ms = started.elapsed().as_millis() as u64;
    }
    store
        .update_relay_run(
            &run.id,
            RunUpdate {
                completed_at: run.completed_at,
                status: Some(status),
                cost_usd: Some(run.cost_usd),
                input_tokens: Some(run.input_tokens),
                output_tokens: Some(run.output_tokens),
                duration_ms: Some(run.duration_ms),
                model: run.model.clone(),
            },
        )
        .await
}

fn print_summary(workflow: &str, outcome: &AgentOutcome) {
    let verdict = if outcome.success { "finished" } else { "failed" };
    println!(
        "Workflow '{workflow}' {verdict} in {:.1}s.",
        outcome.duration_ms as f64 / 1000.0
    );
    println!(
        "Cost: ${:.4}  Tokens: {} in / {} out",
        outcome.cost_usd, outcome.input_tokens, outcome.output_tokens
    );
    if let Some(model) = &outcome.model {
        println!("Model: {model}");
    }
    if !outcome.text.trim().is_empty() {
        println!("\n{}", outcome.text.trim());
    }
}
