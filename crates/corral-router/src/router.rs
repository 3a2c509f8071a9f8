// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message routing.
//!
//! One router instance owns the full per-message pipeline: authorization,
//! command execution, chat relay through the agent pool, and reaction
//! handling. Replies always target the originating channel and thread, and
//! every per-message error is converted into an error reply at this
//! boundary rather than propagated to the event loop.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use corral_config::model::{ChannelPolicy, CorralConfig, ProjectEntry};
use corral_context::assemble_context;
use corral_core::types::{
    AgentOutcome, AgentRequest, Binding, CachedMessage, InboundMessage, OutboundMessage,
    PendingStatus, PermissionMode, Platform, ReactionSignal, RelayRun, RunStatus,
};
use corral_core::{AgentEngine, CorralError, ToolPolicy};
use corral_feedback::FeedbackPipeline;
use corral_notify::Notifier;
use corral_pool::{AgentPool, RunLock, RunLockGuard};
use corral_security::{PathRestrictedPolicy, sanitize_output};
use corral_storage::{RelayStore, RunUpdate};

use crate::command::{Command, parse_command};

const HELP_TEXT: &str = "Corral commands:\n\
/corral help - this message\n\
/corral where - show the bound project\n\
/corral status - queue and lock state\n\
/corral cost - run costs over the last 30 days\n\
/corral projects - list registered projects (admin)\n\
/corral bind <project> - bind this channel to a project (admin)\n\
/corral unbind - remove this channel's binding (admin)\n\
/corral run [project] <workflow> - run a workflow\n\
/corral cancel - cancel the active run\n\
/corral new - start a fresh conversation";

const SETUP_TEXT: &str = "This channel is not bound to a project yet. \
An admin can bind it with /corral bind <project>.";

/// Role line prepended to every agent system prompt. The injection defense
/// clause is appended because prompts can embed chat text.
const SYSTEM_PROMPT: &str = "You are Corral, a relay assistant working inside a \
single project directory. Keep replies concise and suitable for a chat window.";

/// Routes normalized inbound events to commands, agent runs, and feedback.
pub struct Router {
    config: CorralConfig,
    store: Arc<RelayStore>,
    pool: Arc<AgentPool>,
    lock: RunLock,
    engine: Arc<dyn AgentEngine>,
    notifier: Arc<Notifier>,
    feedback: FeedbackPipeline,
    /// Cancellation token of the most recently submitted run per project.
    active_runs: Mutex<HashMap<String, CancellationToken>>,
}

impl Router {
    pub fn new(
        config: CorralConfig,
        store: Arc<RelayStore>,
        engine: Arc<dyn AgentEngine>,
    ) -> Result<Self, CorralError> {
        let pool = Arc::new(AgentPool::new(config.pool.clone()));
        let lock = RunLock::new(&config.lock);
        let notifier = Arc::new(Notifier::new(config.notify.clone())?);
        let feedback = FeedbackPipeline::new(config.feedback.clone());
        Ok(Self {
            config,
            store,
            pool,
            lock,
            engine,
            notifier,
            feedback,
            active_runs: Mutex::new(HashMap::new()),
        })
    }

    pub fn pool(&self) -> &Arc<AgentPool> {
        &self.pool
    }

    /// Drain the pool; pending jobs are dropped, in-flight runs complete.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// Handle one inbound message and produce the reply for the
    /// originating channel and thread, if any.
    pub async fn handle_message(&self, msg: &InboundMessage) -> Option<OutboundMessage> {
        if !self.config.relay.enabled {
            debug!("relay disabled, dropping inbound message");
            return None;
        }

        let text = match self.dispatch(msg).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, channel = %msg.channel_id, "message handling failed");
                Some(format!("Something went wrong: {e}"))
            }
        };

        text.map(|text| OutboundMessage {
            channel_id: msg.channel_id.clone(),
            text,
            thread_id: Some(msg.conversation_id.clone()),
        })
    }

    /// Handle one emoji reaction. Reactions never produce replies; all
    /// failures are logged and swallowed.
    pub async fn handle_reaction(&self, signal: &ReactionSignal) {
        if !self.config.relay.enabled {
            return;
        }

        let binding = match self.store.get_binding(signal.platform, &signal.channel_id).await {
            Ok(Some(binding)) => binding,
            Ok(None) => {
                debug!(channel = %signal.channel_id, "reaction on unbound channel ignored");
                return;
            }
            Err(e) => {
                warn!(error = %e, "binding lookup failed for reaction");
                return;
            }
        };

        let project_dir = self
            .config
            .projects
            .get(&binding.project)
            .map(|entry| PathBuf::from(&entry.path));
        let summary = self.latest_bot_text(signal).await;

        if let Err(e) = self.feedback.handle_feedback(
            signal,
            &binding.project,
            project_dir.as_deref(),
            summary,
        ) {
            warn!(error = %e, project = %binding.project, "feedback handling failed");
        }
    }

    /// Run a workflow without an originating chat message (schedule ticks).
    /// The run goes through the pool and holds the project run lock like
    /// any relay-triggered run, recorded against a synthetic thread.
    pub async fn run_workflow(
        &self,
        project: &str,
        workflow: &str,
    ) -> Result<AgentOutcome, CorralError> {
        let entry = self
            .config
            .projects
            .get(project)
            .cloned()
            .ok_or_else(|| CorralError::ProjectNotFound(project.to_string()))?;
        let Some(guard) = self.lock.acquire(project)? else {
            return Err(CorralError::Internal(format!(
                "a run for '{project}' is already in progress"
            )));
        };
        let msg = workflow_message(project, workflow);
        let prompt =
            format!("Run the '{workflow}' workflow for this project and report the result.");
        self.execute_agent(&msg, project, &entry, prompt, Some(guard))
            .await
    }

    async fn dispatch(&self, msg: &InboundMessage) -> Result<Option<String>, CorralError> {
        let policy = self.channel_policy(msg);
        if !policy.allowed_users.is_empty() && !policy.allowed_users.contains(&msg.user_id) {
            info!(user = %msg.user_id, channel = %msg.channel_id, "unauthorized sender");
            return Ok(Some("Unauthorized.".to_string()));
        }

        let binding = self.store.get_binding(msg.platform, &msg.channel_id).await?;

        match parse_command(&msg.text) {
            Some(command) => {
                self.execute_command(msg, command, binding.as_ref(), &policy)
                    .await
            }
            None => match binding {
                Some(binding) => self.handle_chat(msg, &binding, &policy).await,
                None => Ok(Some(SETUP_TEXT.to_string())),
            },
        }
    }

    async fn execute_command(
        &self,
        msg: &InboundMessage,
        command: Command,
        binding: Option<&Binding>,
        policy: &ChannelPolicy,
    ) -> Result<Option<String>, CorralError> {
        match command {
            Command::Help => Ok(Some(HELP_TEXT.to_string())),

            Command::Where => {
                let Some(binding) = binding else {
                    return Ok(Some(SETUP_TEXT.to_string()));
                };
                let location = self
                    .config
                    .projects
                    .get(&binding.project)
                    .map(|entry| entry.path.clone())
                    .unwrap_or_else(|| "(not in registry)".to_string());
                Ok(Some(format!(
                    "This channel is bound to '{}' at {location}.",
                    binding.project
                )))
            }

            Command::Status => {
                let Some(binding) = binding else {
                    return Ok(Some(SETUP_TEXT.to_string()));
                };
                let project = binding.project.as_str();
                let depth = self.pool.queue_depth(project);
                let active = self.pool.active_count();
                let lock = if self.lock.is_locked(project) {
                    "held"
                } else {
                    "free"
                };
                Ok(Some(format!(
                    "Project: {project}\nQueued jobs: {depth}\nActive runs: {active}\nRun lock: {lock}"
                )))
            }

            Command::Cost => {
                let Some(binding) = binding else {
                    return Ok(Some(SETUP_TEXT.to_string()));
                };
                let since = Utc::now() - chrono::Duration::days(30);
                let summary = self
                    .store
                    .cost_summary(Some(&binding.project), since)
                    .await?;
                Ok(Some(format!(
                    "Last 30 days for '{}': {} runs, ${:.4}, {} tokens in / {} tokens out.",
                    binding.project,
                    summary.run_count,
                    summary.total_cost_usd,
                    summary.total_input_tokens,
                    summary.total_output_tokens
                )))
            }

            Command::Projects => {
                if !self.is_admin(msg.platform, &msg.user_id) {
                    return Ok(Some("Permission denied.".to_string()));
                }
                if self.config.projects.is_empty() {
                    return Ok(Some("No projects are registered.".to_string()));
                }
                let bound = binding.map(|b| b.project.as_str());
                let mut names: Vec<&String> = self.config.projects.keys().collect();
                names.sort();
                let lines: Vec<String> = names
                    .into_iter()
                    .map(|name| {
                        let marker = if Some(name.as_str()) == bound { "*" } else { "-" };
                        format!("{marker} {name}")
                    })
                    .collect();
                Ok(Some(format!("Registered projects:\n{}", lines.join("\n"))))
            }

            Command::Cancel => {
                let Some(binding) = binding else {
                    return Ok(Some(SETUP_TEXT.to_string()));
                };
                let token = self
                    .active_runs
                    .lock()
                    .map_err(|_| CorralError::Internal("run registry poisoned".to_string()))?
                    .get(&binding.project)
                    .cloned();
                match token {
                    Some(token) => {
                        token.cancel();
                        info!(project = %binding.project, "cancellation requested");
                        Ok(Some(format!(
                            "Cancellation requested for '{}'.",
                            binding.project
                        )))
                    }
                    None => Ok(Some("No active run to cancel.".to_string())),
                }
            }

            Command::New => {
                self.store
                    .set_conversation_epoch(
                        msg.platform,
                        &msg.channel_id,
                        &msg.conversation_id,
                        Utc::now(),
                    )
                    .await?;
                Ok(Some(
                    "Started a fresh conversation. Earlier history will not be sent to the agent."
                        .to_string(),
                ))
            }

            Command::Bind { project } => {
                if !self.is_admin(msg.platform, &msg.user_id) {
                    return Ok(Some("Permission denied.".to_string()));
                }
                let Some(project) = project else {
                    return Ok(Some("Usage: /corral bind <project>".to_string()));
                };
                if !self.config.projects.contains_key(&project) {
                    return Ok(Some(format!(
                        "Unknown project '{project}'. Use /corral projects to list registered projects."
                    )));
                }
                self.store
                    .bind_channel(&Binding {
                        platform: msg.platform,
                        channel_id: msg.channel_id.clone(),
                        project: project.clone(),
                        bound_by: msg.user_id.clone(),
                        bound_at: Utc::now(),
                    })
                    .await?;
                info!(project = %project, channel = %msg.channel_id, "channel bound");
                Ok(Some(format!("Bound this channel to '{project}'.")))
            }

            Command::Unbind => {
                if !self.is_admin(msg.platform, &msg.user_id) {
                    return Ok(Some("Permission denied.".to_string()));
                }
                let removed = self
                    .store
                    .unbind_channel(msg.platform, &msg.channel_id)
                    .await?;
                Ok(Some(if removed {
                    "Removed this channel's binding.".to_string()
                } else {
                    "This channel has no binding.".to_string()
                }))
            }

            Command::Run { project, workflow } => {
                self.handle_run(msg, binding, policy, project, workflow).await
            }

            Command::Unknown(name) => Ok(Some(format!(
                "Unknown command '{name}'. Try /corral help."
            ))),
        }
    }

    async fn handle_run(
        &self,
        msg: &InboundMessage,
        binding: Option<&Binding>,
        policy: &ChannelPolicy,
        project_arg: Option<String>,
        workflow: Option<String>,
    ) -> Result<Option<String>, CorralError> {
        if !policy.allow_run {
            return Ok(Some(
                "Run commands are disabled on this channel.".to_string(),
            ));
        }
        let Some(workflow) = workflow else {
            return Ok(Some("Usage: /corral run [project] <workflow>".to_string()));
        };
        let Some(project) = project_arg.or_else(|| binding.map(|b| b.project.clone())) else {
            return Ok(Some(SETUP_TEXT.to_string()));
        };
        let Some(entry) = self.config.projects.get(&project).cloned() else {
            return Ok(Some(format!(
                "Unknown project '{project}'. Use /corral projects to list registered projects."
            )));
        };

        let Some(guard) = self.lock.acquire(&project)? else {
            return Ok(Some(format!(
                "A run for '{project}' is already in progress. Try again when it finishes."
            )));
        };

        let pending_id = self.store.write_pending_message(msg).await?;
        self.store
            .mark_pending(pending_id, PendingStatus::Processing)
            .await?;

        let prompt = format!(
            "Run the '{workflow}' workflow for this project and report the result."
        );
        let reply = match self
            .execute_agent(msg, &project, &entry, prompt, Some(guard))
            .await
        {
            Ok(outcome) => {
                let text = sanitize_output(
                    &outcome.text,
                    self.config.context.max_chars_per_message,
                );
                self.store
                    .cache_message(&bot_reply(msg, &text))
                    .await?;
                self.store.mark_pending(pending_id, PendingStatus::Done).await?;
                if outcome.success {
                    format!("Workflow '{workflow}' finished.\n\n{text}")
                } else {
                    format!("Workflow '{workflow}' failed.\n\n{text}")
                }
            }
            Err(e) => {
                self.store
                    .mark_pending(pending_id, PendingStatus::Failed)
                    .await?;
                reply_for_error(&project, &e)
            }
        };
        Ok(Some(reply))
    }

    async fn handle_chat(
        &self,
        msg: &InboundMessage,
        binding: &Binding,
        policy: &ChannelPolicy,
    ) -> Result<Option<String>, CorralError> {
        if !policy.allow_chat {
            return Ok(Some("Chat is disabled on this channel.".to_string()));
        }
        let project = binding.project.as_str();
        let Some(entry) = self.config.projects.get(project).cloned() else {
            return Ok(Some(format!(
                "Bound project '{project}' is no longer in the registry. An admin should rebind this channel."
            )));
        };

        // Chat runs hold the project lock like every other trigger path, so
        // a CLI or scheduled run never overlaps a chat-driven one.
        let Some(guard) = self.lock.acquire(project)? else {
            return Ok(Some(format!(
                "A run for '{project}' is already in progress. Try again when it finishes."
            )));
        };

        let pending_id = self.store.write_pending_message(msg).await?;
        self.store
            .mark_pending(pending_id, PendingStatus::Processing)
            .await?;

        // Assemble before caching the current message so the request does
        // not appear in its own history.
        let assembled = assemble_context(
            &self.store,
            msg.platform,
            &msg.channel_id,
            &msg.conversation_id,
            &msg.text,
            &msg.user_name,
            project,
            &self.config.context,
        )
        .await?;
        self.store.cache_message(&user_message(msg)).await?;

        let reply = match self
            .execute_agent(msg, project, &entry, assembled.prompt, Some(guard))
            .await
        {
            Ok(outcome) => {
                let text = sanitize_output(
                    &outcome.text,
                    self.config.context.max_chars_per_message,
                );
                let text = if text.trim().is_empty() {
                    "The agent returned no output.".to_string()
                } else {
                    text
                };
                self.store.cache_message(&bot_reply(msg, &text)).await?;
                self.store.mark_pending(pending_id, PendingStatus::Done).await?;
                text
            }
            Err(e) => {
                self.store
                    .mark_pending(pending_id, PendingStatus::Failed)
                    .await?;
                reply_for_error(project, &e)
            }
        };
        Ok(Some(reply))
    }

    /// Execute the engine through the pool, holding `guard` (when present)
    /// for the duration of the run. Records a relay run row before
    /// submission and finalizes it whatever happens, so rows are never
    /// left `running` past the run itself.
    async fn execute_agent(
        &self,
        msg: &InboundMessage,
        project: &str,
        entry: &ProjectEntry,
        prompt: String,
        guard: Option<RunLockGuard>,
    ) -> Result<AgentOutcome, CorralError> {
        let cancel = CancellationToken::new();
        self.active_runs
            .lock()
            .map_err(|_| CorralError::Internal("run registry poisoned".to_string()))?
            .insert(project.to_string(), cancel.clone());

        let mut run = RelayRun {
            id: Uuid::new_v4().to_string(),
            platform: msg.platform,
            channel_id: msg.channel_id.clone(),
            conversation_id: msg.conversation_id.clone(),
            project: project.to_string(),
            user_id: msg.user_id.clone(),
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Running,
            cost_usd: 0.0,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            model: None,
        };
        self.store.record_relay_run(&run).await?;

        let request = AgentRequest {
            prompt,
            cwd: PathBuf::from(&entry.path),
            env: entry.env.clone(),
            system_prompt: format!("{SYSTEM_PROMPT}\n\n{}", corral_context::INJECTION_DEFENSE),
            permission_mode: PermissionMode::Default,
            max_turns: self.config.engine.max_turns,
            cancel: cancel.clone(),
        };
        let tool_policy: Arc<dyn ToolPolicy> = Arc::new(PathRestrictedPolicy::new(
            entry.path.clone(),
            self.config.engine.network_isolation,
        ));
        let engine = Arc::clone(&self.engine);
        let timeout = Duration::from_secs(self.config.engine.timeout_secs);
        let started = Instant::now();

        let job = async move {
            // Held for the full run; dropping releases the project lock.
            let _guard = guard;
            match tokio::time::timeout(timeout, engine.run(request, tool_policy)).await {
                Ok(result) => result,
                Err(_) => Err(CorralError::Timeout { duration: timeout }),
            }
        };

        let (rx, position) = match self.pool.enqueue(project, job) {
            Ok(submitted) => submitted,
            Err(e) => {
                self.clear_active(project);
                self.finish_run(&mut run, RunStatus::Failed, None, started).await?;
                return Err(e);
            }
        };
        if position > 0 {
            debug!(project = %project, position, "run queued behind earlier work");
        }

        let result = match rx.await {
            Ok(result) => result,
            Err(_) => Err(CorralError::ShuttingDown),
        };
        self.clear_active(project);

        match result {
            Ok(outcome) => {
                let status = if outcome.success {
                    RunStatus::Complete
                } else if cancel.is_cancelled() {
                    RunStatus::Cancelled
                } else {
                    RunStatus::Failed
                };
                self.finish_run(&mut run, status, Some(&outcome), started).await?;
                self.notifier.notify(&run).await;
                Ok(outcome)
            }
            Err(e) => {
                let status = if cancel.is_cancelled() {
                    RunStatus::Cancelled
                } else {
                    RunStatus::Failed
                };
                self.finish_run(&mut run, status, None, started).await?;
                self.notifier.notify(&run).await;
                Err(e)
            }
        }
    }

    async fn finish_run(
        &self,
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
        self.store
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

    fn clear_active(&self, project: &str) {
        if let Ok(mut active) = self.active_runs.lock() {
            active.remove(project);
        }
    }

    fn is_admin(&self, platform: Platform, user_id: &str) -> bool {
        self.config
            .relay
            .admins
            .get(&platform.to_string())
            .is_some_and(|admins| admins.iter().any(|admin| admin == user_id))
    }

    fn channel_policy(&self, msg: &InboundMessage) -> ChannelPolicy {
        match msg.platform {
            Platform::Telegram => self.config.telegram.policy_for(&msg.channel_id).clone(),
            Platform::Webhook => ChannelPolicy::default(),
        }
    }

    /// Most recent agent reply in the reaction's thread, used as the saved
    /// feedback summary.
    async fn latest_bot_text(&self, signal: &ReactionSignal) -> Option<String> {
        match self
            .store
            .get_cached_messages(
                signal.platform,
                &signal.channel_id,
                &signal.conversation_id,
                10,
                None,
            )
            .await
        {
            Ok(messages) => messages
                .into_iter()
                .rev()
                .find(|m| m.is_bot)
                .map(|m| m.text),
            Err(e) => {
                warn!(error = %e, "cached message lookup failed for reaction");
                None
            }
        }
    }
}

fn user_message(msg: &InboundMessage) -> CachedMessage {
    CachedMessage {
        platform: msg.platform,
        channel_id: msg.channel_id.clone(),
        conversation_id: msg.conversation_id.clone(),
        message_id: msg.message_id.clone(),
        user_id: msg.user_id.clone(),
        user_name: msg.user_name.clone(),
        text: msg.text.clone(),
        is_bot: false,
        timestamp: msg.timestamp,
    }
}

/// Synthetic inbound context for runs that have no originating message.
fn workflow_message(project: &str, workflow: &str) -> InboundMessage {
    InboundMessage {
        platform: Platform::Webhook,
        channel_id: "scheduler".to_string(),
        conversation_id: format!("{project}/{workflow}"),
        message_id: Uuid::new_v4().to_string(),
        user_id: "scheduler".to_string(),
        user_name: "scheduler".to_string(),
        text: String::new(),
        timestamp: Utc::now(),
    }
}

fn bot_reply(msg: &InboundMessage, text: &str) -> CachedMessage {
    CachedMessage {
        platform: msg.platform,
        channel_id: msg.channel_id.clone(),
        conversation_id: msg.conversation_id.clone(),
        message_id: Uuid::new_v4().to_string(),
        user_id: "corral".to_string(),
        user_name: "corral".to_string(),
        text: text.to_string(),
        is_bot: true,
        timestamp: Utc::now(),
    }
}

fn reply_for_error(project: &str, err: &CorralError) -> String {
    match err {
        CorralError::QueueFull { .. } => {
            format!("The queue for '{project}' is full. Try again shortly.")
        }
        CorralError::MemoryPressure { .. } => {
            "The relay is under memory pressure and cannot accept new work right now.".to_string()
        }
        CorralError::ShuttingDown => "The relay is shutting down.".to_string(),
        CorralError::Timeout { .. } => "The run timed out before finishing.".to_string(),
        other => format!("The run failed: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use corral_config::model::CorralConfig;
    use corral_core::types::AgentRequest;

    struct StubEngine {
        text: String,
        success: bool,
    }

    #[async_trait]
    impl AgentEngine for StubEngine {
        async fn run(
            &self,
            _request: AgentRequest,
            _policy: Arc<dyn ToolPolicy>,
        ) -> Result<AgentOutcome, CorralError> {
            Ok(AgentOutcome {
                success: self.success,
                text: self.text.clone(),
                cost_usd: 0.0125,
                input_tokens: 120,
                output_tokens: 48,
                duration_ms: 12,
                model: Some("stub-1".to_string()),
            })
        }
    }

    fn base_config(dir: &TempDir) -> CorralConfig {
        let mut config = CorralConfig::default();
        config.storage.database_path = dir
            .path()
            .join("relay.db")
            .to_string_lossy()
            .into_owned();
        config.lock.lock_dir = dir.path().join("locks").to_string_lossy().into_owned();
        config.notify.dead_letter_path = dir
            .path()
            .join("dead-letter.jsonl")
            .to_string_lossy()
            .into_owned();
        config.feedback.log_path = dir
            .path()
            .join("feedback.jsonl")
            .to_string_lossy()
            .into_owned();
        config
            .relay
            .admins
            .insert("telegram".to_string(), vec!["admin".to_string()]);
        config.projects.insert(
            "demo".to_string(),
            ProjectEntry {
                path: dir.path().join("demo").to_string_lossy().into_owned(),
                env: HashMap::new(),
            },
        );
        config
    }

    async fn router_with(config: CorralConfig) -> Router {
        let store = Arc::new(RelayStore::new(config.storage.clone()));
        store.initialize().await.unwrap();
        let engine = Arc::new(StubEngine {
            text: "stub reply".to_string(),
            success: true,
        });
        Router::new(config, store, engine).unwrap()
    }

    fn msg(text: &str, user: &str) -> InboundMessage {
        InboundMessage {
            platform: Platform::Telegram,
            channel_id: "chan-1".to_string(),
            conversation_id: "conv-1".to_string(),
            message_id: Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            user_name: format!("{user}-name"),
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    async fn bind_demo(router: &Router) {
        let reply = router
            .handle_message(&msg("/corral bind demo", "admin"))
            .await
            .unwrap();
        assert!(reply.text.contains("Bound"), "got: {}", reply.text);
    }

    #[tokio::test]
    async fn disabled_relay_is_silent() {
        let dir = TempDir::new().unwrap();
        let mut config = base_config(&dir);
        config.relay.enabled = false;
        let router = router_with(config).await;

        assert!(router.handle_message(&msg("!help", "admin")).await.is_none());
        assert!(router.handle_message(&msg("hello", "admin")).await.is_none());
    }

    #[tokio::test]
    async fn unbound_channel_gets_setup_instructions() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;

        let reply = router.handle_message(&msg("hello there", "u1")).await.unwrap();
        assert!(reply.text.contains("not bound"));
    }

    #[tokio::test]
    async fn unauthorized_sender_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut config = base_config(&dir);
        config.telegram.defaults.allowed_users = vec!["alice".to_string()];
        let router = router_with(config).await;

        let reply = router.handle_message(&msg("!help", "bob")).await.unwrap();
        assert_eq!(reply.text, "Unauthorized.");

        let reply = router.handle_message(&msg("!help", "alice")).await.unwrap();
        assert!(reply.text.contains("Corral commands"));
    }

    #[tokio::test]
    async fn non_admin_cannot_bind() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;

        let reply = router
            .handle_message(&msg("/corral bind demo", "u1"))
            .await
            .unwrap();
        assert_eq!(reply.text, "Permission denied.");
    }

    #[tokio::test]
    async fn admin_binds_and_where_reports_project() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;

        bind_demo(&router).await;

        let reply = router.handle_message(&msg("!where", "u1")).await.unwrap();
        assert!(reply.text.contains("demo"));
    }

    #[tokio::test]
    async fn binding_unknown_project_is_rejected() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;

        let reply = router
            .handle_message(&msg("/corral bind ghost", "admin"))
            .await
            .unwrap();
        assert!(reply.text.contains("Unknown project"));
    }

    #[tokio::test]
    async fn unknown_command_gets_hint() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;

        let reply = router
            .handle_message(&msg("!frobnicate", "u1"))
            .await
            .unwrap();
        assert!(reply.text.contains("Unknown command"));
        assert!(reply.text.contains("/corral help"));
    }

    #[tokio::test]
    async fn replies_target_originating_thread() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;

        let reply = router.handle_message(&msg("!help", "u1")).await.unwrap();
        assert_eq!(reply.channel_id, "chan-1");
        assert_eq!(reply.thread_id.as_deref(), Some("conv-1"));
    }

    #[tokio::test]
    async fn chat_runs_engine_and_caches_both_sides() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;
        bind_demo(&router).await;

        let reply = router
            .handle_message(&msg("how is the build doing?", "u1"))
            .await
            .unwrap();
        assert!(reply.text.contains("stub reply"));

        let cached = router
            .store
            .get_cached_messages(Platform::Telegram, "chan-1", "conv-1", 10, None)
            .await
            .unwrap();
        assert_eq!(cached.len(), 2);
        assert!(!cached[0].is_bot);
        assert!(cached[1].is_bot);
    }

    #[tokio::test]
    async fn chat_disabled_channel_replies_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = base_config(&dir);
        config.telegram.defaults.allow_chat = false;
        let router = router_with(config).await;
        bind_demo(&router).await;

        let reply = router.handle_message(&msg("hello", "u1")).await.unwrap();
        assert!(reply.text.contains("disabled"));
    }

    #[tokio::test]
    async fn run_workflow_records_run_row() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;
        bind_demo(&router).await;

        let reply = router
            .handle_message(&msg("!run deploy", "u1"))
            .await
            .unwrap();
        assert!(reply.text.contains("finished"), "got: {}", reply.text);

        let run = router
            .store
            .latest_run_for_thread(Platform::Telegram, "chan-1", "conv-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.status, RunStatus::Complete);
        assert_eq!(run.project, "demo");
        assert!(run.completed_at.is_some());
        assert!((run.cost_usd - 0.0125).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn run_disabled_channel_replies_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = base_config(&dir);
        config.telegram.defaults.allow_run = false;
        let router = router_with(config).await;
        bind_demo(&router).await;

        let reply = router
            .handle_message(&msg("!run deploy", "u1"))
            .await
            .unwrap();
        assert!(reply.text.contains("disabled"));
    }

    #[tokio::test]
    async fn run_while_lock_held_replies_busy() {
        let dir = TempDir::new().unwrap();
        let config = base_config(&dir);
        let lock = RunLock::new(&config.lock);
        let router = router_with(config).await;
        bind_demo(&router).await;

        let _guard = lock.acquire("demo").unwrap().unwrap();
        let reply = router
            .handle_message(&msg("!run deploy", "u1"))
            .await
            .unwrap();
        assert!(reply.text.contains("already in progress"));
    }

    #[tokio::test]
    async fn chat_while_lock_held_replies_busy() {
        let dir = TempDir::new().unwrap();
        let config = base_config(&dir);
        let lock = RunLock::new(&config.lock);
        let router = router_with(config).await;
        bind_demo(&router).await;

        let _guard = lock.acquire("demo").unwrap().unwrap();
        let reply = router
            .handle_message(&msg("how is the build doing?", "u1"))
            .await
            .unwrap();
        assert!(
            reply.text.contains("already in progress"),
            "got: {}",
            reply.text
        );
    }

    #[tokio::test]
    async fn chat_releases_lock_after_completion() {
        let dir = TempDir::new().unwrap();
        let config = base_config(&dir);
        let lock = RunLock::new(&config.lock);
        let router = router_with(config).await;
        bind_demo(&router).await;

        router
            .handle_message(&msg("how is the build doing?", "u1"))
            .await
            .unwrap();
        assert!(!lock.is_locked("demo"));
    }

    #[tokio::test]
    async fn run_releases_lock_after_completion() {
        let dir = TempDir::new().unwrap();
        let config = base_config(&dir);
        let lock = RunLock::new(&config.lock);
        let router = router_with(config).await;
        bind_demo(&router).await;

        router.handle_message(&msg("!run deploy", "u1")).await.unwrap();
        assert!(!lock.is_locked("demo"));
    }

    #[tokio::test]
    async fn new_records_conversation_epoch() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;
        bind_demo(&router).await;

        assert!(router
            .store
            .get_conversation_epoch(Platform::Telegram, "chan-1", "conv-1")
            .await
            .unwrap()
            .is_none());

        let reply = router.handle_message(&msg("!new", "u1")).await.unwrap();
        assert!(reply.text.contains("fresh conversation"));

        assert!(router
            .store
            .get_conversation_epoch(Platform::Telegram, "chan-1", "conv-1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn status_reports_lock_and_queue() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;
        bind_demo(&router).await;

        let reply = router.handle_message(&msg("!status", "u1")).await.unwrap();
        assert!(reply.text.contains("demo"));
        assert!(reply.text.contains("Run lock: free"));
    }

    #[tokio::test]
    async fn cancel_without_active_run() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;
        bind_demo(&router).await;

        let reply = router.handle_message(&msg("!cancel", "u1")).await.unwrap();
        assert!(reply.text.contains("No active run"));
    }

    #[tokio::test]
    async fn projects_requires_admin() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;

        let reply = router
            .handle_message(&msg("!projects", "u1"))
            .await
            .unwrap();
        assert_eq!(reply.text, "Permission denied.");

        let reply = router
            .handle_message(&msg("!projects", "admin"))
            .await
            .unwrap();
        assert!(reply.text.contains("demo"));
    }

    #[tokio::test]
    async fn cost_reports_recorded_runs() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;
        bind_demo(&router).await;

        router.handle_message(&msg("!run deploy", "u1")).await.unwrap();

        let reply = router.handle_message(&msg("!cost", "u1")).await.unwrap();
        assert!(reply.text.contains("1 runs"), "got: {}", reply.text);
        assert!(reply.text.contains("$0.0125"));
    }

    #[tokio::test]
    async fn reaction_on_bound_channel_is_recorded() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;
        bind_demo(&router).await;

        router
            .handle_reaction(&ReactionSignal {
                platform: Platform::Telegram,
                channel_id: "chan-1".to_string(),
                conversation_id: "conv-1".to_string(),
                message_id: "m1".to_string(),
                user_id: "u1".to_string(),
                user_name: "u1-name".to_string(),
                emoji: "+1".to_string(),
                timestamp: Utc::now(),
            })
            .await;

        let log = router.feedback.read_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].project, "demo");
    }

    #[tokio::test]
    async fn scheduled_workflow_records_a_run() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;

        let outcome = router.run_workflow("demo", "nightly").await.unwrap();
        assert!(outcome.success);

        let run = router
            .store
            .latest_run_for_thread(Platform::Webhook, "scheduler", "demo/nightly")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.status, RunStatus::Complete);
        assert_eq!(run.project, "demo");
    }

    #[tokio::test]
    async fn scheduled_workflow_for_unknown_project_fails() {
        let dir = TempDir::new().unwrap();
        let router = router_with(base_config(&dir)).await;

        let err = router.run_workflow("ghost", "nightly").await.unwrap_err();
        assert!(matches!(err, CorralError::ProjectNotFound(_)));
    }
}
