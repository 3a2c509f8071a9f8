// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `corral serve` command implementation.
//!
//! Starts the full relay: SQLite store, router over the admission-control
//! pool, the subprocess agent engine, and the Telegram channel adapter.
//! The event loop multiplexes inbound channel events, cron schedule ticks,
//! and retention passes, and shuts down gracefully on SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use croner::Cron;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use corral_config::model::{CorralConfig, ScheduleEntry};
use corral_core::traits::{ChannelAdapter, PluginAdapter};
use corral_core::types::{InboundEvent, InboundMessage, OutboundMessage, PendingMessage, PendingStatus};
use corral_core::CorralError;
use corral_router::Router;
use corral_storage::RelayStore;
use corral_telegram::TelegramChannel;

use crate::engine::ProcessEngine;

/// Messages still pending from before a restart are replayed if younger
/// than this window; older ones are abandoned.
const RECOVERY_WINDOW_MINUTES: i64 = 60;

/// Cron schedules are evaluated at this granularity.
const SCHEDULE_TICK_SECS: u64 = 30;

/// Runs the `corral serve` command.
pub async fn run_serve(config: CorralConfig) -> Result<(), CorralError> {
    info!("starting corral serve");

    let store = Arc::new(RelayStore::new(config.storage.clone()));
    store.initialize().await?;

    let abandoned = store.abandon_stale_pending(RECOVERY_WINDOW_MINUTES).await?;
    if abandoned > 0 {
        warn!(abandoned, "abandoned stale pending messages from a previous run");
    }

    let engine = Arc::new(ProcessEngine::new(&config.engine)?);
    let router = Arc::new(Router::new(config.clone(), store.clone(), engine)?);

    let channel = match &config.telegram.bot_token {
        Some(_) => {
            let mut telegram = TelegramChannel::new(&config.telegram)?;
            telegram.connect().await?;
            info!("telegram channel connected");
            Some(Arc::new(telegram))
        }
        None => {
            info!("telegram channel skipped (no bot_token configured)");
            None
        }
    };

    replay_pending(&store, &router, channel.as_deref()).await?;

    let schedules = parse_schedules(&config)?;
    if !schedules.is_empty() {
        info!(count = schedules.len(), "schedules loaded");
    }

    let cancel = install_signal_handler();
    event_loop(&config, &store, &router, channel.clone(), &schedules, cancel).await;

    router.shutdown().await;
    if let Some(channel) = &channel {
        if let Err(e) = PluginAdapter::shutdown(channel.as_ref()).await {
            warn!(error = %e, "telegram shutdown failed");
        }
    }
    PluginAdapter::shutdown(store.as_ref()).await?;

    info!("corral serve shutdown complete");
    Ok(())
}

async fn event_loop(
    config: &CorralConfig,
    store: &Arc<RelayStore>,
    router: &Arc<Router>,
    channel: Option<Arc<TelegramChannel>>,
    schedules: &[(ScheduleEntry, Cron)],
    cancel: CancellationToken,
) {
    let mut cleanup = tokio::time::interval(Duration::from_secs(
        config.retention.interval_minutes * 60,
    ));
    cleanup.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut schedule_tick = tokio::time::interval(Duration::from_secs(SCHEDULE_TICK_SECS));
    schedule_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_schedule_check = Local::now();

    loop {
        tokio::select! {
            event = next_event(channel.as_deref()) => match event {
                Ok(event) => dispatch_event(router, channel.clone(), event),
                Err(e) => {
                    error!(error = %e, "channel receive failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            },
            _ = cleanup.tick() => {
                match store
                    .cleanup_stale_data(
                        config.retention.hot_hours,
                        config.retention.cold_days,
                        config.retention.expired_days,
                    )
                    .await
                {
                    Ok(counts) => debug!(removed = counts.total(), "retention cleanup pass"),
                    Err(e) => warn!(error = %e, "retention cleanup failed"),
                }
            }
            _ = schedule_tick.tick() => {
                let now = Local::now();
                for (entry, cron) in schedules {
                    if schedule_due(cron, &last_schedule_check, &now) {
                        info!(
                            project = %entry.project,
                            workflow = %entry.workflow,
                            "schedule fired"
                        );
                        let router = Arc::clone(router);
                        let entry = entry.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                router.run_workflow(&entry.project, &entry.workflow).await
                            {
                                warn!(
                                    error = %e,
                                    project = %entry.project,
                                    "scheduled workflow failed"
                                );
                            }
                        });
                    }
                }
                last_schedule_check = now;
            }
            _ = cancel.cancelled() => {
                info!("shutdown signal received");
                break;
            }
        }
    }
}

/// Handle one inbound event off the loop. Events are processed
/// concurrently so `cancel` commands stay responsive during long runs;
/// agent executions themselves are still serialized per project by the
/// pool.
fn dispatch_event(
    router: &Arc<Router>,
    channel: Option<Arc<TelegramChannel>>,
    event: InboundEvent,
) {
    let router = Arc::clone(router);
    tokio::spawn(async move {
        match event {
            InboundEvent::Message(msg) => {
                if let Some(reply) = router.handle_message(&msg).await {
                    deliver(channel.as_deref(), reply).await;
                }
            }
            InboundEvent::Reaction(signal) => router.handle_reaction(&signal).await,
        }
    });
}

async fn deliver(channel: Option<&TelegramChannel>, reply: OutboundMessage) {
    let Some(channel) = channel else { return };
    if let Err(e) = channel.send(reply).await {
        error!(error = %e, "reply delivery failed");
    }
}

async fn next_event(channel: Option<&TelegramChannel>) -> Result<InboundEvent, CorralError> {
    match channel {
        Some(channel) => channel.receive().await,
        None => std::future::pending().await,
    }
}

/// Replay messages that were accepted but not finished before a restart.
async fn replay_pending(
    store: &Arc<RelayStore>,
    router: &Arc<Router>,
    channel: Option<&TelegramChannel>,
) -> Result<(), CorralError> {
    let pending = store.get_pending_messages(RECOVERY_WINDOW_MINUTES).await?;
    if pending.is_empty() {
        return Ok(());
    }
    info!(count = pending.len(), "replaying pending messages from before restart");
    for record in pending {
        // The replay writes its own pending row; retire the original first
        // so it cannot be replayed twice.
        store.mark_pending(record.id, PendingStatus::Done).await?;
        let msg = inbound_from_pending(&record);
        if let Some(reply) = router.handle_message(&msg).await {
            deliver(channel, reply).await;
        }
    }
    Ok(())
}

fn inbound_from_pending(record: &PendingMessage) -> InboundMessage {
    InboundMessage {
        platform: record.platform,
        channel_id: record.channel_id.clone(),
        conversation_id: record.conversation_id.clone(),
        message_id: uuid::Uuid::new_v4().to_string(),
        user_id: record.user_id.clone(),
        user_name: record.user_name.clone(),
        text: record.text.clone(),
        timestamp: record.received_at,
    }
}

fn parse_schedules(config: &CorralConfig) -> Result<Vec<(ScheduleEntry, Cron)>, CorralError> {
    config
        .schedules
        .iter()
        .map(|entry| {
            let cron: Cron = entry.cron.parse().map_err(|e| {
                CorralError::Config(format!(
                    "schedule '{}/{}': invalid cron expression: {e}",
                    entry.project, entry.workflow
                ))
            })?;
            Ok((entry.clone(), cron))
        })
        .collect()
}

/// A schedule is due when its next occurrence after the previous check has
/// already passed.
fn schedule_due(cron: &Cron, last: &DateTime<Local>, now: &DateTime<Local>) -> bool {
    match cron.find_next_occurrence(last, false) {
        Ok(next) => next <= *now,
        Err(_) => false,
    }
}

fn install_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    token.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => info!("SIGINT received"),
                _ = sigterm.recv() => info!("SIGTERM received"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("interrupt received");
        }
        token.cancel();
    });
    cancel
}
