// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run-completion notification fan-out.
//!
//! One task per destination, joined at the end. Delivery failures are
//! retried with exponential backoff; terminal failures go to the
//! dead-letter log. A notification failure never fails the run itself.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use corral_config::model::{NotifyConfig, WebhookDestination};
use corral_core::CorralError;
use corral_core::types::{RelayRun, RunStatus};
use corral_security::validate_webhook_url;

use crate::dead_letter::DeadLetterLog;

/// Notification dispatcher for completed runs.
pub struct Notifier {
    config: NotifyConfig,
    client: reqwest::Client,
    dead_letters: DeadLetterLog,
    /// Skips URL safety validation; test servers listen on loopback HTTP.
    #[cfg(test)]
    skip_url_validation: bool,
}

impl Notifier {
    pub fn new(config: NotifyConfig) -> Result<Self, CorralError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CorralError::Notify {
                message: "failed to build http client".to_string(),
                source: Some(Box::new(e)),
            })?;
        let dead_letters = DeadLetterLog::new(&config.dead_letter_path);
        Ok(Self {
            config,
            client,
            dead_letters,
            #[cfg(test)]
            skip_url_validation: false,
        })
    }

    #[cfg(test)]
    fn unvalidated(config: NotifyConfig) -> Self {
        let mut notifier = Self::new(config).unwrap();
        notifier.skip_url_validation = true;
        notifier
    }

    /// Access to the dead-letter log, for status reporting.
    pub fn dead_letters(&self) -> &DeadLetterLog {
        &self.dead_letters
    }

    /// Fan out a completed run to every matching destination. Always
    /// returns; failures are dead-lettered, not propagated.
    pub async fn notify(self: &Arc<Self>, run: &RelayRun) {
        let event = match run.status {
            RunStatus::Complete => {
                if !self.config.on_complete {
                    debug!(run_id = %run.id, "completion notifications disabled");
                    return;
                }
                "run.complete"
            }
            RunStatus::Failed | RunStatus::Cancelled => {
                if !self.config.on_failure {
                    debug!(run_id = %run.id, "failure notifications disabled");
                    return;
                }
                "run.failed"
            }
            RunStatus::Running => return,
        };

        let destinations: Vec<WebhookDestination> = self
            .config
            .webhooks
            .iter()
            .filter(|dest| {
                dest.project
                    .as_ref()
                    .map(|p| *p == run.project)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        if destinations.is_empty() {
            return;
        }

        let payload = run_payload(event, run);
        let tasks = destinations.into_iter().map(|dest| {
            let notifier = Arc::clone(self);
            let payload = payload.clone();
            tokio::spawn(async move {
                notifier.deliver(&dest, payload).await;
            })
        });
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "notification task panicked");
            }
        }
    }

    /// Deliver one payload to one destination, retrying retryable failures.
    async fn deliver(&self, dest: &WebhookDestination, payload: serde_json::Value) {
        #[cfg(test)]
        let validate = !self.skip_url_validation;
        #[cfg(not(test))]
        let validate = true;

        if validate && let Err(e) = validate_webhook_url(&dest.url) {
            // Unsafe URLs never get a network attempt.
            let _ = self
                .dead_letters
                .record(&dest.url, "webhook", &e.to_string(), payload);
            return;
        }

        let mut last_error = String::new();
        for attempt in 1..=self.config.retry_limit {
            match self.client.post(&dest.url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(url = %dest.url, attempt, "notification delivered");
                    return;
                }
                Ok(response) => {
                    let status = response.status();
                    last_error = format!("HTTP {status}");
                    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                        // A 4xx will not get better on retry.
                        break;
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
            if attempt < self.config.retry_limit {
                let backoff = self.config.backoff_base_ms * 2u64.pow(attempt - 1);
                debug!(url = %dest.url, attempt, backoff_ms = backoff, error = %last_error, "retrying notification");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }

        let _ = self
            .dead_letters
            .record(&dest.url, "webhook", &last_error, payload);
    }
}

fn run_payload(event: &str, run: &RelayRun) -> serde_json::Value {
    serde_json::json!({
        "event": event,
        "run_id": run.id,
        "project": run.project,
        "platform": run.platform,
        "status": run.status,
        "cost_usd": run.cost_usd,
        "duration_ms": run.duration_ms,
        "started_at": run.started_at,
        "completed_at": run.completed_at,
    })
}
