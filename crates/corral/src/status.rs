// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `corral status` command implementation.
//!
//! Reports the cross-process observable relay state: channel bindings from
//! the store, per-project run locks from the lock directory, and run
//! totals over the last 24 hours. Pool queue depths live inside the serve
//! process and are reported there by the `status` chat command instead.

use chrono::Utc;

use corral_config::CorralConfig;
use corral_core::CorralError;
use corral_pool::RunLock;
use corral_storage::RelayStore;

/// Runs the `corral status` command.
pub async fn run_status(config: &CorralConfig) -> Result<(), CorralError> {
    let store = RelayStore::new(config.storage.clone());
    store.initialize().await?;

    let bindings = store.list_bindings().await?;
    if bindings.is_empty() {
        println!("No channels are bound.");
    } else {
        println!("Bindings:");
        for binding in &bindings {
            println!(
                "  {} {} -> {} (bound by {} at {})",
                binding.platform,
                binding.channel_id,
                binding.project,
                binding.bound_by,
                binding.bound_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
    }

    if !config.projects.is_empty() {
        let lock = RunLock::new(&config.lock);
        let mut names: Vec<&String> = config.projects.keys().collect();
        names.sort();
        println!("Projects:");
        for name in names {
            let state = if lock.is_locked(name) { "running" } else { "idle" };
            println!("  {name}: {state}");
        }
    }

    let since = Utc::now() - chrono::Duration::hours(24);
    let summary = store.cost_summary(None, since).await?;
    println!(
        "Last 24h: {} runs, ${:.4}, {} tokens in / {} tokens out",
        summary.run_count,
        summary.total_cost_usd,
        summary.total_input_tokens,
        summary.total_output_tokens
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::Utc;
    use tempfile::TempDir;

    use corral_config::model::ProjectEntry;
    use corral_core::types::{Binding, Platform};

    #[tokio::test]
    async fn status_runs_against_a_populated_store() {
        let dir = TempDir::new().unwrap();
        let mut config = CorralConfig::default();
        config.storage.database_path = dir
            .path()
            .join("relay.db")
            .to_string_lossy()
            .into_owned();
        config.lock.lock_dir = dir.path().join("locks").to_string_lossy().into_owned();
        config.projects.insert(
            "demo".to_string(),
            ProjectEntry {
                path: dir.path().join("demo").to_string_lossy().into_owned(),
                env: HashMap::new(),
            },
        );

        let store = RelayStore::new(config.storage.clone());
        store.initialize().await.unwrap();
        store
            .bind_channel(&Binding {
                platform: Platform::Telegram,
                channel_id: "42".to_string(),
                project: "demo".to_string(),
                bound_by: "admin".to_string(),
                bound_at: Utc::now(),
            })
            .await
            .unwrap();

        run_status(&config).await.unwrap();
    }

    #[tokio::test]
    async fn status_runs_against_an_empty_store() {
        let dir = TempDir::new().unwrap();
        let mut config = CorralConfig::default();
        config.storage.database_path = dir
            .path()
            .join("relay.db")
            .to_string_lossy()
            .into_owned();
        config.lock.lock_dir = dir.path().join("locks").to_string_lossy().into_owned();

        run_status(&config).await.unwrap();
    }
}
