// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! High-level store facade.
//!
//! Wraps a [`Database`] handle and delegates to the typed query modules.
//! The database is lazily opened on the first call to [`RelayStore::initialize`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use corral_config::model::StorageConfig;
use corral_core::types::HealthStatus;
use corral_core::{CorralError, PluginAdapter};

use crate::database::Database;
use crate::models::{Binding, CachedMessage, InboundMessage, PendingMessage, PendingStatus,
    Platform, RelayRun};
use crate::queries;
use crate::queries::cleanup::CleanupCounts;
use crate::queries::runs::{CostSummary, RunUpdate};

/// SQLite-backed relay store.
pub struct RelayStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl RelayStore {
    /// Create a store with the given configuration. The database connection
    /// is not opened until [`initialize`](RelayStore::initialize) is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Open the database and run migrations.
    pub async fn initialize(&self) -> Result<(), CorralError> {
        let db = Database::open(&self.config.database_path).await?;
        self.db.set(db).map_err(|_| CorralError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "relay store initialized");
        Ok(())
    }

    fn db(&self) -> Result<&Database, CorralError> {
        self.db.get().ok_or_else(|| CorralError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    // --- Bindings ---

    pub async fn bind_channel(&self, binding: &Binding) -> Result<(), CorralError> {
        queries::bindings::bind_channel(self.db()?, binding).await
    }

    pub async fn unbind_channel(
        &self,
        platform: Platform,
        channel_id: &str,
    ) -> Result<bool, CorralError> {
        queries::bindings::unbind_channel(self.db()?, platform, channel_id).await
    }

    pub async fn get_binding(
        &self,
        platform: Platform,
        channel_id: &str,
    ) -> Result<Option<Binding>, CorralError> {
        queries::bindings::get_binding(self.db()?, platform, channel_id).await
    }

    pub async fn list_bindings(&self) -> Result<Vec<Binding>, CorralError> {
        queries::bindings::list_bindings(self.db()?).await
    }

    // --- Message cache ---

    pub async fn cache_message(&self, msg: &CachedMessage) -> Result<(), CorralError> {
        queries::messages::cache_message(self.db()?, msg).await
    }

    pub async fn get_cached_messages(
        &self,
        platform: Platform,
        channel_id: &str,
        conversation_id: &str,
        limit: usize,
        after_ts: Option<DateTime<Utc>>,
    ) -> Result<Vec<CachedMessage>, CorralError> {
        queries::messages::get_cached_messages(
            self.db()?,
            platform,
            channel_id,
            conversation_id,
            limit,
            after_ts,
        )
        .await
    }

    pub async fn latest_message_ts(
        &self,
        platform: Platform,
        channel_id: &str,
        conversation_id: &str,
    ) -> Result<Option<DateTime<Utc>>, CorralError> {
        queries::messages::latest_message_ts(self.db()?, platform, channel_id, conversation_id)
            .await
    }

    pub async fn set_conversation_epoch(
        &self,
        platform: Platform,
        channel_id: &str,
        conversation_id: &str,
        epoch_at: DateTime<Utc>,
    ) -> Result<(), CorralError> {
        queries::messages::set_conversation_epoch(
            self.db()?,
            platform,
            channel_id,
            conversation_id,
            epoch_at,
        )
        .await
    }

    pub async fn get_conversation_epoch(
        &self,
        platform: Platform,
        channel_id: &str,
        conversation_id: &str,
    ) -> Result<Option<DateTime<Utc>>, CorralError> {
        queries::messages::get_conversation_epoch(self.db()?, platform, channel_id, conversation_id)
            .await
    }

    // --- Pending write-ahead log ---

    pub async fn write_pending_message(&self, msg: &InboundMessage) -> Result<i64, CorralError> {
        queries::pending::write_pending_message(self.db()?, msg).await
    }

    pub async fn mark_pending(&self, id: i64, status: PendingStatus) -> Result<(), CorralError> {
        queries::pending::mark_pending(self.db()?, id, status).await
    }

    pub async fn get_pending_messages(
        &self,
        max_age_minutes: i64,
    ) -> Result<Vec<PendingMessage>, CorralError> {
        queries::pending::get_pending_messages(self.db()?, max_age_minutes).await
    }

    pub async fn abandon_stale_pending(&self, max_age_minutes: i64) -> Result<usize, CorralError> {
        queries::pending::abandon_stale_pending(self.db()?, max_age_minutes).await
    }

    // --- Run accounting ---

    pub async fn record_relay_run(&self, run: &RelayRun) -> Result<(), CorralError> {
        queries::runs::record_relay_run(self.db()?, run).await
    }

    pub async fn update_relay_run(&self, id: &str, update: RunUpdate) -> Result<(), CorralError> {
        queries::runs::update_relay_run(self.db()?, id, update).await
    }

    pub async fn get_relay_run(&self, id: &str) -> Result<Option<RelayRun>, CorralError> {
        queries::runs::get_relay_run(self.db()?, id).await
    }

    pub async fn latest_run_for_thread(
        &self,
        platform: Platform,
        channel_id: &str,
        conversation_id: &str,
    ) -> Result<Option<RelayRun>, CorralError> {
        queries::runs::latest_run_for_thread(self.db()?, platform, channel_id, conversation_id)
            .await
    }

    pub async fn cost_summary(
        &self,
        project: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<CostSummary, CorralError> {
        queries::runs::cost_summary(self.db()?, project, since).await
    }

    // --- Retention ---

    pub async fn cleanup_stale_data(
        &self,
        hot_hours: i64,
        cold_days: i64,
        expired_days: i64,
    ) -> Result<CleanupCounts, CorralError> {
        queries::cleanup::cleanup_stale_data(self.db()?, hot_hours, cold_days, expired_days).await
    }
}

#[async_trait]
impl PluginAdapter for RelayStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, CorralError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CorralError> {
        if let Some(db) = self.db.get() {
            db.close().await?;
            debug!("relay store shut down");
        }
        Ok(())
    }
}
