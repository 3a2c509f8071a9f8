// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-tiered retention.
//!
//! Messages age through three bands: hot (kept in full), cold (thinned to
//! the 10 most recent per thread), and expired (deleted). Terminal pending
//! rows and old completed runs are swept in the same transaction.

use chrono::{Duration, Utc};
use corral_core::CorralError;
use rusqlite::params;
use tracing::info;

use crate::database::Database;
use crate::models::ts_to_db;

/// Number of messages kept per thread inside the cold band.
const COLD_KEEP_PER_THREAD: i64 = 10;

/// Rows removed by one retention pass, per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupCounts {
    pub expired_messages: usize,
    pub thinned_messages: usize,
    pub pending_rows: usize,
    pub run_rows: usize,
}

impl CleanupCounts {
    pub fn total(&self) -> usize {
        self.expired_messages + self.thinned_messages + self.pending_rows + self.run_rows
    }
}

/// Run one retention pass. All deletes happen in a single transaction so a
/// crash mid-pass never leaves a half-swept band.
pub async fn cleanup_stale_data(
    db: &Database,
    hot_hours: i64,
    cold_days: i64,
    expired_days: i64,
) -> Result<CleanupCounts, CorralError> {
    let now = Utc::now();
    let hot_cutoff = ts_to_db(&(now - Duration::hours(hot_hours)));
    let cold_cutoff = ts_to_db(&(now - Duration::days(cold_days)));
    let expired_cutoff = ts_to_db(&(now - Duration::days(expired_days)));

    let counts = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            // Expired band: delete outright.
            let expired_messages = tx.execute(
                "DELETE FROM messages WHERE timestamp < ?1",
                params![expired_cutoff],
            )?;

            // Cold band: keep only the most recent N per thread.
            let thinned_messages = tx.execute(
                "DELETE FROM messages WHERE rowid IN (
                     SELECT rowid FROM (
                         SELECT rowid,
                                ROW_NUMBER() OVER (
                                    PARTITION BY platform, channel_id, conversation_id
                                    ORDER BY timestamp DESC
                                ) AS rn
                         FROM messages
                         WHERE timestamp < ?1
                     ) WHERE rn > ?2
                 )",
                params![cold_cutoff, COLD_KEEP_PER_THREAD],
            )?;

            // Terminal pending rows older than the hot cutoff.
            let pending_rows = tx.execute(
                "DELETE FROM pending_messages
                 WHERE status IN ('done', 'failed') AND received_at < ?1",
                params![hot_cutoff],
            )?;

            // Finished runs past the expiry horizon. Running rows are never
            // swept; a stuck run is an operator problem, not garbage.
            let run_rows = tx.execute(
                "DELETE FROM relay_runs
                 WHERE status != 'running' AND started_at < ?1",
                params![expired_cutoff],
            )?;

            tx.commit()?;
            Ok(CleanupCounts {
                expired_messages,
                thinned_messages,
                pending_rows,
                run_rows,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if counts.total() > 0 {
        info!(
            expired = counts.expired_messages,
            thinned = counts.thinned_messages,
            pending = counts.pending_rows,
            runs = counts.run_rows,
            "retention pass removed rows"
        );
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CachedMessage, InboundMessage, PendingStatus, Platform, RelayRun, RunStatus};
    use crate::queries::{messages, pending, runs};
    use chrono::{DateTime, Utc};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn msg_at(conv: &str, id: &str, ts: DateTime<Utc>) -> CachedMessage {
        CachedMessage {
            platform: Platform::Telegram,
            channel_id: "chan".to_string(),
            conversation_id: conv.to_string(),
            message_id: id.to_string(),
            user_id: "u1".to_string(),
            user_name: "alice".to_string(),
            text: format!("msg {id}"),
            is_bot: false,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn hot_band_is_untouched() {
        let (db, _dir) = setup_db().await;

        for i in 0..20 {
            let ts = Utc::now() - Duration::minutes(i);
            messages::cache_message(&db, &msg_at("conv", &format!("m{i}"), ts))
                .await
                .unwrap();
        }

        let counts = cleanup_stale_data(&db, 24, 7, 30).await.unwrap();
        assert_eq!(counts, CleanupCounts::default());

        let kept = messages::get_cached_messages(&db, Platform::Telegram, "chan", "conv", 100, None)
            .await
            .unwrap();
        assert_eq!(kept.len(), 20);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cold_band_thins_to_ten_per_thread() {
        let (db, _dir) = setup_db().await;

        // 15 cold messages in one thread, 3 in another.
        for i in 0..15 {
            let ts = Utc::now() - Duration::days(10) - Duration::minutes(i);
            messages::cache_message(&db, &msg_at("busy", &format!("b{i}"), ts))
                .await
                .unwrap();
        }
        for i in 0..3 {
            let ts = Utc::now() - Duration::days(10) - Duration::minutes(i);
            messages::cache_message(&db, &msg_at("quiet", &format!("q{i}"), ts))
                .await
                .unwrap();
        }

        let counts = cleanup_stale_data(&db, 24, 7, 30).await.unwrap();
        assert_eq!(counts.thinned_messages, 5);
        assert_eq!(counts.expired_messages, 0);

        let busy = messages::get_cached_messages(&db, Platform::Telegram, "chan", "busy", 100, None)
            .await
            .unwrap();
        assert_eq!(busy.len(), 10);
        // The newest cold messages survive the thinning.
        assert_eq!(busy.last().unwrap().message_id, "b0");

        let quiet =
            messages::get_cached_messages(&db, Platform::Telegram, "chan", "quiet", 100, None)
                .await
                .unwrap();
        assert_eq!(quiet.len(), 3);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_band_deletes_everything() {
        let (db, _dir) = setup_db().await;

        for i in 0..12 {
            let ts = Utc::now() - Duration::days(40) - Duration::minutes(i);
            messages::cache_message(&db, &msg_at("conv", &format!("m{i}"), ts))
                .await
                .unwrap();
        }

        let counts = cleanup_stale_data(&db, 24, 7, 30).await.unwrap();
        // Past expired_days, even the 10-per-thread floor does not apply.
        assert_eq!(counts.expired_messages, 12);

        let kept = messages::get_cached_messages(&db, Platform::Telegram, "chan", "conv", 100, None)
            .await
            .unwrap();
        assert!(kept.is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn bands_age_independently() {
        let (db, _dir) = setup_db().await;

        // One thread per band: hot survives in full, a cold thread under
        // the per-thread floor is left alone, expired goes entirely.
        for i in 0..15 {
            let ts = Utc::now() - Duration::days(2) - Duration::minutes(i);
            messages::cache_message(&db, &msg_at("hot", &format!("h{i}"), ts))
                .await
                .unwrap();
        }
        for i in 0..5 {
            let ts = Utc::now() - Duration::days(10) - Duration::minutes(i);
            messages::cache_message(&db, &msg_at("cold", &format!("c{i}"), ts))
                .await
                .unwrap();
        }
        for i in 0..3 {
            let ts = Utc::now() - Duration::days(40) - Duration::minutes(i);
            messages::cache_message(&db, &msg_at("old", &format!("o{i}"), ts))
                .await
                .unwrap();
        }

        let counts = cleanup_stale_data(&db, 1, 7, 30).await.unwrap();
        assert_eq!(counts.expired_messages, 3);
        assert_eq!(counts.thinned_messages, 0);

        let hot = messages::get_cached_messages(&db, Platform::Telegram, "chan", "hot", 100, None)
            .await
            .unwrap();
        assert_eq!(hot.len(), 15);
        let cold = messages::get_cached_messages(&db, Platform::Telegram, "chan", "cold", 100, None)
            .await
            .unwrap();
        assert_eq!(cold.len(), 5);
        let old = messages::get_cached_messages(&db, Platform::Telegram, "chan", "old", 100, None)
            .await
            .unwrap();
        assert!(old.is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn terminal_pending_rows_are_swept() {
        let (db, _dir) = setup_db().await;

        let old = InboundMessage {
            platform: Platform::Telegram,
            channel_id: "chan".to_string(),
            conversation_id: "conv".to_string(),
            message_id: "m1".to_string(),
            user_id: "u1".to_string(),
            user_name: "alice".to_string(),
            text: "old".to_string(),
            timestamp: Utc::now() - Duration::hours(48),
        };
        let id_done = pending::write_pending_message(&db, &old).await.unwrap();
        let id_stuck = pending::write_pending_message(&db, &old).await.unwrap();
        pending::mark_pending(&db, id_done, PendingStatus::Done).await.unwrap();
        pending::mark_pending(&db, id_stuck, PendingStatus::Processing)
            .await
            .unwrap();

        let counts = cleanup_stale_data(&db, 24, 7, 30).await.unwrap();
        assert_eq!(counts.pending_rows, 1);

        // The non-terminal row survives even though it is old.
        let remaining = pending::get_pending_messages(&db, 60 * 24 * 365).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, id_stuck);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn old_finished_runs_are_purged_but_running_kept() {
        let (db, _dir) = setup_db().await;

        let mut ancient_done = RelayRun {
            id: "done".to_string(),
            platform: Platform::Telegram,
            channel_id: "chan".to_string(),
            conversation_id: "conv".to_string(),
            project: "demo".to_string(),
            user_id: "u1".to_string(),
            started_at: Utc::now() - Duration::days(60),
            completed_at: Some(Utc::now() - Duration::days(60)),
            status: RunStatus::Complete,
            cost_usd: 0.1,
            input_tokens: 1,
            output_tokens: 1,
            duration_ms: 100,
            model: None,
        };
        runs::record_relay_run(&db, &ancient_done).await.unwrap();

        ancient_done.id = "stuck".to_string();
        ancient_done.status = RunStatus::Running;
        ancient_done.completed_at = None;
        runs::record_relay_run(&db, &ancient_done).await.unwrap();

        let counts = cleanup_stale_data(&db, 24, 7, 30).await.unwrap();
        assert_eq!(counts.run_rows, 1);
        assert!(runs::get_relay_run(&db, "done").await.unwrap().is_none());
        assert!(runs::get_relay_run(&db, "stuck").await.unwrap().is_some());

        db.close().await.unwrap();
    }
}
