// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write-ahead pending message log.
//!
//! Every inbound message is written here before any processing starts.
//! On startup, non-terminal rows younger than the recovery window are
//! re-dispatched; older ones are marked failed.

use chrono::{Duration, Utc};
use corral_core::CorralError;
use rusqlite::params;

use crate::database::Database;
use crate::models::{
    InboundMessage, PendingMessage, PendingStatus, Platform, enum_from_db, ts_from_db, ts_to_db,
};

fn row_to_pending(row: &rusqlite::Row<'_>) -> Result<PendingMessage, rusqlite::Error> {
    Ok(PendingMessage {
        id: row.get(0)?,
        platform: enum_from_db::<Platform>(1, row.get(1)?)?,
        channel_id: row.get(2)?,
        conversation_id: row.get(3)?,
        user_id: row.get(4)?,
        user_name: row.get(5)?,
        text: row.get(6)?,
        received_at: ts_from_db(7, row.get(7)?)?,
        status: enum_from_db::<PendingStatus>(8, row.get(8)?)?,
    })
}

/// Record an inbound message before processing. Returns the assigned row id.
pub async fn write_pending_message(
    db: &Database,
    msg: &InboundMessage,
) -> Result<i64, CorralError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO pending_messages
                 (platform, channel_id, conversation_id, user_id, user_name,
                  text, received_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending')",
                params![
                    msg.platform.to_string(),
                    msg.channel_id,
                    msg.conversation_id,
                    msg.user_id,
                    msg.user_name,
                    msg.text,
                    ts_to_db(&msg.timestamp),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Advance a pending message to a new status.
pub async fn mark_pending(
    db: &Database,
    id: i64,
    status: PendingStatus,
) -> Result<(), CorralError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE pending_messages SET status = ?1 WHERE id = ?2",
                params![status.to_string(), id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Non-terminal messages younger than `max_age_minutes`, oldest first.
/// Used for crash recovery on startup.
pub async fn get_pending_messages(
    db: &Database,
    max_age_minutes: i64,
) -> Result<Vec<PendingMessage>, CorralError> {
    let cutoff = ts_to_db(&(Utc::now() - Duration::minutes(max_age_minutes)));
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, platform, channel_id, conversation_id, user_id,
                        user_name, text, received_at, status
                 FROM pending_messages
                 WHERE status IN ('pending', 'processing') AND received_at >= ?1
                 ORDER BY received_at ASC",
            )?;
            let pending = stmt
                .query_map(params![cutoff], row_to_pending)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(pending)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark non-terminal messages older than `max_age_minutes` as failed.
/// Returns how many rows were abandoned.
pub async fn abandon_stale_pending(
    db: &Database,
    max_age_minutes: i64,
) -> Result<usize, CorralError> {
    let cutoff = ts_to_db(&(Utc::now() - Duration::minutes(max_age_minutes)));
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE pending_messages SET status = 'failed'
                 WHERE status IN ('pending', 'processing') AND received_at < ?1",
                params![cutoff],
            )?;
            Ok(changed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
