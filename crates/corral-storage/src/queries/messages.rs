// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation message cache operations.

use chrono::{DateTime, Utc};
use corral_core::CorralError;
use rusqlite::params;

use crate::database::Database;
use crate::models::{CachedMessage, Platform, enum_from_db, ts_from_db, ts_to_db};

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<CachedMessage, rusqlite::Error> {
    Ok(CachedMessage {
        platform: enum_from_db::<Platform>(0, row.get(0)?)?,
        channel_id: row.get(1)?,
        conversation_id: row.get(2)?,
        message_id: row.get(3)?,
        user_id: row.get(4)?,
        user_name: row.get(5)?,
        text: row.get(6)?,
        is_bot: row.get(7)?,
        timestamp: ts_from_db(8, row.get(8)?)?,
    })
}

/// Cache one conversation message. Re-caching the same message id is a
/// no-op overwrite, so platform redeliveries are harmless.
pub async fn cache_message(db: &Database, msg: &CachedMessage) -> Result<(), CorralError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO messages
                 (platform, channel_id, conversation_id, message_id,
                  user_id, user_name, text, is_bot, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    msg.platform.to_string(),
                    msg.channel_id,
                    msg.conversation_id,
                    msg.message_id,
                    msg.user_id,
                    msg.user_name,
                    msg.text,
                    msg.is_bot,
                    ts_to_db(&msg.timestamp),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch the most recent `limit` messages of one thread, in chronological
/// order. `after_ts` restricts to messages strictly newer than the given
/// instant (used for conversation epochs).
pub async fn get_cached_messages(
    db: &Database,
    platform: Platform,
    channel_id: &str,
    conversation_id: &str,
    limit: usize,
    after_ts: Option<DateTime<Utc>>,
) -> Result<Vec<CachedMessage>, CorralError> {
    let channel_id = channel_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let after = after_ts.map(|ts| ts_to_db(&ts)).unwrap_or_default();
            // Newest-first inner select bounded by limit, re-sorted ascending.
            let mut stmt = conn.prepare(
                "SELECT * FROM (
                     SELECT platform, channel_id, conversation_id, message_id,
                            user_id, user_name, text, is_bot, timestamp
                     FROM messages
                     WHERE platform = ?1 AND channel_id = ?2 AND conversation_id = ?3
                       AND timestamp > ?4
                     ORDER BY timestamp DESC LIMIT ?5
                 ) ORDER BY timestamp ASC",
            )?;
            let messages = stmt
                .query_map(
                    params![
                        platform.to_string(),
                        channel_id,
                        conversation_id,
                        after,
                        limit as i64,
                    ],
                    row_to_message,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Timestamp of the newest message in a thread, if any.
pub async fn latest_message_ts(
    db: &Database,
    platform: Platform,
    channel_id: &str,
    conversation_id: &str,
) -> Result<Option<DateTime<Utc>>, CorralError> {
    let channel_id = channel_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let result: Result<String, rusqlite::Error> = conn.query_row(
                "SELECT MAX(timestamp) FROM messages
                 WHERE platform = ?1 AND channel_id = ?2 AND conversation_id = ?3",
                params![platform.to_string(), channel_id, conversation_id],
                |row| row.get(0),
            );
            match result {
                Ok(raw) => Ok(Some(ts_from_db(0, raw)?)),
                Err(rusqlite::Error::QueryReturnedNoRows)
                | Err(rusqlite::Error::InvalidColumnType(..)) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set (or move forward) the conversation epoch. Context assembly ignores
/// history older than the epoch; nothing is deleted.
pub async fn set_conversation_epoch(
    db: &Database,
    platform: Platform,
    channel_id: &str,
    conversation_id: &str,
    epoch_at: DateTime<Utc>,
) -> Result<(), CorralError> {
    let channel_id = channel_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversation_epochs
                 (platform, channel_id, conversation_id, epoch_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (platform, channel_id, conversation_id)
                 DO UPDATE SET epoch_at = excluded.epoch_at",
                params![
                    platform.to_string(),
                    channel_id,
                    conversation_id,
                    ts_to_db(&epoch_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The conversation epoch for a thread, if one has been set.
pub async fn get_conversation_epoch(
    db: &Database,
    platform: Platform,
    channel_id: &str,
    conversation_id: &str,
) -> Result<Option<DateTime<Utc>>, CorralError> {
    let channel_id = channel_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let result: Result<String, rusqlite::Error> = conn.query_row(
                "SELECT epoch_at FROM conversation_epochs
                 WHERE platform = ?1 AND channel_id = ?2 AND conversation_id = ?3",
                params![platform.to_string(), channel_id, conversation_id],
                |row| row.get(0),
            );
            match result {
                Ok(raw) => Ok(Some(ts_from_db(0, raw)?)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}
