// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel -> project binding CRUD.

use corral_core::CorralError;
use rusqlite::params;

use crate::database::Database;
use crate::models::{Binding, Platform, enum_from_db, ts_from_db, ts_to_db};

fn row_to_binding(row: &rusqlite::Row<'_>) -> Result<Binding, rusqlite::Error> {
    Ok(Binding {
        platform: enum_from_db::<Platform>(0, row.get(0)?)?,
        channel_id: row.get(1)?,
        project: row.get(2)?,
        bound_by: row.get(3)?,
        bound_at: ts_from_db(4, row.get(4)?)?,
    })
}

/// Create or overwrite the binding for `(platform, channel_id)`.
///
/// Rebinds are overwritten, not versioned.
pub async fn bind_channel(db: &Database, binding: &Binding) -> Result<(), CorralError> {
    let binding = binding.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO bindings (platform, channel_id, project, bound_by, bound_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (platform, channel_id) DO UPDATE SET
                     project = excluded.project,
                     bound_by = excluded.bound_by,
                     bound_at = excluded.bound_at",
                params![
                    binding.platform.to_string(),
                    binding.channel_id,
                    binding.project,
                    binding.bound_by,
                    ts_to_db(&binding.bound_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Remove the binding for `(platform, channel_id)`. Returns whether a
/// binding existed.
pub async fn unbind_channel(
    db: &Database,
    platform: Platform,
    channel_id: &str,
) -> Result<bool, CorralError> {
    let channel_id = channel_id.to_string();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM bindings WHERE platform = ?1 AND channel_id = ?2",
                params![platform.to_string(), channel_id],
            )?;
            Ok(deleted > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Resolve the binding for `(platform, channel_id)`, if any.
pub async fn get_binding(
    db: &Database,
    platform: Platform,
    channel_id: &str,
) -> Result<Option<Binding>, CorralError> {
    let channel_id = channel_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT platform, channel_id, project, bound_by, bound_at
                 FROM bindings WHERE platform = ?1 AND channel_id = ?2",
            )?;
            let result = stmt.query_row(params![platform.to_string(), channel_id], row_to_binding);
            match result {
                Ok(binding) => Ok(Some(binding)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List all bindings, ordered by project then channel.
pub async fn list_bindings(db: &Database) -> Result<Vec<Binding>, CorralError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT platform, channel_id, project, bound_by, bound_at
                 FROM bindings ORDER BY project, platform, channel_id",
            )?;
            let bindings = stmt
                .query_map([], row_to_binding)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(bindings)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
