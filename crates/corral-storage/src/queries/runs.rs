// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay run accounting.

use chrono::{DateTime, Utc};
use corral_core::CorralError;
use rusqlite::params;

use crate::database::Database;
use crate::models::{Platform, RelayRun, RunStatus, enum_from_db, ts_from_db, ts_to_db};

/// Fields of a run that become known after it starts. Unset fields leave
/// the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
    pub completed_at: Option<DateTime<Utc>>,
    pub status: Option<RunStatus>,
    pub cost_usd: Option<f64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub duration_ms: Option<u64>,
    pub model: Option<String>,
}

/// Aggregated spend over a set of runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostSummary {
    pub run_count: u64,
    pub total_cost_usd: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

fn row_to_run(row: &rusqlite::Row<'_>) -> Result<RelayRun, rusqlite::Error> {
    let completed_at: Option<String> = row.get(7)?;
    Ok(RelayRun {
        id: row.get(0)?,
        platform: enum_from_db::<Platform>(1, row.get(1)?)?,
        channel_id: row.get(2)?,
        conversation_id: row.get(3)?,
        project: row.get(4)?,
        user_id: row.get(5)?,
        started_at: ts_from_db(6, row.get(6)?)?,
        completed_at: completed_at.map(|raw| ts_from_db(7, raw)).transpose()?,
        status: enum_from_db::<RunStatus>(8, row.get(8)?)?,
        cost_usd: row.get(9)?,
        input_tokens: row.get::<_, i64>(10)? as u64,
        output_tokens: row.get::<_, i64>(11)? as u64,
        duration_ms: row.get::<_, i64>(12)? as u64,
        model: row.get(13)?,
    })
}

/// Insert a newly started run.
pub async fn record_relay_run(db: &Database, run: &RelayRun) -> Result<(), CorralError> {
    let run = run.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO relay_runs
                 (id, platform, channel_id, conversation_id, project, user_id,
                  started_at, completed_at, status, cost_usd, input_tokens,
                  output_tokens, duration_ms, model)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    run.id,
                    run.platform.to_string(),
                    run.channel_id,
                    run.conversation_id,
                    run.project,
                    run.user_id,
                    ts_to_db(&run.started_at),
                    run.completed_at.as_ref().map(ts_to_db),
                    run.status.to_string(),
                    run.cost_usd,
                    run.input_tokens as i64,
                    run.output_tokens as i64,
                    run.duration_ms as i64,
                    run.model,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a partial update to an existing run.
pub async fn update_relay_run(
    db: &Database,
    id: &str,
    update: RunUpdate,
) -> Result<(), CorralError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE relay_runs SET
                     completed_at = COALESCE(?2, completed_at),
                     status = COALESCE(?3, status),
                     cost_usd = COALESCE(?4, cost_usd),
                     input_tokens = COALESCE(?5, input_tokens),
                     output_tokens = COALESCE(?6, output_tokens),
                     duration_ms = COALESCE(?7, duration_ms),
                     model = COALESCE(?8, model)
                 WHERE id = ?1",
                params![
                    id,
                    update.completed_at.as_ref().map(ts_to_db),
                    update.status.map(|s| s.to_string()),
                    update.cost_usd,
                    update.input_tokens.map(|t| t as i64),
                    update.output_tokens.map(|t| t as i64),
                    update.duration_ms.map(|t| t as i64),
                    update.model,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch one run by id.
pub async fn get_relay_run(db: &Database, id: &str) -> Result<Option<RelayRun>, CorralError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, platform, channel_id, conversation_id, project, user_id,
                        started_at, completed_at, status, cost_usd, input_tokens,
                        output_tokens, duration_ms, model
                 FROM relay_runs WHERE id = ?1",
            )?;
            let result = stmt.query_row(params![id], row_to_run);
            match result {
                Ok(run) => Ok(Some(run)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The most recent run for a thread, if any. Used by `/status` and `/cancel`.
pub async fn latest_run_for_thread(
    db: &Database,
    platform: Platform,
    channel_id: &str,
    conversation_id: &str,
) -> Result<Option<RelayRun>, CorralError> {
    let channel_id = channel_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, platform, channel_id, conversation_id, project, user_id,
                        started_at, completed_at, status, cost_usd, input_tokens,
                        output_tokens, duration_ms, model
                 FROM relay_runs
                 WHERE platform = ?1 AND channel_id = ?2 AND conversation_id = ?3
                 ORDER BY started_at DESC LIMIT 1",
            )?;
            let result = stmt.query_row(
                params![platform.to_string(), channel_id, conversation_id],
                row_to_run,
            );
            match result {
                Ok(run) => Ok(Some(run)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Aggregate spend since `since`, optionally restricted to one project.
pub async fn cost_summary(
    db: &Database,
    project: Option<&str>,
    since: DateTime<Utc>,
) -> Result<CostSummary, CorralError> {
    let project = project.map(str::to_string);
    let since = ts_to_db(&since);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(cost_usd), 0),
                        COALESCE(SUM(input_tokens), 0), COALESCE(SUM(output_tokens), 0)
                 FROM relay_runs
                 WHERE started_at >= ?1 AND (?2 IS NULL OR project = ?2)",
                params![since, project],
                |row| {
                    Ok(CostSummary {
                        run_count: row.get::<_, i64>(0)? as u64,
                        total_cost_usd: row.get(1)?,
                        total_input_tokens: row.get::<_, i64>(2)? as u64,
                        total_output_tokens: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_run(id: &str, project: &str, age_secs: i64) -> RelayRun {
        RelayRun {
            id: id.to_string(),
            platform: Platform::Telegram,
            channel_id: "chan".to_string(),
            conversation_id: "conv".to_string(),
            project: project.to_string(),
            user_id: "u1".to_string(),
            started_at: Utc::now() - Duration::seconds(age_secs),
            completed_at: None,
            status: RunStatus::Running,
            cost_usd: 0.0,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            model: None,
        }
    }

    #[tokio::test]
    async fn record_and_fetch() {
        let (db, _dir) = setup_db().await;

        record_relay_run(&db, &make_run("r1", "demo", 10)).await.unwrap();

        let run = get_relay_run(&db, "r1").await.unwrap().unwrap();
        assert_eq!(run.project, "demo");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());

        assert!(get_relay_run(&db, "missing").await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields() {
        let (db, _dir) = setup_db().await;

        record_relay_run(&db, &make_run("r1", "demo", 10)).await.unwrap();

        update_relay_run(
            &db,
            "r1",
            RunUpdate {
                cost_usd: Some(0.42),
                input_tokens: Some(1200),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let run = get_relay_run(&db, "r1").await.unwrap().unwrap();
        assert_eq!(run.cost_usd, 0.42);
        assert_eq!(run.input_tokens, 1200);
        // Untouched by the partial update.
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());

        let done = Utc::now();
        update_relay_run(
            &db,
            "r1",
            RunUpdate {
                completed_at: Some(done),
                status: Some(RunStatus::Complete),
                duration_ms: Some(5000),
                model: Some("sonnet".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let run = get_relay_run(&db, "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Complete);
        assert_eq!(run.cost_usd, 0.42);
        assert_eq!(run.model.as_deref(), Some("sonnet"));
        assert_eq!(
            run.completed_at.unwrap().timestamp_millis(),
            done.timestamp_millis()
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn latest_run_picks_newest() {
        let (db, _dir) = setup_db().await;

        record_relay_run(&db, &make_run("old", "demo", 100)).await.unwrap();
        record_relay_run(&db, &make_run("new", "demo", 10)).await.unwrap();

        let run = latest_run_for_thread(&db, Platform::Telegram, "chan", "conv")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.id, "new");

        let none = latest_run_for_thread(&db, Platform::Telegram, "chan", "other")
            .await
            .unwrap();
        assert!(none.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cost_summary_filters_by_project_and_window() {
        let (db, _dir) = setup_db().await;

        let mut a = make_run("a", "demo", 60);
        a.cost_usd = 0.10;
        a.input_tokens = 100;
        let mut b = make_run("b", "demo", 60);
        b.cost_usd = 0.20;
        b.output_tokens = 50;
        let mut c = make_run("c", "other", 60);
        c.cost_usd = 5.0;
        let mut old = make_run("old", "demo", 7200);
        old.cost_usd = 99.0;

        for run in [&a, &b, &c, &old] {
            record_relay_run(&db, run).await.unwrap();
        }

        let since = Utc::now() - Duration::hours(1);
        let summary = cost_summary(&db, Some("demo"), since).await.unwrap();
        assert_eq!(summary.run_count, 2);
        assert!((summary.total_cost_usd - 0.30).abs() < 1e-9);
        assert_eq!(summary.total_input_tokens, 100);
        assert_eq!(summary.total_output_tokens, 50);

        let all = cost_summary(&db, None, since).await.unwrap();
        assert_eq!(all.run_count, 3);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cost_summary_empty_is_zero() {
        let (db, _dir) = setup_db().await;
        let summary = cost_summary(&db, None, Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(summary, CostSummary::default());
        db.close().await.unwrap();
    }
}
