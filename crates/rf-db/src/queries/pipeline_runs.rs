//! Pipeline run audit records.
//!
//! A run is inserted as `running` when a stage starts and finalized exactly
//! once as `success` or `failed`. The finalizing updates only match rows
//! still in `running`, so a finalized run is never rewritten.

use chrono::Utc;
use rusqlite::Connection;
use rf_core::{EpisodeId, Error, PipelineRunId, Result, RunStatus, Stage};

use crate::models::PipelineRun;

const COLS: &str = "id, episode_id, stage, status, input_tokens, output_tokens, cost_usd,
    error_message, started_at, completed_at";

/// Insert a `running` record for a stage attempt.
pub fn start_run(conn: &Connection, episode_id: EpisodeId, stage: Stage) -> Result<PipelineRun> {
    let id = PipelineRunId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO pipeline_runs (id, episode_id, stage, status, started_at)
         VALUES (?1, ?2, ?3, 'running', ?4)",
        rusqlite::params![id.to_string(), episode_id.to_string(), stage.to_string(), &now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(PipelineRun {
        id,
        episode_id,
        stage,
        status: RunStatus::Running,
        input_tokens: 0,
        output_tokens: 0,
        cost_usd: 0.0,
        error_message: None,
        started_at: now,
        completed_at: None,
    })
}

/// Get a run by ID.
pub fn get_run(conn: &Connection, id: PipelineRunId) -> Result<Option<PipelineRun>> {
    let q = format!("SELECT {COLS} FROM pipeline_runs WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], PipelineRun::from_row);
    match result {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all runs for an episode in start order.
pub fn list_runs(conn: &Connection, episode_id: EpisodeId) -> Result<Vec<PipelineRun>> {
    let q = format!(
        "SELECT {COLS} FROM pipeline_runs WHERE episode_id = ?1 ORDER BY started_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([episode_id.to_string()], PipelineRun::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Mark a running record as successful with its usage counters.
pub fn complete_run(
    conn: &Connection,
    id: PipelineRunId,
    input_tokens: u64,
    output_tokens: u64,
    cost_usd: f64,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE pipeline_runs SET status = 'success', input_tokens = ?1, output_tokens = ?2,
                cost_usd = ?3, completed_at = ?4
             WHERE id = ?5 AND status = 'running'",
            rusqlite::params![
                input_tokens as i64,
                output_tokens as i64,
                cost_usd,
                now,
                id.to_string()
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark a running record as failed.
///
/// Usage already spent before the failure is kept so budget accounting
/// stays honest.
pub fn fail_run(
    conn: &Connection,
    id: PipelineRunId,
    error: &str,
    input_tokens: u64,
    output_tokens: u64,
    cost_usd: f64,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE pipeline_runs SET status = 'failed', error_message = ?1, input_tokens = ?2,
                output_tokens = ?3, cost_usd = ?4, completed_at = ?5
             WHERE id = ?6 AND status = 'running'",
            rusqlite::params![
                error,
                input_tokens as i64,
                output_tokens as i64,
                cost_usd,
                now,
                id.to_string()
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Sum of recorded cost across every run for an episode.
pub fn total_cost(conn: &Connection, episode_id: EpisodeId) -> Result<f64> {
    conn.query_row(
        "SELECT COALESCE(SUM(cost_usd), 0.0) FROM pipeline_runs WHERE episode_id = ?1",
        [episode_id.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Count runs for an episode stage, optionally filtered by status.
pub fn count_runs(
    conn: &Connection,
    episode_id: EpisodeId,
    stage: Stage,
    status: Option<RunStatus>,
) -> Result<i64> {
    let result = match status {
        Some(s) => conn.query_row(
            "SELECT COUNT(*) FROM pipeline_runs \
             WHERE episode_id = ?1 AND stage = ?2 AND status = ?3",
            rusqlite::params![episode_id.to_string(), stage.to_string(), s.to_string()],
            |row| row.get(0),
        ),
        None => conn.query_row(
            "SELECT COUNT(*) FROM pipeline_runs WHERE episode_id = ?1 AND stage = ?2",
            rusqlite::params![episode_id.to_string(), stage.to_string()],
            |row| row.get(0),
        ),
    };
    result.map_err(|e| Error::database(e.to_string()))
}
