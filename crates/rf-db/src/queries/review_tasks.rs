//! Review task and decision persistence.
//!
//! State-machine rules (who may decide what, and when) live in the pipeline
//! crate. These functions only read and write rows.

use chrono::Utc;
use rusqlite::Connection;
use rf_core::{
    EpisodeId, Error, Result, ReviewDecisionId, ReviewDecisionKind, ReviewStatus, ReviewTaskId,
    Stage,
};

use crate::models::{ReviewDecision, ReviewTask};

const COLS: &str = "id, episode_id, stage, status, artifact_paths, artifact_hash, diff_path,
    created_at, decided_at";

const DECISION_COLS: &str = "id, review_task_id, decision, reviewer, notes, created_at";

/// Insert a new `pending` review task.
pub fn create_review_task(
    conn: &Connection,
    episode_id: EpisodeId,
    stage: Stage,
    artifact_paths: &[String],
    artifact_hash: &str,
    diff_path: Option<&str>,
) -> Result<ReviewTask> {
    let id = ReviewTaskId::new();
    let now = Utc::now().to_rfc3339();
    let paths_json =
        serde_json::to_string(artifact_paths).map_err(|e| Error::Internal(e.to_string()))?;

    conn.execute(
        "INSERT INTO review_tasks (id, episode_id, stage, status, artifact_paths, artifact_hash,
            diff_path, created_at)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?7)",
        rusqlite::params![
            id.to_string(),
            episode_id.to_string(),
            stage.to_string(),
            paths_json,
            artifact_hash,
            diff_path,
            &now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(ReviewTask {
        id,
        episode_id,
        stage,
        status: ReviewStatus::Pending,
        artifact_paths: artifact_paths.to_vec(),
        artifact_hash: artifact_hash.to_string(),
        diff_path: diff_path.map(String::from),
        created_at: now,
        decided_at: None,
    })
}

/// Get a review task by ID.
pub fn get_review_task(conn: &Connection, id: ReviewTaskId) -> Result<Option<ReviewTask>> {
    let q = format!("SELECT {COLS} FROM review_tasks WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], ReviewTask::from_row);
    match result {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List review tasks for an episode, oldest first.
pub fn list_review_tasks(conn: &Connection, episode_id: EpisodeId) -> Result<Vec<ReviewTask>> {
    let q = format!(
        "SELECT {COLS} FROM review_tasks WHERE episode_id = ?1 ORDER BY created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([episode_id.to_string()], ReviewTask::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// List every review task still awaiting a decision, across episodes.
pub fn list_open_tasks(conn: &Connection) -> Result<Vec<ReviewTask>> {
    let q = format!(
        "SELECT {COLS} FROM review_tasks WHERE status IN ('pending', 'in_review')
         ORDER BY created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], ReviewTask::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// The most recent open (pending or in-review) task for a stage.
pub fn open_task_for_stage(
    conn: &Connection,
    episode_id: EpisodeId,
    stage: Stage,
) -> Result<Option<ReviewTask>> {
    let q = format!(
        "SELECT {COLS} FROM review_tasks
         WHERE episode_id = ?1 AND stage = ?2 AND status IN ('pending', 'in_review')
         ORDER BY created_at DESC, rowid DESC LIMIT 1"
    );
    let result = conn.query_row(
        &q,
        rusqlite::params![episode_id.to_string(), stage.to_string()],
        ReviewTask::from_row,
    );
    match result {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// The most recent task for a stage regardless of status.
pub fn latest_task_for_stage(
    conn: &Connection,
    episode_id: EpisodeId,
    stage: Stage,
) -> Result<Option<ReviewTask>> {
    let q = format!(
        "SELECT {COLS} FROM review_tasks WHERE episode_id = ?1 AND stage = ?2
         ORDER BY created_at DESC, rowid DESC LIMIT 1"
    );
    let result = conn.query_row(
        &q,
        rusqlite::params![episode_id.to_string(), stage.to_string()],
        ReviewTask::from_row,
    );
    match result {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// The most recent approved task for a stage.
pub fn latest_approved_for_stage(
    conn: &Connection,
    episode_id: EpisodeId,
    stage: Stage,
) -> Result<Option<ReviewTask>> {
    let q = format!(
        "SELECT {COLS} FROM review_tasks
         WHERE episode_id = ?1 AND stage = ?2 AND status = 'approved'
         ORDER BY decided_at DESC, rowid DESC LIMIT 1"
    );
    let result = conn.query_row(
        &q,
        rusqlite::params![episode_id.to_string(), stage.to_string()],
        ReviewTask::from_row,
    );
    match result {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Move a task from `from` to `to`. Terminal statuses also stamp `decided_at`.
///
/// Returns `false` if the task was not in `from`.
pub fn update_status(
    conn: &Connection,
    id: ReviewTaskId,
    from: ReviewStatus,
    to: ReviewStatus,
) -> Result<bool> {
    let decided_at = (!to.is_open()).then(|| Utc::now().to_rfc3339());
    let n = conn
        .execute(
            "UPDATE review_tasks SET status = ?1, decided_at = COALESCE(?2, decided_at)
             WHERE id = ?3 AND status = ?4",
            rusqlite::params![to.to_string(), decided_at, id.to_string(), from.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Append a decision record to a task.
pub fn insert_decision(
    conn: &Connection,
    review_task_id: ReviewTaskId,
    decision: ReviewDecisionKind,
    reviewer: &str,
    notes: Option<&str>,
) -> Result<ReviewDecision> {
    let id = ReviewDecisionId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO review_decisions (id, review_task_id, decision, reviewer, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.to_string(),
            review_task_id.to_string(),
            decision.to_string(),
            reviewer,
            notes,
            &now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(ReviewDecision {
        id,
        review_task_id,
        decision,
        reviewer: reviewer.to_string(),
        notes: notes.map(String::from),
        created_at: now,
    })
}

/// List decisions for a task, oldest first.
pub fn list_decisions(
    conn: &Connection,
    review_task_id: ReviewTaskId,
) -> Result<Vec<ReviewDecision>> {
    let q = format!(
        "SELECT {DECISION_COLS} FROM review_decisions WHERE review_task_id = ?1
         ORDER BY created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([review_task_id.to_string()], ReviewDecision::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}
