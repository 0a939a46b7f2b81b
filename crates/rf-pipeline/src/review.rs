//! Human review gate.
//!
//! A stage that needs sign-off opens a `pending` task holding its output
//! paths and their content hash. A reviewer may start it (`in_review`) and
//! then decides it exactly once. The next stage refuses to run until the
//! latest task for its predecessor is `approved`.
//!
//! Side effects of a decision:
//! - `approved` on `render` moves the episode `rendered -> approved`.
//! - `rejected` / `changes_requested` puts the episode back in the stage's
//!   required status and leaves a stale marker, so the next run regenerates.

use std::path::Path;

use rusqlite::Connection;

use rf_core::{
    EpisodeId, EpisodeStatus, Error, Result, ReviewDecisionKind, ReviewStatus, ReviewTaskId, Stage,
};
use rf_db::models::{ReviewDecision, ReviewTask};
use rf_db::queries::{episodes, review_tasks};

use crate::staleness::{mark_stale, StaleMarker};
use crate::workspace::EpisodeWorkspace;

/// A decided task with the decision row that closed it.
#[derive(Debug, Clone)]
pub struct DecidedReview {
    pub task: ReviewTask,
    pub decision: ReviewDecision,
}

/// Open a `pending` review for a stage's output.
///
/// Fails with [`Error::Conflict`] if the stage already has an open task.
pub fn open_review(
    conn: &Connection,
    episode_id: EpisodeId,
    stage: Stage,
    artifact_paths: &[String],
    artifact_hash: &str,
    diff_path: Option<&str>,
) -> Result<ReviewTask> {
    if let Some(open) = review_tasks::open_task_for_stage(conn, episode_id, stage)? {
        return Err(Error::Conflict(format!(
            "{stage} review {} is still {} for episode {episode_id}",
            open.id, open.status
        )));
    }
    let task = review_tasks::create_review_task(
        conn,
        episode_id,
        stage,
        artifact_paths,
        artifact_hash,
        diff_path,
    )?;
    tracing::info!("Opened {stage} review {} for episode {episode_id}", task.id);
    Ok(task)
}

/// Mark a pending task as being looked at.
pub fn start_review(conn: &Connection, task_id: ReviewTaskId) -> Result<ReviewTask> {
    let task = require_task(conn, task_id)?;
    if task.status != ReviewStatus::Pending {
        return Err(Error::Conflict(format!(
            "review {task_id} is {}, not pending",
            task.status
        )));
    }
    if !review_tasks::update_status(conn, task_id, ReviewStatus::Pending, ReviewStatus::InReview)? {
        return Err(Error::Conflict(format!("review {task_id} changed concurrently")));
    }
    require_task(conn, task_id)
}

/// Record a terminal decision on an open task.
///
/// Deciding a task that is already terminal fails with
/// [`Error::Conflict`]; nothing is overwritten.
pub fn decide_review(
    conn: &Connection,
    data_dir: &Path,
    task_id: ReviewTaskId,
    decision: ReviewDecisionKind,
    reviewer: &str,
    notes: Option<&str>,
) -> Result<DecidedReview> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let task = require_task(&tx, task_id)?;
    if !task.status.is_open() {
        return Err(Error::Conflict(format!(
            "review {task_id} was already decided ({})",
            task.status
        )));
    }
    if !review_tasks::update_status(&tx, task_id, task.status, decision.into())? {
        return Err(Error::Conflict(format!("review {task_id} changed concurrently")));
    }
    let record = review_tasks::insert_decision(&tx, task_id, decision, reviewer, notes)?;

    let stage = task.stage;
    match decision {
        ReviewDecisionKind::Approved if stage == Stage::Render => {
            if !episodes::transition_status(
                &tx,
                task.episode_id,
                EpisodeStatus::Rendered,
                EpisodeStatus::Approved,
            )? {
                tracing::warn!(
                    "Render review {task_id} approved but episode {} is not rendered",
                    task.episode_id
                );
            }
        }
        ReviewDecisionKind::Approved => {}
        ReviewDecisionKind::Rejected | ReviewDecisionKind::ChangesRequested => {
            episodes::transition_status(
                &tx,
                task.episode_id,
                stage.target_status(),
                stage.required_status(),
            )?;
        }
    }
    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    if decision != ReviewDecisionKind::Approved {
        let workspace = EpisodeWorkspace::new(data_dir, task.episode_id);
        let reason = match notes {
            Some(n) if !n.is_empty() => format!("review {decision}: {n}"),
            _ => format!("review {decision}"),
        };
        mark_stale(&workspace, stage, &StaleMarker::new("review", reason))?;
    }

    tracing::info!("{stage} review {task_id} {decision} by {reviewer}");
    Ok(DecidedReview {
        task: require_task(conn, task_id)?,
        decision: record,
    })
}

/// Fail unless the latest review for `stage` is approved and none is open.
pub fn ensure_stage_approved(conn: &Connection, episode_id: EpisodeId, stage: Stage) -> Result<()> {
    ensure_no_open_review(conn, episode_id, stage)?;
    match review_tasks::latest_task_for_stage(conn, episode_id, stage)? {
        Some(task) if task.status == ReviewStatus::Approved => Ok(()),
        Some(task) => Err(Error::precondition(format!(
            "latest {stage} review {} for episode {episode_id} is {}",
            task.id, task.status
        ))),
        None => Err(Error::precondition(format!(
            "{stage} has no approved review for episode {episode_id}"
        ))),
    }
}

/// Fail if `stage` has a pending or in-review task.
pub fn ensure_no_open_review(conn: &Connection, episode_id: EpisodeId, stage: Stage) -> Result<()> {
    match review_tasks::open_task_for_stage(conn, episode_id, stage)? {
        Some(task) => Err(Error::precondition(format!(
            "{stage} review {} for episode {episode_id} is still {}",
            task.id, task.status
        ))),
        None => Ok(()),
    }
}

/// The most recent approved task for a stage.
pub fn latest_approved(
    conn: &Connection,
    episode_id: EpisodeId,
    stage: Stage,
) -> Result<Option<ReviewTask>> {
    review_tasks::latest_approved_for_stage(conn, episode_id, stage)
}

fn require_task(conn: &Connection, task_id: ReviewTaskId) -> Result<ReviewTask> {
    review_tasks::get_review_task(conn, task_id)?
        .ok_or_else(|| Error::not_found("review task", task_id))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rf_db::pool::init_memory_pool;

    use super::*;

    fn setup(
        status: EpisodeStatus,
    ) -> (rf_db::pool::PooledConnection, EpisodeId, tempfile::TempDir) {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let ep = episodes::create_episode(&conn, "Pilot", "1").unwrap();
        episodes::set_status(&conn, ep.id, status).unwrap();
        (conn, ep.id, tempfile::tempdir().unwrap())
    }

    fn approve(conn: &Connection, data_dir: &Path, task: ReviewTaskId) {
        decide_review(conn, data_dir, task, ReviewDecisionKind::Approved, "ana", None).unwrap();
    }

    #[test]
    fn one_open_task_per_stage() {
        let (conn, ep, _dir) = setup(EpisodeStatus::Adapted);
        open_review(&conn, ep, Stage::Adapt, &[], "h", None).unwrap();
        let err = open_review(&conn, ep, Stage::Adapt, &[], "h", None).unwrap_err();
        assert_matches!(err, Error::Conflict(_));
        // Other stages are independent.
        open_review(&conn, ep, Stage::Render, &[], "h", None).unwrap();
    }

    #[test]
    fn gate_requires_latest_approved() {
        let (conn, ep, dir) = setup(EpisodeStatus::Adapted);
        assert_matches!(
            ensure_stage_approved(&conn, ep, Stage::Adapt),
            Err(Error::Precondition(_))
        );

        let task = open_review(&conn, ep, Stage::Adapt, &[], "h", None).unwrap();
        assert_matches!(
            ensure_stage_approved(&conn, ep, Stage::Adapt),
            Err(Error::Precondition(_))
        );

        start_review(&conn, task.id).unwrap();
        approve(&conn, dir.path(), task.id);
        ensure_stage_approved(&conn, ep, Stage::Adapt).unwrap();
        assert!(latest_approved(&conn, ep, Stage::Adapt).unwrap().is_some());
    }

    #[test]
    fn terminal_task_cannot_be_decided_again() {
        let (conn, ep, dir) = setup(EpisodeStatus::Adapted);
        let task = open_review(&conn, ep, Stage::Adapt, &[], "h", None).unwrap();
        approve(&conn, dir.path(), task.id);

        let err =
            decide_review(&conn, dir.path(), task.id, ReviewDecisionKind::Rejected, "bo", None)
                .unwrap_err();
        assert_matches!(err, Error::Conflict(_));

        let found = review_tasks::get_review_task(&conn, task.id).unwrap().unwrap();
        assert_eq!(found.status, ReviewStatus::Approved);
        assert_eq!(review_tasks::list_decisions(&conn, task.id).unwrap().len(), 1);
        assert_matches!(start_review(&conn, task.id), Err(Error::Conflict(_)));
    }

    #[test]
    fn rejection_reopens_stage() {
        let (conn, ep, dir) = setup(EpisodeStatus::Adapted);
        let ws = EpisodeWorkspace::new(dir.path(), ep);
        ws.ensure_stage_dir(Stage::Adapt).unwrap();

        let task = open_review(&conn, ep, Stage::Adapt, &[], "h", None).unwrap();
        let decided = decide_review(
            &conn,
            dir.path(),
            task.id,
            ReviewDecisionKind::ChangesRequested,
            "ana",
            Some("too literal"),
        )
        .unwrap();
        assert_eq!(decided.task.status, ReviewStatus::ChangesRequested);
        assert!(decided.task.decided_at.is_some());
        assert!(ws.stale_marker_path(Stage::Adapt).exists());

        let episode = episodes::require_episode(&conn, ep).unwrap();
        assert_eq!(episode.status, EpisodeStatus::Translated);
        assert_matches!(
            ensure_stage_approved(&conn, ep, Stage::Adapt),
            Err(Error::Precondition(msg)) if msg.contains("changes_requested")
        );
    }

    #[test]
    fn render_approval_advances_episode() {
        let (conn, ep, dir) = setup(EpisodeStatus::Rendered);
        let task = open_review(&conn, ep, Stage::Render, &[], "h", None).unwrap();
        approve(&conn, dir.path(), task.id);

        let episode = episodes::require_episode(&conn, ep).unwrap();
        assert_eq!(episode.status, EpisodeStatus::Approved);
    }

    #[test]
    fn unknown_task_is_not_found() {
        let (conn, _ep, dir) = setup(EpisodeStatus::Adapted);
        let err = decide_review(
            &conn,
            dir.path(),
            ReviewTaskId::new(),
            ReviewDecisionKind::Approved,
            "ana",
            None,
        )
        .unwrap_err();
        assert_matches!(err, Error::NotFound { .. });
    }
}
