//! Human review gating between stages.

mod common;

use assert_matches::assert_matches;
use common::*;

use rf_core::{EpisodeStatus, Error, ReviewDecisionKind, ReviewStatus, Stage};
use rf_db::queries::{pipeline_runs, review_tasks};
use rf_pipeline::review;
use rf_pipeline::stages::{AdaptStage, ChapterizeStage};
use rf_pipeline::RunOptions;

#[test]
fn adapt_opens_review_with_hashed_artifacts() {
    let h = TestHarness::new();
    let id = through_adapt(&h);

    let conn = h.conn();
    let task = review_tasks::open_task_for_stage(&conn, id, Stage::Adapt).unwrap().unwrap();
    assert_eq!(task.status, ReviewStatus::Pending);
    assert_eq!(task.artifact_paths.len(), 1);
    assert!(task.artifact_paths[0].ends_with("adapted.txt"));
    assert_eq!(
        task.artifact_hash,
        rf_pipeline::hashing::hash_files(&task.artifact_paths).unwrap()
    );
}

#[test]
fn next_stage_blocked_until_approved() {
    let h = TestHarness::new();
    let id = through_adapt(&h);

    let client = ScriptedClient::new([chapters_reply(2, 5.0)]);
    let err = h.run(id, &ChapterizeStage::new(&client)).unwrap_err();
    assert_matches!(err, Error::Precondition(msg) if msg.contains("pending"));

    // Force does not bypass the review gate.
    let forced = RunOptions {
        force: true,
        ..Default::default()
    };
    assert_matches!(
        h.run_with(id, &ChapterizeStage::new(&client), forced),
        Err(Error::Precondition(_))
    );
    assert_eq!(client.calls(), 0);
    assert_eq!(
        pipeline_runs::count_runs(&h.conn(), id, Stage::Chapterize, None).unwrap(),
        0
    );

    let conn = h.conn();
    let task = review_tasks::open_task_for_stage(&conn, id, Stage::Adapt).unwrap().unwrap();
    review::start_review(&conn, task.id).unwrap();
    assert_matches!(
        h.run(id, &ChapterizeStage::new(&client)),
        Err(Error::Precondition(msg)) if msg.contains("in_review")
    );

    h.approve(id, Stage::Adapt);
    h.run(id, &ChapterizeStage::new(&client)).unwrap();
    assert_eq!(h.episode(id).status, EpisodeStatus::Chapterized);
}

#[test]
fn rejection_regenerates_the_stage() {
    let h = TestHarness::new();
    let id = through_adapt(&h);
    h.decide(id, Stage::Adapt, ReviewDecisionKind::Rejected);

    assert_eq!(h.episode(id).status, EpisodeStatus::Translated);
    let ws = h.workspace(id);
    assert!(ws.stale_marker_path(Stage::Adapt).exists());

    // Chapterize stays blocked: the latest adapt review is rejected.
    let idle = ScriptedClient::new(Vec::<String>::new());
    assert_matches!(
        h.run(id, &ChapterizeStage::new(&idle)),
        Err(Error::Precondition(_))
    );

    // Adapt reruns despite unchanged input, and opens a fresh review.
    let client = ScriptedClient::new([adapt_reply("Rivers, rewritten.")]);
    let outcome = h.run(id, &AdaptStage::new(&client)).unwrap();
    assert!(!outcome.skipped);
    assert_eq!(client.calls(), 1);
    let new_task = outcome.review_task_id.unwrap();

    let conn = h.conn();
    let tasks = review_tasks::list_review_tasks(&conn, id).unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(
        review_tasks::latest_task_for_stage(&conn, id, Stage::Adapt).unwrap().unwrap().id,
        new_task
    );

    h.approve(id, Stage::Adapt);
    h.run(id, &ChapterizeStage::new(&ScriptedClient::new([chapters_reply(1, 3.0)])))
        .unwrap();
}

#[test]
fn decided_review_cannot_be_redecided() {
    let h = TestHarness::new();
    let id = through_adapt(&h);
    let conn = h.conn();
    let task = review_tasks::open_task_for_stage(&conn, id, Stage::Adapt).unwrap().unwrap();

    h.approve(id, Stage::Adapt);
    let err = review::decide_review(
        &conn,
        &h.config.storage.data_dir,
        task.id,
        ReviewDecisionKind::Rejected,
        "someone",
        Some("late"),
    )
    .unwrap_err();
    assert_matches!(err, Error::Conflict(_));

    let stored = review_tasks::get_review_task(&conn, task.id).unwrap().unwrap();
    assert_eq!(stored.status, ReviewStatus::Approved);
    assert_eq!(review_tasks::list_decisions(&conn, task.id).unwrap().len(), 1);
    assert_eq!(h.episode(id).status, EpisodeStatus::Adapted);
}

#[test]
fn unreviewed_stage_does_not_gate() {
    let h = TestHarness::with_config(|c| c.review.required_stages = vec![Stage::Render]);
    let id = through_adapt(&h);
    assert!(review_tasks::list_review_tasks(&h.conn(), id).unwrap().is_empty());

    let client = ScriptedClient::new([chapters_reply(2, 5.0)]);
    h.run(id, &ChapterizeStage::new(&client)).unwrap();
}

#[test]
fn failed_regeneration_keeps_the_rejection_in_force() {
    let h = TestHarness::new();
    let id = through_adapt(&h);
    h.decide(id, Stage::Adapt, ReviewDecisionKind::Rejected);
    let marker = h.workspace(id).stale_marker_path(Stage::Adapt);

    let broken = ScriptedClient::failing();
    assert_matches!(
        h.run(id, &AdaptStage::new(&broken)),
        Err(Error::Service { .. })
    );
    assert!(marker.exists());
    assert_eq!(h.episode(id).status, EpisodeStatus::Translated);

    // The rejected text is still on disk with matching provenance; it must
    // be regenerated, not promoted.
    let client = ScriptedClient::new([adapt_reply("Rivers, second attempt.")]);
    let outcome = h.run(id, &AdaptStage::new(&client)).unwrap();
    assert!(!outcome.skipped);
    assert_eq!(client.calls(), 1);
    assert!(!marker.exists());
    assert_eq!(h.episode(id).status, EpisodeStatus::Adapted);

    let conn = h.conn();
    let latest = review_tasks::latest_task_for_stage(&conn, id, Stage::Adapt)
        .unwrap()
        .unwrap();
    assert_eq!(latest.status, ReviewStatus::Pending);
    assert_eq!(Some(latest.id), outcome.review_task_id);
}

#[test]
fn cost_limit_refusal_keeps_the_rejection_in_force() {
    // Correct, translate, and adapt spend exactly the budget.
    let h = TestHarness::with_config(|c| c.budget.max_episode_cost_usd = 3.0 * CALL_COST);
    let id = through_adapt(&h);
    h.decide(id, Stage::Adapt, ReviewDecisionKind::Rejected);
    let marker = h.workspace(id).stale_marker_path(Stage::Adapt);

    let client = ScriptedClient::new([adapt_reply("Rivers, within budget.")]);
    assert_matches!(
        h.run(id, &AdaptStage::new(&client)),
        Err(Error::CostLimit { .. })
    );
    assert_eq!(client.calls(), 0);
    assert!(marker.exists());

    let forced = RunOptions {
        force: true,
        ..Default::default()
    };
    let outcome = h.run_with(id, &AdaptStage::new(&client), forced).unwrap();
    assert!(!outcome.skipped);
    assert_eq!(client.calls(), 1);
    assert!(outcome.review_task_id.is_some());
}

#[test]
fn cached_output_after_rejection_gets_a_fresh_review() {
    let h = TestHarness::new();
    let id = through_adapt(&h);
    h.decide(id, Stage::Adapt, ReviewDecisionKind::ChangesRequested);

    // Operator clears the marker by hand: the cached text is reused, but the
    // earlier decision does not cover it.
    std::fs::remove_file(h.workspace(id).stale_marker_path(Stage::Adapt)).unwrap();

    let idle = ScriptedClient::new(Vec::<String>::new());
    let outcome = h.run(id, &AdaptStage::new(&idle)).unwrap();
    assert!(outcome.skipped);
    assert_eq!(idle.calls(), 0);
    assert_eq!(h.episode(id).status, EpisodeStatus::Adapted);

    let task = outcome.review_task_id.expect("a new review is opened");
    let conn = h.conn();
    assert_eq!(
        review_tasks::get_review_task(&conn, task).unwrap().unwrap().status,
        ReviewStatus::Pending
    );
    assert_matches!(
        h.run(id, &ChapterizeStage::new(&idle)),
        Err(Error::Precondition(_))
    );
}
