//! Service failures, malformed output, and the cost guard.

mod common;

use assert_matches::assert_matches;
use common::*;

use rf_core::{EpisodeStatus, Error, ErrorCategory, RunStatus, Stage};
use rf_db::queries::pipeline_runs;
use rf_pipeline::stages::{AdaptStage, ChapterizeStage, CorrectStage, TranslateStage};
use rf_pipeline::RunOptions;

#[test]
fn service_failure_records_failed_run_and_keeps_status() {
    let h = TestHarness::new();
    let ep = h.ingest(TRANSCRIPT);

    let client = ScriptedClient::failing();
    let err = h.run(ep.id, &CorrectStage::new(&client)).unwrap_err();
    assert_matches!(err, Error::Service { .. });
    assert_eq!(err.category(), ErrorCategory::Transient);

    let runs = pipeline_runs::list_runs(&h.conn(), ep.id).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error_message.as_deref().unwrap().contains("503"));
    assert!(runs[0].completed_at.is_some());

    let episode = h.episode(ep.id);
    assert_eq!(episode.status, EpisodeStatus::Transcribed);
    assert!(episode.error_message.unwrap().starts_with("correct:"));

    // A later success clears the error.
    let ok = ScriptedClient::new([correct_reply("Fixed.")]);
    h.run(ep.id, &CorrectStage::new(&ok)).unwrap();
    let episode = h.episode(ep.id);
    assert_eq!(episode.status, EpisodeStatus::Corrected);
    assert!(episode.error_message.is_none());
}

#[test]
fn malformed_output_is_corrected_once() {
    let h = TestHarness::new();
    let ep = h.ingest(TRANSCRIPT);

    let client = ScriptedClient::new([
        "Sure! Here is the corrected text: The river ran.".to_string(),
        format!("```json\n{}\n```", correct_reply("The river ran.")),
    ]);
    let outcome = h.run(ep.id, &CorrectStage::new(&client)).unwrap();
    assert_eq!(client.calls(), 2);
    assert_eq!(outcome.usage.calls, 2);

    let run = pipeline_runs::get_run(&h.conn(), outcome.run_id.unwrap()).unwrap().unwrap();
    assert!((run.cost_usd - 2.0 * CALL_COST).abs() < 1e-9);
    assert_eq!(run.input_tokens, 240);
}

#[test]
fn invalid_output_after_retry_fails_the_stage() {
    let h = TestHarness::new();
    let id = through_adapt(&h);
    h.approve(id, Stage::Adapt);

    // total_chapters disagrees with the chapter list both times.
    let bad = chapters_reply(2, 10.0).replace("\"total_chapters\":2", "\"total_chapters\":5");
    let client = ScriptedClient::new([bad.clone(), bad, chapters_reply(2, 10.0)]);
    let err = h.run(id, &ChapterizeStage::new(&client)).unwrap_err();

    assert_matches!(err, Error::OutputValidation { ref stage, .. } if stage == "chapterize");
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(client.calls(), 2);

    let runs = pipeline_runs::list_runs(&h.conn(), id).unwrap();
    let failed = runs.iter().find(|r| r.stage == Stage::Chapterize).unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert!((failed.cost_usd - 2.0 * CALL_COST).abs() < 1e-9);
    assert_eq!(h.episode(id).status, EpisodeStatus::Adapted);
}

#[test]
fn budget_exhaustion_stops_the_pipeline() {
    // Correct costs one call; after translate the spend reaches the budget.
    let h = TestHarness::with_config(|c| c.budget.max_episode_cost_usd = 0.015);
    let ep = h.ingest(TRANSCRIPT);
    let text = "The river ran.";
    let client =
        ScriptedClient::new([correct_reply(text), translate_reply(text), adapt_reply(text)]);

    h.run(ep.id, &CorrectStage::new(&client)).unwrap();
    h.run(ep.id, &TranslateStage::new(&client)).unwrap();

    let err = h.run(ep.id, &AdaptStage::new(&client)).unwrap_err();
    assert_matches!(err, Error::CostLimit { budget_usd, .. } if (budget_usd - 0.015).abs() < 1e-12);
    assert_eq!(client.calls(), 2);
    assert_eq!(pipeline_runs::count_runs(&h.conn(), ep.id, Stage::Adapt, None).unwrap(), 0);

    let episode = h.episode(ep.id);
    assert_eq!(episode.status, EpisodeStatus::CostLimit);
    assert!(episode.error_message.unwrap().contains("Cost limit"));

    // Still refused without force.
    assert_matches!(
        h.run(ep.id, &AdaptStage::new(&client)),
        Err(Error::Precondition(_))
    );

    let forced = RunOptions {
        force: true,
        ..Default::default()
    };
    h.run_with(ep.id, &AdaptStage::new(&client), forced).unwrap();
    assert_eq!(h.episode(ep.id).status, EpisodeStatus::Adapted);
}
