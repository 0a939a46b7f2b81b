//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a temporary data
//! directory, and a config pointing at it, plus scripted stand-ins for the
//! generative client and the media backends.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::json;
use tempfile::TempDir;

use rf_core::config::Config;
use rf_core::{EpisodeId, Error, ReviewDecisionKind, Result, Stage};
use rf_db::models::Episode;
use rf_db::pool::{init_memory_pool, DbPool, PooledConnection};
use rf_db::queries::{episodes, review_tasks};
use rf_pipeline::llm::{Completion, GenerationParams, GenerativeClient};
use rf_pipeline::stages::{
    AdaptStage, ChapterizeStage, CorrectStage, ImageGenerator, ImagesStage, RenderPlan, RenderStage,
    SpeechClip, SpeechSynthesizer, TranslateStage, TtsStage, VideoRenderer,
};
use rf_pipeline::{review, EpisodeWorkspace, RunOptions, StageOutcome, StageRunner, StageWork};

/// Cost reported for every scripted completion.
pub const CALL_COST: f64 = 0.01;

/// In-memory database plus a throwaway data directory.
pub struct TestHarness {
    pub db: DbPool,
    pub config: Config,
    pub dir: TempDir,
}

impl TestHarness {
    /// Default configuration with storage redirected into a temp dir.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Default configuration adjusted by `tweak`.
    pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.storage.db_path = dir.path().join("data").join("reelforge.db");
        tweak(&mut config);
        Self { db, config, dir }
    }

    pub fn conn(&self) -> PooledConnection {
        self.db.get().expect("failed to get connection")
    }

    /// Write `text` to a scratch file and ingest it.
    pub fn ingest(&self, text: &str) -> Episode {
        let source = self.dir.path().join("source.txt");
        std::fs::write(&source, text).expect("failed to write transcript");
        rf_pipeline::ingest_transcript(&self.conn(), &self.config, &source, "Working Title")
            .expect("ingest failed")
    }

    pub fn workspace(&self, id: EpisodeId) -> EpisodeWorkspace {
        EpisodeWorkspace::new(&self.config.storage.data_dir, id)
    }

    pub fn episode(&self, id: EpisodeId) -> Episode {
        episodes::require_episode(&self.conn(), id).expect("episode missing")
    }

    pub fn run(&self, id: EpisodeId, work: &dyn StageWork) -> Result<StageOutcome> {
        self.run_with(id, work, RunOptions::default())
    }

    pub fn run_with(
        &self,
        id: EpisodeId,
        work: &dyn StageWork,
        options: RunOptions,
    ) -> Result<StageOutcome> {
        let conn = self.conn();
        StageRunner::new(&conn, &self.config).run(&self.workspace(id), work, options)
    }

    /// Decide the open review for `stage`.
    pub fn decide(&self, id: EpisodeId, stage: Stage, decision: ReviewDecisionKind) {
        let conn = self.conn();
        let task = review_tasks::open_task_for_stage(&conn, id, stage)
            .expect("query failed")
            .unwrap_or_else(|| panic!("no open {stage} review"));
        let data_dir = &self.config.storage.data_dir;
        review::decide_review(&conn, data_dir, task.id, decision, "tester", None)
            .expect("decide failed");
    }

    pub fn approve(&self, id: EpisodeId, stage: Stage) {
        self.decide(id, stage, ReviewDecisionKind::Approved);
    }
}

// ---------------------------------------------------------------------------
// Generative client
// ---------------------------------------------------------------------------

/// Replies with canned texts in order, counting calls.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A client whose every call fails with a service error.
    pub fn failing() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GenerativeClient for ScriptedClient {
    fn call(&self, _system: &str, _user: &str, _params: &GenerationParams) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::service("fake-llm", "503 service unavailable")))?;
        Ok(Completion {
            text: reply,
            input_tokens: 120,
            output_tokens: 80,
            cost_usd: CALL_COST,
        })
    }
}

pub fn correct_reply(text: &str) -> String {
    json!({
        "corrected_text": text,
        "corrections": [{"original": "teh", "corrected": "the", "reason": "typo"}]
    })
    .to_string()
}

pub fn translate_reply(text: &str) -> String {
    json!({ "translated_text": text }).to_string()
}

pub fn adapt_reply(text: &str) -> String {
    json!({
        "adapted_text": text,
        "adaptations": [],
        "title": "How Rivers Shape Cities",
        "description": "A short history of river towns.",
        "tags": ["history", "rivers"]
    })
    .to_string()
}

/// A valid chapter document with `count` chapters of `seconds` each.
pub fn chapters_reply(count: u32, seconds: f64) -> String {
    let chapters: Vec<_> = (1..=count)
        .map(|n| {
            json!({
                "id": format!("ch-{n}"),
                "number": n,
                "title": format!("Part {n}"),
                "narration": "Rivers carried goods and people between growing towns.",
                "visual_description": format!("A river town, scene {n}"),
                "estimated_duration_seconds": seconds
            })
        })
        .collect();
    json!({
        "chapters": chapters,
        "total_chapters": count,
        "total_estimated_duration_seconds": seconds * f64::from(count)
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Media backends
// ---------------------------------------------------------------------------

/// Writes the prompt bytes as the "image".
#[derive(Default)]
pub struct FakeImages {
    pub calls: AtomicUsize,
}

impl ImageGenerator for FakeImages {
    fn name(&self) -> &str {
        "fake-images"
    }

    fn generate(&self, prompt: &str, style: &str, output: &Path) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output, format!("PNG {style}: {prompt}"))?;
        Ok(0.02)
    }
}

/// Writes the text as the "audio"; duration is 0.4s per word.
#[derive(Default)]
pub struct FakeVoice {
    pub calls: AtomicUsize,
}

impl SpeechSynthesizer for FakeVoice {
    fn name(&self) -> &str {
        "fake-voice"
    }

    fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<SpeechClip> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output, format!("WAV {voice}: {text}"))?;
        Ok(SpeechClip {
            duration_seconds: text.split_whitespace().count() as f64 * 0.4,
            cost_usd: 0.005,
        })
    }
}

/// Writes a listing of the plan as the "video".
#[derive(Default)]
pub struct FakeRenderer {
    pub calls: AtomicUsize,
}

impl VideoRenderer for FakeRenderer {
    fn name(&self) -> &str {
        "fake-renderer"
    }

    fn render(&self, plan: &RenderPlan) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let listing: Vec<String> = plan
            .scenes
            .iter()
            .map(|s| format!("{} {} {:.1}", s.chapter_id, s.image.display(), s.duration_seconds))
            .collect();
        std::fs::write(&plan.output, format!("MP4 {}\n{}", plan.title, listing.join("\n")))?;
        Ok(0.0)
    }
}

// ---------------------------------------------------------------------------
// Scenario builders
// ---------------------------------------------------------------------------

pub const TRANSCRIPT: &str =
    "Teh river ran through the town.\n\nMerchants came by boat every spring.";

/// Ingest and run correct, translate, and adapt. The adapt review is left open.
pub fn through_adapt(h: &TestHarness) -> EpisodeId {
    let ep = h.ingest(TRANSCRIPT);
    let text = "The river ran through the town.\n\nMerchants came by boat every spring.";
    let client =
        ScriptedClient::new([correct_reply(text), translate_reply(text), adapt_reply(text)]);
    h.run(ep.id, &CorrectStage::new(&client)).expect("correct failed");
    h.run(ep.id, &TranslateStage::new(&client)).expect("translate failed");
    h.run(ep.id, &AdaptStage::new(&client)).expect("adapt failed");
    ep.id
}

/// [`through_adapt`], approve the adaptation, then chapterize into
/// `chapters` chapters.
pub fn through_chapterize(h: &TestHarness, chapters: u32) -> EpisodeId {
    let id = through_adapt(h);
    h.approve(id, Stage::Adapt);
    let client = ScriptedClient::new([chapters_reply(chapters, 12.0)]);
    h.run(id, &ChapterizeStage::new(&client)).expect("chapterize failed");
    id
}

/// Run every stage through render. The render review is left open.
pub fn through_render(h: &TestHarness) -> EpisodeId {
    let id = through_chapterize(h, 3);
    h.run(id, &ImagesStage::new(&FakeImages::default())).expect("images failed");
    h.run(id, &TtsStage::new(&FakeVoice::default())).expect("tts failed");
    h.run(id, &RenderStage::new(&FakeRenderer::default())).expect("render failed");
    id
}
