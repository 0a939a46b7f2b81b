//! Chapterization (`adapted -> chapterized`).
//!
//! Each segment yields its own chapter document. Documents are merged in
//! order: numbers continue from the previous segment, ids are reassigned as
//! `ch-<number>`, and totals are recomputed from the merged chapters.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use rf_core::{Result, Stage};

use crate::llm::{GenerativeClient, Usage};
use crate::stage::{Recipe, StageContext, StageReport, StageWork};
use crate::validation::{OutputSchema, DEFAULT_CHECKLIST};
use crate::workspace::{write_atomic, EpisodeWorkspace};

use super::{adapt, generate_segments, read_text, text_recipe};

pub const OUTPUT_FILE: &str = "chapters.json";

/// Allowed gap between the per-chapter duration sum and the reported total.
pub const DURATION_SUM_TOLERANCE_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub number: u32,
    pub title: String,
    pub narration: String,
    #[serde(default)]
    pub visual_description: String,
    pub estimated_duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterDocument {
    pub chapters: Vec<Chapter>,
    pub total_chapters: usize,
    pub total_estimated_duration_seconds: f64,
}

impl ChapterDocument {
    /// Merge per-segment documents into one, renumbering and recomputing totals.
    pub fn merge(docs: Vec<ChapterDocument>) -> Self {
        let mut chapters = Vec::new();
        for doc in docs {
            for mut chapter in doc.chapters {
                let number = chapters.len() as u32 + 1;
                chapter.number = number;
                chapter.id = format!("ch-{number}");
                chapters.push(chapter);
            }
        }
        let total = chapters.iter().map(|c| c.estimated_duration_seconds).sum();
        Self {
            total_chapters: chapters.len(),
            total_estimated_duration_seconds: total,
            chapters,
        }
    }

    pub fn duration_sum(&self) -> f64 {
        self.chapters.iter().map(|c| c.estimated_duration_seconds).sum()
    }

    pub fn word_count(&self) -> usize {
        self.chapters
            .iter()
            .map(|c| c.narration.split_whitespace().count())
            .sum()
    }
}

const CHAPTER_CHECKLIST: &[&str] = &[
    "The chapters array is not empty.",
    "total_chapters equals the number of chapters.",
    "total_estimated_duration_seconds equals the sum of \
     estimated_duration_seconds (within 1 second).",
];

impl OutputSchema for ChapterDocument {
    fn check(&self) -> std::result::Result<(), String> {
        if self.chapters.is_empty() {
            return Err("chapters is empty".into());
        }

        let mut ids = HashSet::new();
        for (i, chapter) in self.chapters.iter().enumerate() {
            if !ids.insert(chapter.id.as_str()) {
                return Err(format!("duplicate chapter id '{}'", chapter.id));
            }
            let expected = i as u32 + 1;
            if chapter.number != expected {
                return Err(format!(
                    "chapter '{}' has number {}, expected {expected}",
                    chapter.id, chapter.number
                ));
            }
            if chapter.estimated_duration_seconds < 0.0 {
                return Err(format!("chapter '{}' has a negative duration", chapter.id));
            }
        }

        if self.total_chapters != self.chapters.len() {
            return Err(format!(
                "total_chapters is {} but there are {} chapters",
                self.total_chapters,
                self.chapters.len()
            ));
        }

        let sum = self.duration_sum();
        if (sum - self.total_estimated_duration_seconds).abs() > DURATION_SUM_TOLERANCE_SECONDS {
            return Err(format!(
                "total_estimated_duration_seconds is {:.1} but chapter durations sum to {sum:.1}",
                self.total_estimated_duration_seconds
            ));
        }
        Ok(())
    }

    fn checklist() -> &'static [&'static str] {
        static ALL: std::sync::LazyLock<Vec<&'static str>> = std::sync::LazyLock::new(|| {
            DEFAULT_CHECKLIST.iter().chain(CHAPTER_CHECKLIST).copied().collect()
        });
        ALL.as_slice()
    }
}

/// Load a chapter document written by this stage.
pub fn read_chapters(path: &Path) -> Result<ChapterDocument> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Compare the reported total with a words-per-minute estimate.
///
/// Returns a message when they differ by more than `tolerance` (relative).
pub fn duration_warning(
    doc: &ChapterDocument,
    words_per_minute: u32,
    tolerance: f64,
) -> Option<String> {
    if words_per_minute == 0 {
        return None;
    }
    let estimated = doc.word_count() as f64 / f64::from(words_per_minute) * 60.0;
    if estimated <= 0.0 {
        return None;
    }
    let reported = doc.total_estimated_duration_seconds;
    let deviation = (reported - estimated).abs() / estimated;
    (deviation > tolerance).then(|| {
        format!(
            "reported duration {reported:.0}s differs from {estimated:.0}s \
             estimated at {words_per_minute} wpm ({:.0}%)",
            deviation * 100.0
        )
    })
}

pub struct ChapterizeStage<'a> {
    client: &'a dyn GenerativeClient,
}

impl<'a> ChapterizeStage<'a> {
    pub fn new(client: &'a dyn GenerativeClient) -> Self {
        Self { client }
    }
}

impl StageWork for ChapterizeStage<'_> {
    fn stage(&self) -> Stage {
        Stage::Chapterize
    }

    fn inputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.stage_file(Stage::Adapt, adapt::OUTPUT_FILE)]
    }

    fn outputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.stage_file(Stage::Chapterize, OUTPUT_FILE)]
    }

    fn recipe(&self, ctx: &StageContext) -> Result<Recipe> {
        text_recipe(ctx, "chapterize")
    }

    fn execute(
        &self,
        ctx: &StageContext,
        recipe: &Recipe,
        usage: &mut Usage,
    ) -> Result<StageReport> {
        let source = read_text(&ctx.workspace.stage_file(Stage::Adapt, adapt::OUTPUT_FILE))?;
        let docs: Vec<ChapterDocument> =
            generate_segments(self.client, ctx, Stage::Chapterize, recipe, &source, usage)?;
        let doc = ChapterDocument::merge(docs);

        let json = serde_json::to_string_pretty(&doc)?;
        write_atomic(&ctx.workspace.stage_file(Stage::Chapterize, OUTPUT_FILE), json.as_bytes())?;

        let narration = &ctx.config.narration;
        let warning =
            duration_warning(&doc, narration.words_per_minute, narration.duration_tolerance);
        if let Some(w) = &warning {
            tracing::warn!("chapterize: episode {}: {w}", ctx.episode.id);
        }

        let mut summary = json!({
            "chapter_count": doc.total_chapters,
            "total_estimated_duration_seconds": doc.total_estimated_duration_seconds,
        });
        if let Some(w) = warning {
            summary["duration_warning"] = json!(w);
        }
        Ok(StageReport {
            summary,
            metadata: None,
        })
    }
}
