//! Narration synthesis (`images_generated -> tts_done`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use rf_core::{Error, Result, Stage};

use crate::hashing;
use crate::llm::Usage;
use crate::stage::{Recipe, StageContext, StageReport, StageWork};
use crate::workspace::{write_atomic, EpisodeWorkspace};

use super::{chapter_file, chapterize};

pub const MANIFEST_FILE: &str = "narration.json";

/// What the synthesizer reports for one clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechClip {
    pub duration_seconds: f64,
    pub cost_usd: f64,
}

/// External text-to-speech service.
pub trait SpeechSynthesizer {
    fn name(&self) -> &str;

    /// Speak `text` in `voice` into `output`.
    fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<SpeechClip>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipEntry {
    pub chapter_id: String,
    pub number: u32,
    pub file: String,
    pub duration_seconds: f64,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrationManifest {
    pub voice: String,
    pub clips: Vec<ClipEntry>,
    pub total_duration_seconds: f64,
}

pub fn read_manifest(path: &Path) -> Result<NarrationManifest> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

pub struct TtsStage<'a> {
    synthesizer: &'a dyn SpeechSynthesizer,
}

impl<'a> TtsStage<'a> {
    pub fn new(synthesizer: &'a dyn SpeechSynthesizer) -> Self {
        Self { synthesizer }
    }
}

impl StageWork for TtsStage<'_> {
    fn stage(&self) -> Stage {
        Stage::Tts
    }

    fn inputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.stage_file(Stage::Chapterize, chapterize::OUTPUT_FILE)]
    }

    fn outputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.stage_file(Stage::Tts, MANIFEST_FILE)]
    }

    fn recipe(&self, ctx: &StageContext) -> Result<Recipe> {
        Ok(Recipe::from_parameters(
            "tts",
            self.synthesizer.name(),
            json!({ "voice": ctx.config.narration.voice }),
        ))
    }

    fn execute(
        &self,
        ctx: &StageContext,
        _recipe: &Recipe,
        usage: &mut Usage,
    ) -> Result<StageReport> {
        let chapters_path = ctx
            .workspace
            .stage_file(Stage::Chapterize, chapterize::OUTPUT_FILE);
        let chapters = chapterize::read_chapters(&chapters_path)?;
        let voice = &ctx.config.narration.voice;
        let dir = ctx.workspace.stage_dir(Stage::Tts);

        let mut clips = Vec::with_capacity(chapters.chapters.len());
        for chapter in &chapters.chapters {
            let file = chapter_file(chapter.number, "wav");
            let path = dir.join(&file);
            let clip = self.synthesizer.synthesize(&chapter.narration, voice, &path)?;
            usage.record_cost(clip.cost_usd);
            if !path.is_file() {
                return Err(Error::service(
                    self.synthesizer.name(),
                    format!("no audio written for chapter {}", chapter.id),
                ));
            }

            clips.push(ClipEntry {
                chapter_id: chapter.id.clone(),
                number: chapter.number,
                hash: hashing::hash_file(&path)?,
                file,
                duration_seconds: clip.duration_seconds,
            });
        }

        let total: f64 = clips.iter().map(|c| c.duration_seconds).sum();
        let estimated = chapters.total_estimated_duration_seconds;
        if estimated > 0.0
            && (total - estimated).abs() / estimated > ctx.config.narration.duration_tolerance
        {
            tracing::warn!(
                "tts: episode {} narrated in {total:.0}s, chapters estimated {estimated:.0}s",
                ctx.episode.id
            );
        }

        let manifest = NarrationManifest {
            voice: voice.clone(),
            clips,
            total_duration_seconds: total,
        };
        write_atomic(
            &dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?.as_bytes(),
        )?;

        Ok(StageReport {
            summary: json!({
                "clip_count": manifest.clips.len(),
                "total_duration_seconds": total,
            }),
            metadata: None,
        })
    }
}
