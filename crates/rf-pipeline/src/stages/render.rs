//! Video assembly (`tts_done -> rendered`).

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

use rf_core::{Error, Result, Stage};

use crate::llm::Usage;
use crate::stage::{Recipe, StageContext, StageReport, StageWork};
use crate::workspace::EpisodeWorkspace;

use super::{chapterize, images, tts};

pub const VIDEO_FILE: &str = "video.mp4";

/// One chapter on screen: its image held for the length of its narration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub chapter_id: String,
    pub title: String,
    pub image: PathBuf,
    pub audio: PathBuf,
    pub duration_seconds: f64,
}

/// Everything a renderer needs to produce the final video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPlan {
    pub title: String,
    pub scenes: Vec<Scene>,
    pub output: PathBuf,
    pub total_duration_seconds: f64,
}

impl RenderPlan {
    /// Pair each chapter with its image and narration clip.
    pub fn build(workspace: &EpisodeWorkspace, title: &str) -> Result<Self> {
        let chapters_path = workspace.stage_file(Stage::Chapterize, chapterize::OUTPUT_FILE);
        let chapters = chapterize::read_chapters(&chapters_path)?;
        let image_dir = workspace.stage_dir(Stage::Images);
        let audio_dir = workspace.stage_dir(Stage::Tts);
        let image_manifest = images::read_manifest(&image_dir.join(images::MANIFEST_FILE))?;
        let audio_manifest = tts::read_manifest(&audio_dir.join(tts::MANIFEST_FILE))?;

        let mut scenes = Vec::with_capacity(chapters.chapters.len());
        for chapter in &chapters.chapters {
            let image = image_manifest
                .images
                .iter()
                .find(|i| i.chapter_id == chapter.id)
                .ok_or_else(|| {
                    Error::precondition(format!("render: no image for chapter {}", chapter.id))
                })?;
            let clip = audio_manifest
                .clips
                .iter()
                .find(|c| c.chapter_id == chapter.id)
                .ok_or_else(|| {
                    Error::precondition(format!("render: no narration for chapter {}", chapter.id))
                })?;

            scenes.push(Scene {
                chapter_id: chapter.id.clone(),
                title: chapter.title.clone(),
                image: image_dir.join(&image.file),
                audio: audio_dir.join(&clip.file),
                duration_seconds: clip.duration_seconds,
            });
        }

        Ok(Self {
            title: title.to_string(),
            total_duration_seconds: scenes.iter().map(|s| s.duration_seconds).sum(),
            scenes,
            output: workspace.stage_file(Stage::Render, VIDEO_FILE),
        })
    }
}

/// External video renderer.
pub trait VideoRenderer {
    fn name(&self) -> &str;

    /// Produce `plan.output`, returning the cost in USD.
    fn render(&self, plan: &RenderPlan) -> Result<f64>;
}

pub struct RenderStage<'a> {
    renderer: &'a dyn VideoRenderer,
}

impl<'a> RenderStage<'a> {
    pub fn new(renderer: &'a dyn VideoRenderer) -> Self {
        Self { renderer }
    }
}

impl StageWork for RenderStage<'_> {
    fn stage(&self) -> Stage {
        Stage::Render
    }

    fn inputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![
            workspace.stage_file(Stage::Chapterize, chapterize::OUTPUT_FILE),
            workspace.stage_file(Stage::Images, images::MANIFEST_FILE),
            workspace.stage_file(Stage::Tts, tts::MANIFEST_FILE),
        ]
    }

    fn outputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.stage_file(Stage::Render, VIDEO_FILE)]
    }

    fn recipe(&self, _ctx: &StageContext) -> Result<Recipe> {
        Ok(Recipe::from_parameters(
            "render",
            self.renderer.name(),
            json!({ "container": "mp4" }),
        ))
    }

    fn execute(
        &self,
        ctx: &StageContext,
        _recipe: &Recipe,
        usage: &mut Usage,
    ) -> Result<StageReport> {
        let plan = RenderPlan::build(ctx.workspace, &ctx.episode.title)?;
        tracing::info!(
            "render: {} scenes, {:.0}s for episode {}",
            plan.scenes.len(),
            plan.total_duration_seconds,
            ctx.episode.id
        );

        let cost = self.renderer.render(&plan)?;
        usage.record_cost(cost);
        if !Path::new(&plan.output).is_file() {
            return Err(Error::service(self.renderer.name(), "renderer produced no video"));
        }

        Ok(StageReport {
            summary: json!({
                "scene_count": plan.scenes.len(),
                "duration_seconds": plan.total_duration_seconds,
            }),
            metadata: None,
        })
    }
}
