//! Illustration (`chapterized -> images_generated`).
//!
//! One image per chapter from an external [`ImageGenerator`]. The manifest
//! records each image's content hash, so hashing the manifest alone covers
//! every image file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use rf_core::{Error, Result, Stage};

use crate::hashing;
use crate::llm::Usage;
use crate::stage::{Recipe, StageContext, StageReport, StageWork};
use crate::workspace::{write_atomic, EpisodeWorkspace};

use super::{chapter_file, chapterize};

pub const MANIFEST_FILE: &str = "images.json";

/// External image generation service.
pub trait ImageGenerator {
    /// Backend identifier, part of the stage's recipe hash.
    fn name(&self) -> &str;

    /// Write one image for `prompt` to `output`, returning its cost in USD.
    fn generate(&self, prompt: &str, style: &str, output: &Path) -> Result<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub chapter_id: String,
    pub number: u32,
    /// File name inside the `images/` directory.
    pub file: String,
    pub prompt: String,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageManifest {
    pub style: String,
    pub images: Vec<ImageEntry>,
}

pub fn read_manifest(path: &Path) -> Result<ImageManifest> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

pub struct ImagesStage<'a> {
    generator: &'a dyn ImageGenerator,
}

impl<'a> ImagesStage<'a> {
    pub fn new(generator: &'a dyn ImageGenerator) -> Self {
        Self { generator }
    }
}

impl StageWork for ImagesStage<'_> {
    fn stage(&self) -> Stage {
        Stage::Images
    }

    fn inputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.stage_file(Stage::Chapterize, chapterize::OUTPUT_FILE)]
    }

    fn outputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.stage_file(Stage::Images, MANIFEST_FILE)]
    }

    fn recipe(&self, ctx: &StageContext) -> Result<Recipe> {
        Ok(Recipe::from_parameters(
            "images",
            self.generator.name(),
            json!({ "style": ctx.config.narration.image_style }),
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
        let style = &ctx.config.narration.image_style;
        let dir = ctx.workspace.stage_dir(Stage::Images);

        let mut images = Vec::with_capacity(chapters.chapters.len());
        for chapter in &chapters.chapters {
            let prompt = if chapter.visual_description.trim().is_empty() {
                chapter.title.clone()
            } else {
                chapter.visual_description.clone()
            };
            let file = chapter_file(chapter.number, "png");
            let path = dir.join(&file);

            let cost = self.generator.generate(&prompt, style, &path)?;
            usage.record_cost(cost);
            if !path.is_file() {
                return Err(Error::service(
                    self.generator.name(),
                    format!("no image written for chapter {}", chapter.id),
                ));
            }
            tracing::debug!("images: chapter {} -> {file}", chapter.id);

            images.push(ImageEntry {
                chapter_id: chapter.id.clone(),
                number: chapter.number,
                hash: hashing::hash_file(&path)?,
                file,
                prompt,
            });
        }

        let manifest = ImageManifest {
            style: style.clone(),
            images,
        };
        write_atomic(
            &dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?.as_bytes(),
        )?;

        Ok(StageReport {
            summary: json!({ "image_count": manifest.images.len() }),
            metadata: None,
        })
    }
}
