//! Translation (`corrected -> translated`).

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::json;

use rf_core::{Result, Stage};

use crate::llm::{GenerativeClient, Usage};
use crate::stage::{Recipe, StageContext, StageReport, StageWork};
use crate::workspace::{write_atomic, EpisodeWorkspace};

use super::{correct, generate_segments, join_segments, read_text, text_recipe};

pub const OUTPUT_FILE: &str = "translated.txt";

#[derive(Debug, Deserialize)]
struct TranslationOutput {
    translated_text: String,
}

impl crate::validation::OutputSchema for TranslationOutput {
    fn check(&self) -> std::result::Result<(), String> {
        if self.translated_text.trim().is_empty() {
            return Err("translated_text is empty".into());
        }
        Ok(())
    }
}

pub struct TranslateStage<'a> {
    client: &'a dyn GenerativeClient,
}

impl<'a> TranslateStage<'a> {
    pub fn new(client: &'a dyn GenerativeClient) -> Self {
        Self { client }
    }
}

impl StageWork for TranslateStage<'_> {
    fn stage(&self) -> Stage {
        Stage::Translate
    }

    fn inputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.stage_file(Stage::Correct, correct::OUTPUT_FILE)]
    }

    fn outputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.stage_file(Stage::Translate, OUTPUT_FILE)]
    }

    fn recipe(&self, ctx: &StageContext) -> Result<Recipe> {
        text_recipe(ctx, "translate")
    }

    fn execute(
        &self,
        ctx: &StageContext,
        recipe: &Recipe,
        usage: &mut Usage,
    ) -> Result<StageReport> {
        let source = read_text(&ctx.workspace.stage_file(Stage::Correct, correct::OUTPUT_FILE))?;
        let docs: Vec<TranslationOutput> =
            generate_segments(self.client, ctx, Stage::Translate, recipe, &source, usage)?;

        let text = join_segments(docs.iter().map(|d| d.translated_text.as_str()));
        write_atomic(&ctx.workspace.stage_file(Stage::Translate, OUTPUT_FILE), text.as_bytes())?;

        Ok(StageReport {
            summary: json!({
                "segment_count": docs.len(),
                "character_count": text.trim_end().chars().count(),
            }),
            metadata: None,
        })
    }
}
