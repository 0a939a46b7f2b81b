//! Transcript correction (`transcribed -> corrected`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::json;

use rf_core::{Result, Stage};

use crate::llm::{GenerativeClient, Usage};
use crate::stage::{Recipe, StageContext, StageReport, StageWork};
use crate::workspace::{write_atomic, EpisodeWorkspace};

use super::{generate_segments, join_segments, read_text, text_recipe};

pub const OUTPUT_FILE: &str = "corrected.txt";

/// One fix the model reports having made.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Correction {
    pub original: String,
    pub corrected: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct CorrectionOutput {
    corrected_text: String,
    #[serde(default)]
    corrections: Vec<Correction>,
}

impl crate::validation::OutputSchema for CorrectionOutput {
    fn check(&self) -> std::result::Result<(), String> {
        if self.corrected_text.trim().is_empty() {
            return Err("corrected_text is empty".into());
        }
        Ok(())
    }
}

pub struct CorrectStage<'a> {
    client: &'a dyn GenerativeClient,
}

impl<'a> CorrectStage<'a> {
    pub fn new(client: &'a dyn GenerativeClient) -> Self {
        Self { client }
    }
}

impl StageWork for CorrectStage<'_> {
    fn stage(&self) -> Stage {
        Stage::Correct
    }

    fn inputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.transcript_path()]
    }

    fn outputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.stage_file(Stage::Correct, OUTPUT_FILE)]
    }

    fn recipe(&self, ctx: &StageContext) -> Result<Recipe> {
        text_recipe(ctx, "correct")
    }

    fn execute(
        &self,
        ctx: &StageContext,
        recipe: &Recipe,
        usage: &mut Usage,
    ) -> Result<StageReport> {
        let transcript = read_text(&ctx.workspace.transcript_path())?;
        let docs: Vec<CorrectionOutput> =
            generate_segments(self.client, ctx, Stage::Correct, recipe, &transcript, usage)?;

        let text = join_segments(docs.iter().map(|d| d.corrected_text.as_str()));
        write_atomic(&ctx.workspace.stage_file(Stage::Correct, OUTPUT_FILE), text.as_bytes())?;

        let correction_count: usize = docs.iter().map(|d| d.corrections.len()).sum();
        Ok(StageReport {
            summary: json!({
                "segment_count": docs.len(),
                "correction_count": correction_count,
            }),
            metadata: None,
        })
    }
}
