//! Cultural adaptation (`translated -> adapted`).
//!
//! Besides the adapted narration, the model drafts publish metadata. The
//! first segment that supplies a non-empty value wins for each field.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::json;

use rf_core::{Result, Stage};

use crate::llm::{GenerativeClient, Usage};
use crate::stage::{EpisodeMetadata, Recipe, StageContext, StageReport, StageWork};
use crate::workspace::{write_atomic, EpisodeWorkspace};

use super::{generate_segments, join_segments, read_text, text_recipe, translate};

pub const OUTPUT_FILE: &str = "adapted.txt";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adaptation {
    pub original: String,
    pub adapted: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct AdaptationOutput {
    adapted_text: String,
    #[serde(default)]
    adaptations: Vec<Adaptation>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl crate::validation::OutputSchema for AdaptationOutput {
    fn check(&self) -> std::result::Result<(), String> {
        if self.adapted_text.trim().is_empty() {
            return Err("adapted_text is empty".into());
        }
        Ok(())
    }
}

pub struct AdaptStage<'a> {
    client: &'a dyn GenerativeClient,
}

impl<'a> AdaptStage<'a> {
    pub fn new(client: &'a dyn GenerativeClient) -> Self {
        Self { client }
    }
}

impl StageWork for AdaptStage<'_> {
    fn stage(&self) -> Stage {
        Stage::Adapt
    }

    fn inputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.stage_file(Stage::Translate, translate::OUTPUT_FILE)]
    }

    fn outputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf> {
        vec![workspace.stage_file(Stage::Adapt, OUTPUT_FILE)]
    }

    fn recipe(&self, ctx: &StageContext) -> Result<Recipe> {
        text_recipe(ctx, "adapt")
    }

    fn execute(
        &self,
        ctx: &StageContext,
        recipe: &Recipe,
        usage: &mut Usage,
    ) -> Result<StageReport> {
        let source =
            read_text(&ctx.workspace.stage_file(Stage::Translate, translate::OUTPUT_FILE))?;
        let docs: Vec<AdaptationOutput> =
            generate_segments(self.client, ctx, Stage::Adapt, recipe, &source, usage)?;

        let text = join_segments(docs.iter().map(|d| d.adapted_text.as_str()));
        write_atomic(&ctx.workspace.stage_file(Stage::Adapt, OUTPUT_FILE), text.as_bytes())?;

        let adaptation_count: usize = docs.iter().map(|d| d.adaptations.len()).sum();
        let metadata = collect_metadata(&docs);
        if metadata.is_none() {
            tracing::warn!("adapt: no metadata proposed for episode {}", ctx.episode.id);
        }

        Ok(StageReport {
            summary: json!({
                "segment_count": docs.len(),
                "adaptation_count": adaptation_count,
            }),
            metadata: metadata.map(|m| EpisodeMetadata {
                title: m.title.unwrap_or_else(|| ctx.episode.title.clone()),
                description: m.description.unwrap_or_else(|| ctx.episode.description.clone()),
                tags: m.tags.unwrap_or_else(|| ctx.episode.tags.clone()),
            }),
        })
    }
}

#[derive(Debug, Default)]
struct ProposedMetadata {
    title: Option<String>,
    description: Option<String>,
    tags: Option<Vec<String>>,
}

/// First non-empty value per field across segments; `None` if nothing at
/// all was proposed.
fn collect_metadata(docs: &[AdaptationOutput]) -> Option<ProposedMetadata> {
    let non_empty = |s: &Option<String>| {
        s.as_ref()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let proposed = ProposedMetadata {
        title: docs.iter().find_map(|d| non_empty(&d.title)),
        description: docs.iter().find_map(|d| non_empty(&d.description)),
        tags: docs.iter().find_map(|d| {
            let tags: Vec<String> = d
                .tags
                .iter()
                .flatten()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            (!tags.is_empty()).then_some(tags)
        }),
    };

    if proposed.title.is_none() && proposed.description.is_none() && proposed.tags.is_none() {
        None
    } else {
        Some(proposed)
    }
}

#[cfg(test)]
mod tests {
    use rf_core::EpisodeStatus;

    use super::*;
    use crate::runner::{RunOptions, StageRunner};
    use crate::stages::testing::{Fixture, Scripted};

    #[test]
    fn first_non_empty_metadata_wins() {
        let mut fx = Fixture::at(EpisodeStatus::Translated);
        fx.config.segmentation.max_chars = 20;
        fx.write(
            &fx.workspace.stage_file(Stage::Translate, translate::OUTPUT_FILE),
            "First paragraph.\n\nSecond paragraph.",
        );

        let client = Scripted::new([
            r#"{"adapted_text": "One.", "adaptations": [], "title": "", "tags": ["a", "b"]}"#,
            r#"{"adapted_text": "Two.",
                "adaptations": [{"original": "x", "adapted": "y", "reason": "z"}],
                "title": "Good Title", "description": "About things.", "tags": ["c"]}"#,
        ]);
        let conn = fx.pool.get().unwrap();
        let outcome = StageRunner::new(&conn, &fx.config)
            .run(&fx.workspace, &AdaptStage::new(&client), RunOptions::default())
            .unwrap();

        assert_eq!(client.calls(), 2);
        assert_eq!(outcome.summary["adaptation_count"], 1);

        let episode = fx.episode();
        assert_eq!(episode.status, EpisodeStatus::Adapted);
        assert_eq!(episode.title, "Good Title");
        assert_eq!(episode.description, "About things.");
        assert_eq!(episode.tags, vec!["a".to_string(), "b".to_string()]);

        let written =
            std::fs::read_to_string(fx.workspace.stage_file(Stage::Adapt, OUTPUT_FILE)).unwrap();
        assert_eq!(written, "One.\n\nTwo.\n");
    }

    #[test]
    fn missing_metadata_keeps_episode_fields() {
        let fx = Fixture::at(EpisodeStatus::Translated);
        fx.write(
            &fx.workspace.stage_file(Stage::Translate, translate::OUTPUT_FILE),
            "Short.",
        );
        let client = Scripted::new([r#"{"adapted_text": "Short."}"#]);
        let conn = fx.pool.get().unwrap();
        StageRunner::new(&conn, &fx.config)
            .run(&fx.workspace, &AdaptStage::new(&client), RunOptions::default())
            .unwrap();

        let episode = fx.episode();
        assert_eq!(episode.title, "Pilot");
        assert!(episode.tags.is_empty());
    }
}
