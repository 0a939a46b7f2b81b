//! The [`StageWork`] trait: one pipeline stage's inputs, outputs, and body.
//!
//! The [`runner`](crate::runner) owns everything around the body (status
//! checks, review gates, caching, run records, provenance, staleness), so an
//! implementation only describes its files and produces its outputs.

use std::path::PathBuf;

use serde_json::Value;

use rf_core::config::Config;
use rf_core::{Error, Result, Stage};
use rf_db::models::Episode;

use crate::hashing;
use crate::llm::Usage;
use crate::prompts::PromptTemplate;
use crate::provenance::PromptRef;
use crate::workspace::EpisodeWorkspace;

/// What a stage reads while it runs.
pub struct StageContext<'a> {
    pub config: &'a Config,
    pub workspace: &'a EpisodeWorkspace,
    pub episode: &'a Episode,
}

/// Everything besides input files that determines a stage's output.
///
/// `prompt.hash` is what the idempotency gate compares. Text stages use the
/// template body hash; media stages hash their canonical parameters.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub prompt: PromptRef,
    pub model: String,
    pub parameters: Value,
    pub template: Option<PromptTemplate>,
}

impl Recipe {
    /// Recipe for a prompt-driven stage.
    pub fn from_template(template: PromptTemplate, model: &str, parameters: Value) -> Self {
        Self {
            prompt: PromptRef {
                name: template.meta.name.clone(),
                version: template.meta.version.clone(),
                hash: template.hash(),
            },
            model: model.to_string(),
            parameters,
            template: Some(template),
        }
    }

    /// Recipe for a stage driven by an external media backend.
    pub fn from_parameters(name: &str, backend: &str, parameters: Value) -> Self {
        let canonical = serde_json::json!({ "backend": backend, "parameters": parameters });
        Self {
            prompt: PromptRef {
                name: name.to_string(),
                version: "media".to_string(),
                hash: hashing::hash_str(&canonical.to_string()),
            },
            model: backend.to_string(),
            parameters,
            template: None,
        }
    }

    /// The loaded template, for stages that require one.
    pub fn template(&self) -> Result<&PromptTemplate> {
        self.template.as_ref().ok_or_else(|| {
            Error::Internal(format!("recipe '{}' has no prompt template", self.prompt.name))
        })
    }
}

/// Publish metadata a stage may propose for the episode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// Result of a successful stage body.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    /// Stage-specific summary, persisted in provenance.
    pub summary: Value,
    /// Applied to the episode in the same transaction as the status change.
    pub metadata: Option<EpisodeMetadata>,
}

/// One stage of the pipeline.
pub trait StageWork {
    fn stage(&self) -> Stage;

    /// Files this stage reads. Their contents feed the idempotency hashes.
    fn inputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf>;

    /// Files this stage writes. The first is the primary output checked by
    /// the idempotency gate; all of them are hashed for review.
    fn outputs(&self, workspace: &EpisodeWorkspace) -> Vec<PathBuf>;

    /// Prompt or parameter recipe for this run.
    fn recipe(&self, ctx: &StageContext) -> Result<Recipe>;

    /// Check preconditions before any state changes.
    ///
    /// The default requires every input file to exist.
    fn validate(&self, ctx: &StageContext) -> Result<()> {
        for input in self.inputs(ctx.workspace) {
            if !input.is_file() {
                return Err(Error::precondition(format!(
                    "{}: missing upstream file {}",
                    self.stage(),
                    input.display()
                )));
            }
        }
        Ok(())
    }

    /// Produce the outputs. Every service call's usage must be recorded in
    /// `usage`, including calls made before a failure.
    fn execute(
        &self,
        ctx: &StageContext,
        recipe: &Recipe,
        usage: &mut Usage,
    ) -> Result<StageReport>;
}
