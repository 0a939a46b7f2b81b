//! Concrete pipeline stages.
//!
//! Text stages (`correct`, `translate`, `adapt`, `chapterize`) segment their
//! input and send each segment through a prompt template. Media stages
//! (`images`, `tts`, `render`) hand chapters to an external backend.

pub mod adapt;
pub mod chapterize;
pub mod correct;
pub mod images;
pub mod render;
pub mod translate;
pub mod tts;

use std::path::Path;

use rf_core::{Result, Stage};

use crate::llm::{GenerationParams, GenerativeClient, Usage};
use crate::prompts::PromptRegistry;
use crate::segment::segment_text;
use crate::stage::{Recipe, StageContext};
use crate::validation::{call_validated, OutputSchema};

pub use adapt::AdaptStage;
pub use chapterize::{Chapter, ChapterDocument, ChapterizeStage};
pub use correct::CorrectStage;
pub use images::{ImageGenerator, ImagesStage};
pub use render::{RenderPlan, RenderStage, VideoRenderer};
pub use translate::TranslateStage;
pub use tts::{SpeechClip, SpeechSynthesizer, TtsStage};

/// Recipe for a prompt-driven stage: the named template plus the configured
/// generation parameters.
pub(crate) fn text_recipe(ctx: &StageContext, prompt_name: &str) -> Result<Recipe> {
    let template = PromptRegistry::new(&ctx.config.prompts).load(prompt_name)?;
    let params = GenerationParams::from(&ctx.config.generation);
    let parameters = serde_json::to_value(&params)?;
    Ok(Recipe::from_template(template, &params.model, parameters))
}

/// Segment `input` and run every segment through the recipe's template,
/// returning one validated document per segment in order.
pub(crate) fn generate_segments<T: OutputSchema>(
    client: &dyn GenerativeClient,
    ctx: &StageContext,
    stage: Stage,
    recipe: &Recipe,
    input: &str,
    usage: &mut Usage,
) -> Result<Vec<T>> {
    let template = recipe.template()?;
    let params = GenerationParams::from(&ctx.config.generation);
    let segments = segment_text(input, ctx.config.segmentation.max_chars);
    tracing::debug!(
        "{stage}: {} segment(s) for episode {}",
        segments.len(),
        ctx.episode.id
    );

    let mut docs = Vec::with_capacity(segments.len());
    for (i, segment) in segments.iter().enumerate() {
        tracing::debug!(
            "{stage}: segment {}/{} ({} chars)",
            i + 1,
            segments.len(),
            segment.chars().count()
        );
        let prompt = template.render(segment)?;
        docs.push(call_validated(client, stage, &prompt.system, &prompt.user, &params, usage)?);
    }
    Ok(docs)
}

pub(crate) fn read_text(path: &Path) -> Result<String> {
    Ok(std::fs::read_to_string(path)?)
}

/// Join per-segment texts back into one document.
pub(crate) fn join_segments<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}

/// Zero-padded per-chapter file name, e.g. `chapter-003.png`.
pub(crate) fn chapter_file(number: u32, extension: &str) -> String {
    format!("chapter-{number:03}.{extension}")
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the stage unit tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use rf_core::config::Config;
    use rf_core::{EpisodeStatus, Result};
    use rf_db::models::Episode;
    use rf_db::pool::{init_memory_pool, DbPool};
    use rf_db::queries::episodes;

    use crate::llm::{Completion, GenerationParams, GenerativeClient};
    use crate::workspace::EpisodeWorkspace;

    /// Replies with canned texts in order and records each user message.
    pub struct Scripted {
        replies: Mutex<VecDeque<String>>,
        pub seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl GenerativeClient for Scripted {
        fn call(
            &self,
            _system: &str,
            user: &str,
            _params: &GenerationParams,
        ) -> Result<Completion> {
            self.seen.lock().unwrap().push(user.to_string());
            let text = self.replies.lock().unwrap().pop_front().expect("unexpected call");
            Ok(Completion {
                text,
                input_tokens: 100,
                output_tokens: 50,
                cost_usd: 0.01,
            })
        }
    }

    pub struct Fixture {
        pub pool: DbPool,
        pub config: Config,
        pub dir: tempfile::TempDir,
        pub workspace: EpisodeWorkspace,
    }

    impl Fixture {
        pub fn at(status: EpisodeStatus) -> Self {
            let pool = init_memory_pool().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.storage.data_dir = dir.path().to_path_buf();
            config.review.required_stages.clear();

            let ep = {
                let conn = pool.get().unwrap();
                let ep = episodes::create_episode(&conn, "Pilot", "1").unwrap();
                episodes::set_status(&conn, ep.id, status).unwrap();
                ep
            };
            let workspace = EpisodeWorkspace::new(dir.path(), ep.id);
            Self {
                pool,
                config,
                dir,
                workspace,
            }
        }

        pub fn episode(&self) -> Episode {
            let conn = self.pool.get().unwrap();
            episodes::require_episode(&conn, self.workspace.episode_id()).unwrap()
        }

        pub fn write(&self, path: &std::path::Path, contents: &str) {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_drops_blank_parts() {
        assert_eq!(join_segments(["  one ", "", "two"]), "one\n\ntwo\n");
    }

    #[test]
    fn chapter_files_sort_numerically() {
        assert_eq!(chapter_file(3, "png"), "chapter-003.png");
        assert!(chapter_file(9, "wav") < chapter_file(10, "wav"));
    }
}
