//! Prompt templates: loading, hashing, rendering, and version registration.
//!
//! A template is Markdown with optional TOML front matter fenced by `+++`
//! lines. The body must contain [`INPUT_MARKER`]; everything before it is the
//! system prompt and everything after it is the user message, with
//! `{{input}}` replaced by the stage input (or the input appended when the
//! placeholder is absent).
//!
//! Defaults are compiled into the crate. A configured directory overrides
//! them file by file (`<dir>/<name>.md`).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use rf_core::config::PromptsConfig;
use rf_core::{Error, Result};
use rf_db::models::PromptVersion;
use rusqlite::Connection;

use crate::hashing;

/// Separates system instructions from the input section.
pub const INPUT_MARKER: &str = "<<<INPUT>>>";

const INPUT_PLACEHOLDER: &str = "{{input}}";
const FRONT_MATTER_FENCE: &str = "+++";

const EMBEDDED: &[(&str, &str)] = &[
    ("correct", include_str!("../prompts/correct.md")),
    ("translate", include_str!("../prompts/translate.md")),
    ("adapt", include_str!("../prompts/adapt.md")),
    ("chapterize", include_str!("../prompts/chapterize.md")),
];

/// Front matter fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PromptMeta {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// A loaded template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub meta: PromptMeta,
    /// Template text after the front matter; this is what gets hashed.
    pub body: String,
    /// Where the template came from, `None` for embedded defaults.
    pub path: Option<PathBuf>,
}

/// A template with its input substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

impl PromptTemplate {
    /// Parse template source. `fallback_name` is used when the front matter
    /// has no `name`.
    pub fn parse(source: &str, fallback_name: &str) -> Result<Self> {
        let (meta, body) = split_front_matter(source)?;
        let mut meta = meta.unwrap_or_default();
        if meta.name.is_empty() {
            meta.name = fallback_name.to_string();
        }
        if meta.version.is_empty() {
            meta.version = "0".to_string();
        }
        Ok(Self {
            meta,
            body: body.to_string(),
            path: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Content hash of the body.
    pub fn hash(&self) -> String {
        compute_hash(&self.body)
    }

    /// Split the body at [`INPUT_MARKER`] into (system, input section).
    pub fn sections(&self) -> Result<(&str, &str)> {
        self.body
            .split_once(INPUT_MARKER)
            .map(|(system, input)| (system.trim(), input.trim()))
            .ok_or_else(|| {
                Error::Config(format!(
                    "prompt '{}' has no {INPUT_MARKER} marker",
                    self.meta.name
                ))
            })
    }

    /// Substitute `input` into the input section.
    pub fn render(&self, input: &str) -> Result<RenderedPrompt> {
        let (system, section) = self.sections()?;
        let user = if section.contains(INPUT_PLACEHOLDER) {
            section.replace(INPUT_PLACEHOLDER, input)
        } else if section.is_empty() {
            input.to_string()
        } else {
            format!("{section}\n\n{input}")
        };
        Ok(RenderedPrompt {
            system: system.to_string(),
            user,
        })
    }
}

/// Digest of a template body.
pub fn compute_hash(body: &str) -> String {
    hashing::hash_str(body)
}

/// Read and parse a template file.
pub fn load_template(path: &Path) -> Result<PromptTemplate> {
    let source = std::fs::read_to_string(path)?;
    let fallback = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("prompt");
    let mut template = PromptTemplate::parse(&source, fallback)?;
    template.path = Some(path.to_path_buf());
    Ok(template)
}

/// Record a template file's current version, returning the stored row.
pub fn register_version(
    conn: &Connection,
    name: &str,
    template_path: &Path,
) -> Result<PromptVersion> {
    let mut template = load_template(template_path)?;
    template.meta.name = name.to_string();
    register_template(conn, &template)
}

/// Record a loaded template's version. Re-registering an unchanged body
/// returns the existing row.
pub fn register_template(conn: &Connection, template: &PromptTemplate) -> Result<PromptVersion> {
    let path = template.path.as_ref().map(|p| p.to_string_lossy().into_owned());
    rf_db::queries::prompt_versions::register(
        conn,
        &template.meta.name,
        &template.meta.version,
        &template.hash(),
        path.as_deref(),
    )
}

fn split_front_matter(source: &str) -> Result<(Option<PromptMeta>, &str)> {
    let trimmed = source.trim_start();
    let Some(rest) = trimmed.strip_prefix(FRONT_MATTER_FENCE) else {
        return Ok((None, source));
    };
    let Some(end) = rest.find(&format!("\n{FRONT_MATTER_FENCE}")) else {
        return Err(Error::Config("unterminated prompt front matter".into()));
    };

    let front = &rest[..end];
    let after = &rest[end + 1 + FRONT_MATTER_FENCE.len()..];
    let meta: PromptMeta = toml::from_str(front)
        .map_err(|e| Error::Config(format!("invalid prompt front matter: {e}")))?;
    Ok((Some(meta), after.trim_start_matches(['\r', '\n'])))
}

/// Resolves templates by name: configured directory first, then the
/// compiled-in defaults.
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    dir: Option<PathBuf>,
}

impl PromptRegistry {
    pub fn new(config: &PromptsConfig) -> Self {
        Self {
            dir: config.dir.clone(),
        }
    }

    /// Load the template called `name`.
    pub fn load(&self, name: &str) -> Result<PromptTemplate> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{name}.md"));
            if path.is_file() {
                tracing::debug!("Using prompt override {}", path.display());
                return load_template(&path);
            }
        }

        let (_, source) = EMBEDDED
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| Error::not_found("prompt", name))?;
        PromptTemplate::parse(source, name)
    }
}
