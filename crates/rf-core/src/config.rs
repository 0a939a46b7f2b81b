//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for storage, generation, segmentation, review policy, budget,
//! and publishing. Every section defaults sensibly so a completely empty `{}`
//! file is valid. A loaded `Config` is passed by reference into every
//! pipeline operation; nothing reads it from global state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::status::Stage;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stamped on every new episode so later audits know which pipeline built it.
    pub pipeline_version: String,
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub segmentation: SegmentationConfig,
    pub prompts: PromptsConfig,
    pub review: ReviewConfig,
    pub budget: BudgetConfig,
    pub narration: NarrationConfig,
    pub publish: PublishConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline_version: default_pipeline_version(),
            storage: StorageConfig::default(),
            generation: GenerationConfig::default(),
            segmentation: SegmentationConfig::default(),
            prompts: PromptsConfig::default(),
            review: ReviewConfig::default(),
            budget: BudgetConfig::default(),
            narration: NarrationConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

fn default_pipeline_version() -> String {
    "1".into()
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Whether finishing `stage` requires a human sign-off before the next stage.
    pub fn requires_review(&self, stage: Stage) -> bool {
        self.review.required_stages.contains(&stage)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.segmentation.max_chars == 0 {
            warnings.push("segmentation.max_chars is 0; every character becomes a segment".into());
        }

        if self.generation.model.trim().is_empty() {
            warnings.push("generation.model is empty".into());
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            warnings.push(format!(
                "generation.temperature {} is outside 0.0..=2.0",
                self.generation.temperature
            ));
        }

        if self.budget.max_episode_cost_usd <= 0.0 {
            warnings.push(
                "budget.max_episode_cost_usd is not positive; every stage will be refused".into(),
            );
        }

        if self.narration.words_per_minute == 0 {
            warnings
                .push("narration.words_per_minute is 0; duration estimates are disabled".into());
        }

        if !self.review.required_stages.contains(&Stage::Render) {
            warnings.push(
                "review.required_stages does not include 'render'; \
                 publish will fail its approval gate"
                    .into(),
            );
        }

        let valid_privacy = ["private", "unlisted", "public"];
        if !valid_privacy.contains(&self.publish.privacy.as_str()) {
            warnings.push(format!(
                "publish.privacy '{}' is not recognized (valid: {})",
                self.publish.privacy,
                valid_privacy.join(", ")
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Where episode workspaces and the database live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            db_path: PathBuf::from("./data/reelforge.db"),
        }
    }
}

/// Parameters forwarded to the generative text service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "default".into(),
            temperature: 0.3,
            max_tokens: 8192,
        }
    }
}

/// Bounds on the text handed to one generative call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub max_chars: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self { max_chars: 10_000 }
    }
}

/// Prompt template lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Directory whose `<stage>.md` files override the embedded templates.
    pub dir: Option<PathBuf>,
}

/// Which stages need human sign-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub required_stages: Vec<Stage>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            required_stages: vec![Stage::Adapt, Stage::Render],
        }
    }
}

/// Spend ceiling per episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_episode_cost_usd: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_episode_cost_usd: 5.0,
        }
    }
}

/// Narration pacing used for duration estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    pub words_per_minute: u32,
    /// Relative difference between reported and estimated duration that
    /// triggers a warning.
    pub duration_tolerance: f64,
    pub voice: String,
    pub image_style: String,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            words_per_minute: 150,
            duration_tolerance: 0.25,
            voice: "default".into(),
            image_style: "illustration".into(),
        }
    }
}

/// Upload metadata defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub category: String,
    pub language: String,
    pub privacy: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            category: "27".into(),
            language: "en".into(),
            privacy: "private".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.segmentation.max_chars, 10_000);
        assert_eq!(cfg.review.required_stages, vec![Stage::Adapt, Stage::Render]);
        assert_eq!(cfg.publish.privacy, "private");
        assert!((cfg.budget.max_episode_cost_usd - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = Config::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn parse_json_config() {
        let json =
            r#"{"segmentation": {"max_chars": 4000}, "review": {"required_stages": ["render"]}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.segmentation.max_chars, 4000);
        assert!(cfg.requires_review(Stage::Render));
        assert!(!cfg.requires_review(Stage::Adapt));
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.generation.max_tokens, 8192);
        assert_eq!(cfg.pipeline_version, "1");
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let err = Config::from_json(r#"{"review": {"required_stages": ["dance"]}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/reelforge.json")));
        assert_eq!(cfg.segmentation.max_chars, 10_000);
    }

    #[test]
    fn missing_render_review_warns() {
        let mut cfg = Config::default();
        cfg.review.required_stages.clear();
        assert!(cfg.validate().iter().any(|w| w.contains("render")));
    }

    #[test]
    fn bad_privacy_warns() {
        let mut cfg = Config::default();
        cfg.publish.privacy = "secret".into();
        assert!(cfg.validate().iter().any(|w| w.contains("privacy")));
    }
}
