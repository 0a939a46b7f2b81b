//! Provenance records: what produced a stage's output.
//!
//! One JSON file per stage directory, rewritten on every successful run and
//! read back by the idempotency gate. Reading is lenient: a missing or
//! corrupt file is reported as `None`, never as an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rf_core::{EpisodeId, Result, Stage};

use crate::llm::Usage;
use crate::workspace::write_atomic;

/// The prompt (or media recipe) a run used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptRef {
    pub name: String,
    pub version: String,
    pub hash: String,
}

/// Persisted snapshot of one successful stage run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub stage: Stage,
    pub episode_id: EpisodeId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub prompt: PromptRef,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub input_files: Vec<PathBuf>,
    /// Input path (as recorded) to content hash.
    #[serde(default)]
    pub input_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub output_files: Vec<PathBuf>,
    #[serde(default)]
    pub output_hash: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub elapsed_seconds: f64,
    /// Stage-specific fields (chapter count, total duration, ...).
    #[serde(default)]
    pub summary: Value,
}

impl Provenance {
    /// Start a record for `stage`, stamped now.
    pub fn new(stage: Stage, episode_id: EpisodeId) -> Self {
        Self {
            stage,
            episode_id,
            created_at: Utc::now(),
            prompt: PromptRef::default(),
            model: String::new(),
            parameters: Value::Null,
            input_files: Vec::new(),
            input_hashes: BTreeMap::new(),
            output_files: Vec::new(),
            output_hash: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            elapsed_seconds: 0.0,
            summary: Value::Null,
        }
    }

    /// Copy token and cost counters.
    pub fn with_usage(mut self, usage: &Usage) -> Self {
        self.input_tokens = usage.input_tokens;
        self.output_tokens = usage.output_tokens;
        self.cost_usd = usage.cost_usd;
        self
    }

    /// Write as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)
    }

    /// Read a record, treating absence or corruption as `None`.
    pub fn read(path: &Path) -> Option<Self> {
        let data = match std::fs::read(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Cannot read provenance {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!("Ignoring corrupt provenance {}: {e}", path.display());
                None
            }
        }
    }
}
