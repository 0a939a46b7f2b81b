//! On-disk layout for one episode.
//!
//! ```text
//! <data_dir>/episodes/<episode_id>/
//!     transcript/transcript.txt
//!     correct/     corrected.txt  provenance.json  [.stale.json]
//!     translate/   ...
//!     ...
//!     render/      video.mp4      provenance.json
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use rf_core::{EpisodeId, Result, Stage};

const PROVENANCE_FILE: &str = "provenance.json";
pub const STALE_MARKER_FILE: &str = ".stale.json";

/// Paths for one episode's stage outputs.
#[derive(Debug, Clone)]
pub struct EpisodeWorkspace {
    episode_id: EpisodeId,
    root: PathBuf,
}

impl EpisodeWorkspace {
    pub fn new(data_dir: &Path, episode_id: EpisodeId) -> Self {
        Self {
            episode_id,
            root: data_dir.join("episodes").join(episode_id.to_string()),
        }
    }

    pub fn episode_id(&self) -> EpisodeId {
        self.episode_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.root.join("transcript").join("transcript.txt")
    }

    /// Working directory of `stage`.
    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.root.join(stage.as_str())
    }

    /// Create the stage directory if needed and return it.
    pub fn ensure_stage_dir(&self, stage: Stage) -> Result<PathBuf> {
        let dir = self.stage_dir(stage);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// A file inside a stage directory.
    pub fn stage_file(&self, stage: Stage, name: &str) -> PathBuf {
        self.stage_dir(stage).join(name)
    }

    pub fn provenance_path(&self, stage: Stage) -> PathBuf {
        self.stage_file(stage, PROVENANCE_FILE)
    }

    pub fn stale_marker_path(&self, stage: Stage) -> PathBuf {
        self.stage_file(stage, STALE_MARKER_FILE)
    }
}

/// Write `data` to `path` through a temp file in the same directory, so
/// readers never see a half-written file.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
