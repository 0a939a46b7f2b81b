//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row` selected with the owning query module's `COLS` list.

use std::str::FromStr;

use rf_core::{
    ArtifactId, EpisodeId, EpisodeStatus, PipelineRunId, PromptVersionId, PublishJobId,
    PublishStatus, ReviewDecisionId, ReviewDecisionKind, ReviewStatus, ReviewTaskId, RunStatus,
    Stage,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))?;
    Ok(T::from(uuid))
}

/// Parse a text-form enum column.
fn parse_text<T: FromStr<Err = String>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    s.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn parse_string_list(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let json: String = row.get(idx)?;
    Ok(serde_json::from_str(&json).unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Episode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Episode {
    pub id: EpisodeId,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub status: EpisodeStatus,
    pub pipeline_version: String,
    pub error_message: Option<String>,
    pub youtube_video_id: Option<String>,
    pub youtube_url: Option<String>,
    pub published_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Episode {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            tags: parse_string_list(row, 3)?,
            status: parse_text(row, 4)?,
            pipeline_version: row.get(5)?,
            error_message: row.get(6)?,
            youtube_video_id: row.get(7)?,
            youtube_url: row.get(8)?,
            published_at: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub id: PipelineRunId,
    pub episode_id: EpisodeId,
    pub stage: Stage,
    pub status: RunStatus,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub error_message: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl PipelineRun {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            episode_id: parse_id(row, 1)?,
            stage: parse_text(row, 2)?,
            status: parse_text(row, 3)?,
            input_tokens: row.get(4)?,
            output_tokens: row.get(5)?,
            cost_usd: row.get(6)?,
            error_message: row.get(7)?,
            started_at: row.get(8)?,
            completed_at: row.get(9)?,
        })
    }
}

// ---------------------------------------------------------------------------
// ContentArtifact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ContentArtifact {
    pub id: ArtifactId,
    pub episode_id: EpisodeId,
    pub stage: Stage,
    pub path: String,
    pub model: String,
    pub prompt_hash: String,
    pub created_at: String,
}

impl ContentArtifact {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            episode_id: parse_id(row, 1)?,
            stage: parse_text(row, 2)?,
            path: row.get(3)?,
            model: row.get(4)?,
            prompt_hash: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

// ---------------------------------------------------------------------------
// ReviewTask / ReviewDecision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReviewTask {
    pub id: ReviewTaskId,
    pub episode_id: EpisodeId,
    pub stage: Stage,
    pub status: ReviewStatus,
    pub artifact_paths: Vec<String>,
    pub artifact_hash: String,
    pub diff_path: Option<String>,
    pub created_at: String,
    pub decided_at: Option<String>,
}

impl ReviewTask {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            episode_id: parse_id(row, 1)?,
            stage: parse_text(row, 2)?,
            status: parse_text(row, 3)?,
            artifact_paths: parse_string_list(row, 4)?,
            artifact_hash: row.get(5)?,
            diff_path: row.get(6)?,
            created_at: row.get(7)?,
            decided_at: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReviewDecision {
    pub id: ReviewDecisionId,
    pub review_task_id: ReviewTaskId,
    pub decision: ReviewDecisionKind,
    pub reviewer: String,
    pub notes: Option<String>,
    pub created_at: String,
}

impl ReviewDecision {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            review_task_id: parse_id(row, 1)?,
            decision: parse_text(row, 2)?,
            reviewer: row.get(3)?,
            notes: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

// ---------------------------------------------------------------------------
// PublishJob
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PublishJob {
    pub id: PublishJobId,
    pub episode_id: EpisodeId,
    pub status: PublishStatus,
    pub video_id: Option<String>,
    pub video_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl PublishJob {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            episode_id: parse_id(row, 1)?,
            status: parse_text(row, 2)?,
            video_id: row.get(3)?,
            video_url: row.get(4)?,
            error_message: row.get(5)?,
            created_at: row.get(6)?,
            started_at: row.get(7)?,
            completed_at: row.get(8)?,
        })
    }
}

// ---------------------------------------------------------------------------
// PromptVersion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PromptVersion {
    pub id: PromptVersionId,
    pub name: String,
    pub version: String,
    pub hash: String,
    pub path: Option<String>,
    pub created_at: String,
}

impl PromptVersion {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            name: row.get(1)?,
            version: row.get(2)?,
            hash: row.get(3)?,
            path: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}
