//! Content artifact pointers.

use chrono::Utc;
use rusqlite::Connection;
use rf_core::{ArtifactId, EpisodeId, Error, Result, Stage};

use crate::models::ContentArtifact;

const COLS: &str = "id, episode_id, stage, path, model, prompt_hash, created_at";

/// Record a durable stage output.
pub fn create_artifact(
    conn: &Connection,
    episode_id: EpisodeId,
    stage: Stage,
    path: &str,
    model: &str,
    prompt_hash: &str,
) -> Result<ContentArtifact> {
    let id = ArtifactId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO content_artifacts (id, episode_id, stage, path, model, prompt_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            id.to_string(),
            episode_id.to_string(),
            stage.to_string(),
            path,
            model,
            prompt_hash,
            &now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(ContentArtifact {
        id,
        episode_id,
        stage,
        path: path.to_string(),
        model: model.to_string(),
        prompt_hash: prompt_hash.to_string(),
        created_at: now,
    })
}

/// Most recent artifact recorded for a stage.
pub fn latest_for_stage(
    conn: &Connection,
    episode_id: EpisodeId,
    stage: Stage,
) -> Result<Option<ContentArtifact>> {
    let q = format!(
        "SELECT {COLS} FROM content_artifacts WHERE episode_id = ?1 AND stage = ?2
         ORDER BY created_at DESC, rowid DESC LIMIT 1"
    );
    let result = conn.query_row(
        &q,
        rusqlite::params![episode_id.to_string(), stage.to_string()],
        ContentArtifact::from_row,
    );
    match result {
        Ok(a) => Ok(Some(a)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List every artifact recorded for an episode, oldest first.
pub fn list_artifacts(conn: &Connection, episode_id: EpisodeId) -> Result<Vec<ContentArtifact>> {
    let q = format!(
        "SELECT {COLS} FROM content_artifacts \
         WHERE episode_id = ?1 ORDER BY created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([episode_id.to_string()], ContentArtifact::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}
