//! Episode lifecycle operations.

use chrono::Utc;
use rusqlite::Connection;
use rf_core::{EpisodeId, EpisodeStatus, Error, Result};

use crate::models::Episode;

const COLS: &str = "id, title, description, tags, status, pipeline_version, error_message,
    youtube_video_id, youtube_url, published_at, created_at, updated_at";

/// Create a new episode in `new` status.
pub fn create_episode(conn: &Connection, title: &str, pipeline_version: &str) -> Result<Episode> {
    let id = EpisodeId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO episodes (id, title, status, pipeline_version, created_at, updated_at)
         VALUES (?1, ?2, 'new', ?3, ?4, ?4)",
        rusqlite::params![id.to_string(), title, pipeline_version, &now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Episode {
        id,
        title: title.to_string(),
        description: String::new(),
        tags: Vec::new(),
        status: EpisodeStatus::New,
        pipeline_version: pipeline_version.to_string(),
        error_message: None,
        youtube_video_id: None,
        youtube_url: None,
        published_at: None,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Get an episode by ID.
pub fn get_episode(conn: &Connection, id: EpisodeId) -> Result<Option<Episode>> {
    let q = format!("SELECT {COLS} FROM episodes WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], Episode::from_row);
    match result {
        Ok(e) => Ok(Some(e)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get an episode by ID, failing with [`Error::NotFound`] if absent.
pub fn require_episode(conn: &Connection, id: EpisodeId) -> Result<Episode> {
    get_episode(conn, id)?.ok_or_else(|| Error::not_found("episode", id))
}

/// List episodes, optionally filtered by status, newest first.
pub fn list_episodes(conn: &Connection, status: Option<EpisodeStatus>) -> Result<Vec<Episode>> {
    let (q, params_vec): (String, Vec<String>) = match status {
        Some(s) => (
            format!("SELECT {COLS} FROM episodes WHERE status = ?1 ORDER BY created_at DESC"),
            vec![s.to_string()],
        ),
        None => (
            format!("SELECT {COLS} FROM episodes ORDER BY created_at DESC"),
            vec![],
        ),
    };

    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params_vec.iter()), Episode::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Set the episode's status and clear its error field.
pub fn set_status(conn: &Connection, id: EpisodeId, status: EpisodeStatus) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE episodes SET status = ?1, error_message = NULL, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status.to_string(), now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Move the episode from `from` to `to` only if it is still in `from`.
///
/// Returns `false` when another caller already moved it.
pub fn transition_status(
    conn: &Connection,
    id: EpisodeId,
    from: EpisodeStatus,
    to: EpisodeStatus,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE episodes SET status = ?1, error_message = NULL, updated_at = ?2
             WHERE id = ?3 AND status = ?4",
            rusqlite::params![to.to_string(), now, id.to_string(), from.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Record an error message without touching the status.
pub fn set_error(conn: &Connection, id: EpisodeId, message: &str) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE episodes SET error_message = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![message, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Record an error and move the episode into `status` in one statement.
pub fn set_status_with_error(
    conn: &Connection,
    id: EpisodeId,
    status: EpisodeStatus,
    message: &str,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE episodes SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![status.to_string(), message, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Replace the publish metadata (title, description, tags).
pub fn update_metadata(
    conn: &Connection,
    id: EpisodeId,
    title: &str,
    description: &str,
    tags: &[String],
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let tags_json = serde_json::to_string(tags).map_err(|e| Error::Internal(e.to_string()))?;
    let n = conn
        .execute(
            "UPDATE episodes SET title = ?1, description = ?2, tags = ?3, updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![title, description, tags_json, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Store the remote video id and move the episode to `published`.
pub fn mark_published(
    conn: &Connection,
    id: EpisodeId,
    video_id: &str,
    video_url: &str,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE episodes SET status = 'published', youtube_video_id = ?1, youtube_url = ?2,
                published_at = ?3, error_message = NULL, updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![video_id, video_url, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
