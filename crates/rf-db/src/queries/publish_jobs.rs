//! Publish job lifecycle: `pending -> uploading -> published | failed`.

use chrono::Utc;
use rusqlite::Connection;
use rf_core::{EpisodeId, Error, PublishJobId, PublishStatus, Result};

use crate::models::PublishJob;

const COLS: &str = "id, episode_id, status, video_id, video_url, error_message, created_at,
    started_at, completed_at";

/// Create a pending publish job.
pub fn create_job(conn: &Connection, episode_id: EpisodeId) -> Result<PublishJob> {
    let id = PublishJobId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO publish_jobs (id, episode_id, status, created_at)
         VALUES (?1, ?2, 'pending', ?3)",
        rusqlite::params![id.to_string(), episode_id.to_string(), &now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(PublishJob {
        id,
        episode_id,
        status: PublishStatus::Pending,
        video_id: None,
        video_url: None,
        error_message: None,
        created_at: now,
        started_at: None,
        completed_at: None,
    })
}

/// Get a publish job by ID.
pub fn get_job(conn: &Connection, id: PublishJobId) -> Result<Option<PublishJob>> {
    let q = format!("SELECT {COLS} FROM publish_jobs WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], PublishJob::from_row);
    match result {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List publish jobs for an episode, oldest first.
pub fn list_jobs(conn: &Connection, episode_id: EpisodeId) -> Result<Vec<PublishJob>> {
    let q = format!(
        "SELECT {COLS} FROM publish_jobs WHERE episode_id = ?1 ORDER BY created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([episode_id.to_string()], PublishJob::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Transition `pending -> uploading`.
pub fn mark_uploading(conn: &Connection, id: PublishJobId) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE publish_jobs SET status = 'uploading', started_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            rusqlite::params![now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Transition `uploading -> published`.
pub fn mark_published(
    conn: &Connection,
    id: PublishJobId,
    video_id: &str,
    video_url: &str,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE publish_jobs SET status = 'published', video_id = ?1, video_url = ?2,
                completed_at = ?3
             WHERE id = ?4 AND status = 'uploading'",
            rusqlite::params![video_id, video_url, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Transition a pending or uploading job to `failed`.
pub fn mark_failed(conn: &Connection, id: PublishJobId, error: &str) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE publish_jobs SET status = 'failed', error_message = ?1, completed_at = ?2
             WHERE id = ?3 AND status IN ('pending', 'uploading')",
            rusqlite::params![error, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
