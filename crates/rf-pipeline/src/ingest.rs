//! Bringing a transcript into the pipeline.

use std::path::Path;

use rusqlite::Connection;

use rf_core::config::Config;
use rf_core::{EpisodeStatus, Error, Result};
use rf_db::models::Episode;
use rf_db::queries::episodes;

use crate::workspace::{write_atomic, EpisodeWorkspace};

/// Create an episode from a transcript file and mark it `transcribed`.
///
/// The transcript is copied into the episode workspace; the source file is
/// left untouched.
pub fn ingest_transcript(
    conn: &Connection,
    config: &Config,
    transcript_path: &Path,
    title: &str,
) -> Result<Episode> {
    let text = std::fs::read_to_string(transcript_path).map_err(|e| {
        Error::precondition(format!("cannot read transcript {}: {e}", transcript_path.display()))
    })?;
    if text.trim().is_empty() {
        return Err(Error::precondition(format!(
            "transcript {} is empty",
            transcript_path.display()
        )));
    }

    let episode = episodes::create_episode(conn, title, &config.pipeline_version)?;
    let workspace = EpisodeWorkspace::new(&config.storage.data_dir, episode.id);
    write_atomic(&workspace.transcript_path(), text.as_bytes())?;

    let advanced = episodes::transition_status(
        conn,
        episode.id,
        EpisodeStatus::New,
        EpisodeStatus::Transcribed,
    )?;
    if !advanced {
        return Err(Error::Internal(format!(
            "episode {} left new before ingest finished",
            episode.id
        )));
    }
    tracing::info!(
        "Ingested episode {} \"{title}\" ({} chars)",
        episode.id,
        text.chars().count()
    );
    episodes::require_episode(conn, episode.id)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rf_db::pool::init_memory_pool;

    use super::*;

    #[test]
    fn ingest_copies_and_advances() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.pipeline_version = "7".into();

        let source = dir.path().join("talk.txt");
        std::fs::write(&source, "Hello there.").unwrap();

        let episode = ingest_transcript(&conn, &config, &source, "Talk").unwrap();
        assert_eq!(episode.status, EpisodeStatus::Transcribed);
        assert_eq!(episode.pipeline_version, "7");

        let ws = EpisodeWorkspace::new(&config.storage.data_dir, episode.id);
        assert_eq!(std::fs::read_to_string(ws.transcript_path()).unwrap(), "Hello there.");
        assert!(source.exists());
    }

    #[test]
    fn empty_or_missing_transcript_is_rejected() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();

        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "  \n").unwrap();
        assert_matches!(
            ingest_transcript(&conn, &config, &empty, "x"),
            Err(Error::Precondition(_))
        );
        assert_matches!(
            ingest_transcript(&conn, &config, &dir.path().join("nope.txt"), "x"),
            Err(Error::Precondition(_))
        );
        assert!(episodes::list_episodes(&conn, None).unwrap().is_empty());
    }
}
