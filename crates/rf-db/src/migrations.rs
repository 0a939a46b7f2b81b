//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use rf_core::{Error, Result};

/// V1: initial schema -- episodes and everything that hangs off them.
const V1_INITIAL: &str = r#"
CREATE TABLE episodes (
    id               TEXT PRIMARY KEY,
    title            TEXT NOT NULL DEFAULT '',
    description      TEXT NOT NULL DEFAULT '',
    tags             TEXT NOT NULL DEFAULT '[]',
    status           TEXT NOT NULL DEFAULT 'new',
    pipeline_version TEXT NOT NULL,
    error_message    TEXT,
    youtube_video_id TEXT,
    youtube_url      TEXT,
    published_at     TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

-- One row per stage execution attempt
CREATE TABLE pipeline_runs (
    id            TEXT PRIMARY KEY,
    episode_id    TEXT NOT NULL REFERENCES episodes(id),
    stage         TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'running',
    input_tokens  INTEGER NOT NULL DEFAULT 0,
    output_tokens INTEGER NOT NULL DEFAULT 0,
    cost_usd      REAL NOT NULL DEFAULT 0.0,
    error_message TEXT,
    started_at    TEXT NOT NULL,
    completed_at  TEXT
);

-- Pointers to durable stage outputs
CREATE TABLE content_artifacts (
    id          TEXT PRIMARY KEY,
    episode_id  TEXT NOT NULL REFERENCES episodes(id),
    stage       TEXT NOT NULL,
    path        TEXT NOT NULL,
    model       TEXT NOT NULL,
    prompt_hash TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

-- Human review gate
CREATE TABLE review_tasks (
    id             TEXT PRIMARY KEY,
    episode_id     TEXT NOT NULL REFERENCES episodes(id),
    stage          TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'pending',
    artifact_paths TEXT NOT NULL DEFAULT '[]',
    artifact_hash  TEXT NOT NULL,
    diff_path      TEXT,
    created_at     TEXT NOT NULL,
    decided_at     TEXT
);

CREATE TABLE review_decisions (
    id             TEXT PRIMARY KEY,
    review_task_id TEXT NOT NULL REFERENCES review_tasks(id) ON DELETE CASCADE,
    decision       TEXT NOT NULL,
    reviewer       TEXT NOT NULL,
    notes          TEXT,
    created_at     TEXT NOT NULL
);

-- Publish attempts
CREATE TABLE publish_jobs (
    id            TEXT PRIMARY KEY,
    episode_id    TEXT NOT NULL REFERENCES episodes(id),
    status        TEXT NOT NULL DEFAULT 'pending',
    video_id      TEXT,
    video_url     TEXT,
    error_message TEXT,
    created_at    TEXT NOT NULL,
    started_at    TEXT,
    completed_at  TEXT
);

-- Indexes
CREATE INDEX idx_episodes_status         ON episodes(status);
CREATE INDEX idx_pipeline_runs_episode   ON pipeline_runs(episode_id);
CREATE INDEX idx_artifacts_episode_stage ON content_artifacts(episode_id, stage);
CREATE INDEX idx_review_tasks_episode    ON review_tasks(episode_id, stage);
CREATE INDEX idx_review_decisions_task   ON review_decisions(review_task_id);
CREATE INDEX idx_publish_jobs_episode    ON publish_jobs(episode_id);
"#;

/// V2: prompt template versions referenced by artifacts and provenance.
const V2_PROMPT_VERSIONS: &str = r#"
CREATE TABLE prompt_versions (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    version    TEXT NOT NULL,
    hash       TEXT NOT NULL,
    path       TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (name, hash)
);
CREATE INDEX idx_prompt_versions_name ON prompt_versions(name);
"#;

/// All migrations in order.  Each entry is `(version, sql)`.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL), (2, V2_PROMPT_VERSIONS)];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
        tracing::debug!("Applied migration V{version}");
    }

    Ok(())
}
