//! Registry of prompt template versions, deduplicated by `(name, hash)`.

use chrono::Utc;
use rusqlite::Connection;
use rf_core::{Error, PromptVersionId, Result};

use crate::models::PromptVersion;

const COLS: &str = "id, name, version, hash, path, created_at";

/// Register a prompt version, returning the existing row if `(name, hash)`
/// is already known.
pub fn register(
    conn: &Connection,
    name: &str,
    version: &str,
    hash: &str,
    path: Option<&str>,
) -> Result<PromptVersion> {
    let id = PromptVersionId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT OR IGNORE INTO prompt_versions (id, name, version, hash, path, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![id.to_string(), name, version, hash, path, now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    get_by_hash(conn, name, hash)?.ok_or_else(|| {
        Error::Internal(format!("prompt version {name}@{hash} vanished after insert"))
    })
}

/// Look up a prompt version by name and content hash.
pub fn get_by_hash(conn: &Connection, name: &str, hash: &str) -> Result<Option<PromptVersion>> {
    let q = format!("SELECT {COLS} FROM prompt_versions WHERE name = ?1 AND hash = ?2");
    let result = conn.query_row(&q, rusqlite::params![name, hash], PromptVersion::from_row);
    match result {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all registered versions of a prompt, oldest first.
pub fn list_versions(conn: &Connection, name: &str) -> Result<Vec<PromptVersion>> {
    let q = format!(
        "SELECT {COLS} FROM prompt_versions WHERE name = ?1 ORDER BY created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([name], PromptVersion::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;

    #[test]
    fn register_dedups_on_hash() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let a = register(&conn, "correct", "1", "aaa", None).unwrap();
        let b = register(&conn, "correct", "1", "aaa", Some("prompts/correct.md")).unwrap();
        assert_eq!(a.id, b.id);
        assert!(b.path.is_none());

        register(&conn, "correct", "2", "bbb", None).unwrap();
        register(&conn, "translate", "1", "aaa", None).unwrap();

        assert_eq!(list_versions(&conn, "correct").unwrap().len(), 2);
        assert!(get_by_hash(&conn, "translate", "bbb").unwrap().is_none());
    }
}
