//! Artifact expiry records.
//!
//! Timestamps are RFC 3339 UTC strings; expiry comparison happens directly
//! in SQL, which works because those strings order lexicographically.

use crate::db;
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub path: String,
    pub first_seen: String,
    pub expires_at: String,
}

pub struct ArtifactStore {
    conn: Mutex<Connection>,
}

impl ArtifactStore {
    /// Wraps a connection and ensures the artifact table exists.
    pub fn new(conn: Connection) -> Result<Self> {
        db::init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Paths whose expiry has passed as of `now`.
    pub fn expired(&self, now: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT path FROM artifacts WHERE expires_at <= ?1 ORDER BY path")?;
        let paths = stmt
            .query_map(params![now], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paths)
    }

    /// All recorded paths.
    pub fn recorded(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT path FROM artifacts")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paths)
    }

    pub fn insert(&self, path: &str, first_seen: &str, expires_at: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO artifacts (path, first_seen, expires_at) VALUES (?1, ?2, ?3)",
            params![path, first_seen, expires_at],
        )?;
        Ok(())
    }

    /// Returns whether a record was actually removed.
    pub fn remove(&self, path: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM artifacts WHERE path = ?1", params![path])?;
        Ok(removed > 0)
    }

    pub fn record(&self, path: &str) -> Result<Option<ArtifactRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT path, first_seen, expires_at FROM artifacts WHERE path = ?1",
                params![path],
                |row| {
                    Ok(ArtifactRecord {
                        path: row.get(0)?,
                        first_seen: row.get(1)?,
                        expires_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ArtifactStore {
        ArtifactStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn insert_and_read_back() {
        let store = store();
        store
            .insert("ingest/a.tar", "2026-01-01T00:00:00+00:00", "2026-01-02T00:00:00+00:00")
            .unwrap();

        let record = store.record("ingest/a.tar").unwrap().unwrap();
        assert_eq!(record.expires_at, "2026-01-02T00:00:00+00:00");
        assert!(store.record("ingest/b.tar").unwrap().is_none());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let store = store();
        store
            .insert("a", "2026-01-01T00:00:00+00:00", "2026-01-02T00:00:00+00:00")
            .unwrap();
        store
            .insert("b", "2026-01-01T00:00:00+00:00", "2026-01-03T00:00:00+00:00")
            .unwrap();

        let expired = store.expired("2026-01-02T00:00:00+00:00").unwrap();
        assert_eq!(expired, vec!["a".to_string()]);
    }

    #[test]
    fn remove_reports_whether_anything_was_removed() {
        let store = store();
        store
            .insert("a", "2026-01-01T00:00:00+00:00", "2026-01-02T00:00:00+00:00")
            .unwrap();
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
    }
}
