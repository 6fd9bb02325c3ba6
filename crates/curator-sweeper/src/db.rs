//! Artifact table schema.

use crate::error::Result;
use rusqlite::Connection;

/// Creates the artifact table if it does not exist. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS artifacts (
            path        TEXT PRIMARY KEY,  -- relative to the storage root
            first_seen  TEXT NOT NULL,     -- RFC 3339 UTC
            expires_at  TEXT NOT NULL      -- RFC 3339 UTC
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_artifacts_expires ON artifacts(expires_at);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }
}
