//! Run table schema.

use crate::error::Result;
use rusqlite::Connection;

/// Creates the run table if it does not exist. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS runs (
            token    TEXT PRIMARY KEY,            -- processor-issued or locally minted
            job_id   TEXT NOT NULL,               -- owning job
            status   TEXT NOT NULL,               -- queued|running|completed|aborted|failed|timeout
            remote   INTEGER NOT NULL DEFAULT 1,  -- 1 when the run lives on the processor
            detail   TEXT,                        -- latest transition note
            started  TEXT NOT NULL,               -- RFC 3339 UTC
            ended    TEXT                         -- RFC 3339 UTC, set on terminal transition
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_runs_job_status ON runs(job_id, status);
        CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started DESC);",
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
