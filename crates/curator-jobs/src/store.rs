//! Persistent run records.
//!
//! Every dispatch writes a row here before anything else happens, so a
//! restart can always reconstruct which runs were in flight. Timestamps are
//! RFC 3339 UTC strings, which order lexicographically.

use crate::db;
use crate::error::Result;
use crate::types::JobRun;
use chrono::Utc;
use curator_core::{JobId, RunStatus, RunToken};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;

pub struct RunStore {
    conn: Mutex<Connection>,
}

impl RunStore {
    /// Wraps a connection and ensures the run table exists.
    pub fn new(conn: Connection) -> Result<Self> {
        db::init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Records a freshly dispatched run in `queued` state.
    pub fn record_queued(&self, token: &RunToken, job_id: &JobId, remote: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO runs (token, job_id, status, remote, started)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                token.to_string(),
                job_id.to_string(),
                RunStatus::Queued.to_string(),
                remote as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Moves a queued run to `running`. Returns false if the run was not
    /// in `queued` state (already running, terminal, or unknown).
    pub fn mark_running(&self, token: &RunToken) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE runs SET status = ?1 WHERE token = ?2 AND status = ?3",
            params![
                RunStatus::Running.to_string(),
                token.to_string(),
                RunStatus::Queued.to_string(),
            ],
        )?;
        Ok(updated > 0)
    }

    /// Moves a run to a terminal state and stamps its end time.
    ///
    /// A remote-confirmed outcome (`completed`, `aborted`, `failed`) may
    /// overwrite an earlier `timeout`, so late reconciliation wins over the
    /// local poll budget. `timeout` itself only applies to live runs.
    /// Returns false when no transition happened.
    pub fn mark_terminal(
        &self,
        token: &RunToken,
        status: RunStatus,
        detail: Option<&str>,
    ) -> Result<bool> {
        let from = match status {
            RunStatus::Completed | RunStatus::Aborted | RunStatus::Failed => {
                "('queued', 'running', 'timeout')"
            }
            _ => "('queued', 'running')",
        };
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            &format!(
                "UPDATE runs SET status = ?1, detail = ?2, ended = ?3
                 WHERE token = ?4 AND status IN {from}"
            ),
            params![
                status.to_string(),
                detail,
                Utc::now().to_rfc3339(),
                token.to_string(),
            ],
        )?;
        Ok(updated > 0)
    }

    /// Looks up a single run by token.
    pub fn get(&self, token: &RunToken) -> Result<Option<JobRun>> {
        let conn = self.conn.lock().unwrap();
        let run = conn
            .query_row(
                "SELECT token, job_id, status, remote, detail, started, ended
                 FROM runs WHERE token = ?1",
                params![token.to_string()],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Returns the most recent live run for a job, if any. Used as the
    /// duplicate-dispatch guard: a job with a queued or running run is
    /// not dispatched again.
    pub fn active_run(&self, job_id: &JobId) -> Result<Option<JobRun>> {
        let conn = self.conn.lock().unwrap();
        let run = conn
            .query_row(
                "SELECT token, job_id, status, remote, detail, started, ended
                 FROM runs
                 WHERE job_id = ?1 AND status IN ('queued', 'running')
                 ORDER BY started DESC LIMIT 1",
                params![job_id.to_string()],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Returns every run a restart has to reconcile: live runs plus runs
    /// that timed out locally and may have finished on the processor since.
    pub fn reconcilable(&self) -> Result<Vec<JobRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT token, job_id, status, remote, detail, started, ended
             FROM runs
             WHERE status IN ('queued', 'running', 'timeout')
             ORDER BY started ASC",
        )?;
        let runs = stmt
            .query_map([], row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    /// Lists runs, newest first, optionally filtered by status.
    pub fn list(&self, status: Option<RunStatus>) -> Result<Vec<JobRun>> {
        let conn = self.conn.lock().unwrap();
        let runs = match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT token, job_id, status, remote, detail, started, ended
                     FROM runs WHERE status = ?1 ORDER BY started DESC",
                )?;
                let runs = stmt
                    .query_map(params![status.to_string()], row_to_run)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                runs
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT token, job_id, status, remote, detail, started, ended
                     FROM runs ORDER BY started DESC",
                )?;
                let runs = stmt
                    .query_map([], row_to_run)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                runs
            }
        };
        Ok(runs)
    }
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRun> {
    let status: String = row.get(2)?;
    Ok(JobRun {
        token: RunToken::from(row.get::<_, String>(0)?),
        job_id: JobId::from(row.get::<_, String>(1)?),
        status: status.parse().unwrap_or(RunStatus::Failed),
        remote: row.get::<_, i64>(3)? != 0,
        detail: row.get(4)?,
        started: row.get(5)?,
        ended: row.get(6)?,
    })
}
