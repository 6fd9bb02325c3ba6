//! Dispatch, poll and abort logic per job.
//!
//! Every fired job passes through here exactly once: process actions go to
//! the remote processor and are polled to completion, ingest and sweep
//! actions run locally under a locally minted token. The run store is the
//! single source of truth for what is in flight; the in-process `DashMap`
//! guard only closes the window between reading and writing it.

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{JobError, Result};
use crate::processor::JobProcessor;
use crate::store::RunStore;
use crate::types::{JobRun, SubmitOutcome};
use curator_archive::{ArchiveBackend, Deposit};
use curator_core::{
    config::ProcessorConfig, ConfigStore, JobAction, JobConfiguration, JobId, ReportStore,
    RunReport, RunStatus, RunToken,
};
use curator_scheduler::FiredJob;
use curator_sweeper::Sweeper;

pub struct JobController {
    processor: Arc<dyn JobProcessor>,
    runs: RunStore,
    configs: Arc<dyn ConfigStore>,
    reports: Arc<dyn ReportStore>,
    archive: Option<Arc<dyn ArchiveBackend>>,
    sweeper: Option<Arc<Sweeper>>,
    poll_interval: Duration,
    poll_timeout: Duration,
    abort_attempts: u32,
    abort_backoff: Duration,
    inflight: DashMap<JobId, ()>,
}

impl JobController {
    pub fn new(
        config: &ProcessorConfig,
        processor: Arc<dyn JobProcessor>,
        runs: RunStore,
        configs: Arc<dyn ConfigStore>,
        reports: Arc<dyn ReportStore>,
        archive: Option<Arc<dyn ArchiveBackend>>,
        sweeper: Option<Arc<Sweeper>>,
    ) -> Self {
        Self {
            processor,
            runs,
            configs,
            reports,
            archive,
            sweeper,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            abort_attempts: config.abort_attempts,
            abort_backoff: Duration::from_millis(config.abort_backoff_ms),
            inflight: DashMap::new(),
        }
    }

    /// Runs one fired job to completion: dispatch plus poll for process
    /// actions, local execution for ingest and sweep actions.
    #[instrument(skip_all, fields(job_id = %fired.job.id, name = %fired.job.name))]
    pub async fn execute(&self, fired: FiredJob, shutdown: watch::Receiver<bool>) -> Result<()> {
        let job = fired.job;
        let Some(_guard) = self.try_claim(&job.id) else {
            info!("job already executing, fire skipped");
            return Ok(());
        };

        match &job.action {
            JobAction::Process { request } => {
                if let SubmitOutcome::Submitted(token) = self.submit(&job, request).await? {
                    self.poll(&token, &job.id, shutdown).await?;
                }
                Ok(())
            }
            JobAction::Ingest { subdirectory } => {
                if let Some(run) = self.runs.active_run(&job.id)? {
                    info!(token = %run.token, "run still in flight, ingest skipped");
                    return Ok(());
                }
                self.run_ingest(&job, subdirectory).await
            }
            JobAction::Sweep => {
                if let Some(run) = self.runs.active_run(&job.id)? {
                    info!(token = %run.token, "run still in flight, sweep skipped");
                    return Ok(());
                }
                self.run_sweep(&job).await
            }
        }
    }

    /// Dispatches a processing request to the remote processor.
    ///
    /// A fire while an earlier run is still live is a logged no-op, never an
    /// error; the job simply waits for its next occurrence. A dispatch the
    /// processor refuses is recorded as an immediately failed run.
    pub async fn submit(&self, job: &JobConfiguration, request: &Value) -> Result<SubmitOutcome> {
        if let Some(run) = self.runs.active_run(&job.id)? {
            info!(
                job_id = %job.id,
                token = %run.token,
                status = %run.status,
                "run still in flight, dispatch skipped"
            );
            return Ok(SubmitOutcome::Skipped);
        }

        match self.processor.submit(request).await {
            Ok(token) => {
                self.runs.record_queued(&token, &job.id, true)?;
                if let Err(err) = self.configs.set_latest_run(&job.id, &token) {
                    warn!(job_id = %job.id, error = %err, "could not write back latest run token");
                }
                info!(job_id = %job.id, %token, "job dispatched");
                Ok(SubmitOutcome::Submitted(token))
            }
            Err(err) => {
                let token = RunToken::generate();
                let detail = format!("dispatch failed: {err}");
                warn!(job_id = %job.id, %token, error = %err, "dispatch failed, recording failed run");
                self.runs.record_queued(&token, &job.id, false)?;
                self.runs
                    .mark_terminal(&token, RunStatus::Failed, Some(&detail))?;
                self.put_report(&token, &job.id, RunStatus::Failed, Some(detail), None);
                Ok(SubmitOutcome::Failed(token))
            }
        }
    }

    /// Polls a dispatched run until it reaches a terminal state, the poll
    /// budget runs out, or shutdown is requested.
    ///
    /// The first status query happens before any sleep, so a re-attached run
    /// starts from fresh remote state instead of a stale cadence. Transient
    /// query errors are retried at the poll cadence; the last one becomes the
    /// run detail if the budget runs out. Returns the terminal status, or the
    /// last known local state when shutdown interrupts polling.
    #[instrument(skip_all, fields(token = %token, job_id = %job_id))]
    pub async fn poll(
        &self,
        token: &RunToken,
        job_id: &JobId,
        shutdown: watch::Receiver<bool>,
    ) -> Result<RunStatus> {
        let mut shutdown = shutdown;
        let deadline = Instant::now() + self.poll_timeout;
        let mut last_error: Option<String> = None;
        let mut local = RunStatus::Queued;

        loop {
            if *shutdown.borrow() {
                info!("shutdown requested, run left for re-attachment");
                return Ok(local);
            }

            match self.processor.status(token).await {
                Ok(progress) => match progress.status.as_run_status() {
                    Some(RunStatus::Running) if local == RunStatus::Queued => {
                        if self.runs.mark_running(token)? {
                            info!("run started");
                        }
                        local = RunStatus::Running;
                    }
                    Some(status) if status.is_terminal() => {
                        let detail = progress.verbose.clone();
                        self.runs.mark_terminal(token, status, detail.as_deref())?;
                        self.put_report(token, job_id, status, detail, Some(progress.body));
                        info!(%status, "run finished");
                        return Ok(status);
                    }
                    Some(_) => {}
                    None => {
                        debug!(status = %progress.status, "unknown remote status, state kept");
                    }
                },
                Err(err) => {
                    debug!(error = %err, "status query failed, will retry");
                    last_error = Some(err.to_string());
                }
            }

            if Instant::now() >= deadline {
                let detail = last_error.unwrap_or_else(|| {
                    format!(
                        "no terminal state within {}s",
                        self.poll_timeout.as_secs()
                    )
                });
                self.runs
                    .mark_terminal(token, RunStatus::Timeout, Some(&detail))?;
                self.put_report(token, job_id, RunStatus::Timeout, Some(detail), None);
                warn!("poll budget exhausted, run marked timed out");
                return Err(JobError::PollTimeout {
                    token: token.clone(),
                    secs: self.poll_timeout.as_secs(),
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Aborts the active run of a job.
    ///
    /// Local runs are marked directly. Remote runs get a cancel request and
    /// a bounded confirmation loop with doubling backoff; when the processor
    /// never confirms a terminal state the failure surfaces to the caller
    /// and the run stays live.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn abort(&self, job_id: &JobId) -> Result<RunStatus> {
        let Some(run) = self.runs.active_run(job_id)? else {
            return Err(JobError::NoActiveRun {
                job_id: job_id.clone(),
            });
        };

        if !run.remote {
            let detail = "aborted by operator";
            self.runs
                .mark_terminal(&run.token, RunStatus::Aborted, Some(detail))?;
            self.put_report(
                &run.token,
                job_id,
                RunStatus::Aborted,
                Some(detail.to_string()),
                None,
            );
            info!(token = %run.token, "local run aborted");
            return Ok(RunStatus::Aborted);
        }

        if let Err(err) = self.processor.cancel(&run.token).await {
            warn!(token = %run.token, error = %err, "cancel request failed");
        }

        let mut backoff = self.abort_backoff;
        for attempt in 1..=self.abort_attempts {
            tokio::time::sleep(backoff).await;
            match self.processor.status(&run.token).await {
                Ok(progress) => {
                    if let Some(status) = progress.status.as_run_status() {
                        if status.is_terminal() {
                            let detail = progress.verbose.clone();
                            self.runs
                                .mark_terminal(&run.token, status, detail.as_deref())?;
                            self.put_report(&run.token, job_id, status, detail, Some(progress.body));
                            info!(token = %run.token, %status, attempt, "abort confirmed");
                            return Ok(status);
                        }
                    }
                }
                Err(err) => {
                    debug!(token = %run.token, error = %err, attempt, "abort confirmation query failed");
                }
            }
            backoff *= 2;
        }

        warn!(token = %run.token, attempts = self.abort_attempts, "abort unconfirmed");
        Err(JobError::AbortUnconfirmed {
            job_id: job_id.clone(),
            attempts: self.abort_attempts,
        })
    }

    /// Reconciles stored runs after a restart.
    ///
    /// Local leftovers are closed as aborted; timed-out remote runs get one
    /// fresh status query so a late remote outcome can overwrite the
    /// timeout; live remote runs resume polling on background tasks. Returns
    /// the number of polls resumed. No run is submitted twice.
    pub async fn reattach(self: &Arc<Self>, shutdown: &watch::Receiver<bool>) -> Result<usize> {
        let mut resumed = 0;
        for run in self.runs.reconcilable()? {
            if !run.remote {
                let detail = "interrupted by restart";
                self.runs
                    .mark_terminal(&run.token, RunStatus::Aborted, Some(detail))?;
                self.put_report(
                    &run.token,
                    &run.job_id,
                    RunStatus::Aborted,
                    Some(detail.to_string()),
                    None,
                );
                info!(token = %run.token, job_id = %run.job_id, "local run closed after restart");
                continue;
            }

            if run.status == RunStatus::Timeout {
                match self.processor.status(&run.token).await {
                    Ok(progress) => {
                        if let Some(status) = progress.status.as_run_status() {
                            if status.is_terminal() {
                                let detail = progress.verbose.clone();
                                self.runs
                                    .mark_terminal(&run.token, status, detail.as_deref())?;
                                self.put_report(
                                    &run.token,
                                    &run.job_id,
                                    status,
                                    detail,
                                    Some(progress.body),
                                );
                                info!(token = %run.token, %status, "timed-out run reconciled late");
                            }
                        }
                    }
                    Err(err) => {
                        debug!(token = %run.token, error = %err, "late reconciliation query failed");
                    }
                }
                continue;
            }

            info!(token = %run.token, job_id = %run.job_id, "re-attaching to run");
            let controller = Arc::clone(self);
            let run_shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Err(err) = controller.poll(&run.token, &run.job_id, run_shutdown).await {
                    error!(token = %run.token, error = %err, "re-attached poll failed");
                }
            });
            resumed += 1;
        }
        Ok(resumed)
    }

    /// Lists stored runs, optionally filtered by status.
    pub fn runs(&self, status: Option<RunStatus>) -> Result<Vec<JobRun>> {
        self.runs.list(status)
    }

    /// Executes an ingest action locally: trigger the deposit, then one
    /// status query. A failing status query never fails a triggered ingest;
    /// the report simply keeps the pending state.
    async fn run_ingest(&self, job: &JobConfiguration, subdirectory: &str) -> Result<()> {
        let token = RunToken::generate();
        self.runs.record_queued(&token, &job.id, false)?;
        if let Err(err) = self.configs.set_latest_run(&job.id, &token) {
            warn!(job_id = %job.id, error = %err, "could not write back latest run token");
        }

        let Some(archive) = &self.archive else {
            let detail = "no archive backend configured".to_string();
            warn!(job_id = %job.id, %token, "ingest fired without an archive backend");
            self.runs
                .mark_terminal(&token, RunStatus::Failed, Some(&detail))?;
            self.put_report(&token, &job.id, RunStatus::Failed, Some(detail), None);
            return Ok(());
        };

        self.runs.mark_running(&token)?;
        match archive.start_deposit(subdirectory).await {
            Ok(deposit_id) => {
                let deposit = match archive.get_deposit(&deposit_id).await {
                    Ok(deposit) => deposit,
                    Err(err) => {
                        debug!(%token, error = %err, "deposit status query failed after trigger");
                        Deposit::pending(&deposit_id)
                    }
                };
                let detail = format!("deposit {} {}", deposit.id, deposit.state);
                info!(job_id = %job.id, %token, deposit_id = %deposit.id, "ingest triggered");
                let data = serde_json::json!({ "deposit": deposit });
                self.runs
                    .mark_terminal(&token, RunStatus::Completed, Some(&detail))?;
                self.put_report(&token, &job.id, RunStatus::Completed, Some(detail), Some(data));
                Ok(())
            }
            Err(err) => {
                let detail = format!("deposit trigger failed: {err}");
                warn!(job_id = %job.id, %token, error = %err, "ingest failed");
                self.runs
                    .mark_terminal(&token, RunStatus::Failed, Some(&detail))?;
                self.put_report(&token, &job.id, RunStatus::Failed, Some(detail), None);
                Ok(())
            }
        }
    }

    /// Executes a sweep action locally.
    async fn run_sweep(&self, job: &JobConfiguration) -> Result<()> {
        let token = RunToken::generate();
        self.runs.record_queued(&token, &job.id, false)?;
        if let Err(err) = self.configs.set_latest_run(&job.id, &token) {
            warn!(job_id = %job.id, error = %err, "could not write back latest run token");
        }

        let Some(sweeper) = &self.sweeper else {
            let detail = "sweeper disabled".to_string();
            warn!(job_id = %job.id, %token, "sweep fired while the sweeper is disabled");
            self.runs
                .mark_terminal(&token, RunStatus::Failed, Some(&detail))?;
            self.put_report(&token, &job.id, RunStatus::Failed, Some(detail), None);
            return Ok(());
        };

        self.runs.mark_running(&token)?;
        match sweeper.sweep(Utc::now()) {
            Ok(stats) => {
                let detail = format!(
                    "discovered {}, expired {}, reconciled {}, failed {}",
                    stats.discovered, stats.expired, stats.reconciled, stats.failed
                );
                self.runs
                    .mark_terminal(&token, RunStatus::Completed, Some(&detail))?;
                self.put_report(
                    &token,
                    &job.id,
                    RunStatus::Completed,
                    Some(detail),
                    Some(serde_json::json!(stats)),
                );
                Ok(())
            }
            Err(err) => {
                let detail = format!("sweep failed: {err}");
                warn!(job_id = %job.id, %token, error = %err, "sweep failed");
                self.runs
                    .mark_terminal(&token, RunStatus::Failed, Some(&detail))?;
                self.put_report(&token, &job.id, RunStatus::Failed, Some(detail), None);
                Ok(())
            }
        }
    }

    /// Appends the terminal report. Report-store failures are logged, never
    /// propagated into the run outcome.
    fn put_report(
        &self,
        token: &RunToken,
        job_id: &JobId,
        status: RunStatus,
        detail: Option<String>,
        data: Option<Value>,
    ) {
        let report = RunReport {
            token: token.clone(),
            job_id: job_id.clone(),
            status,
            detail,
            data,
            finished: Utc::now(),
        };
        if let Err(err) = self.reports.put(report) {
            warn!(%token, error = %err, "could not store run report");
        }
    }

    /// Claims a job id for the duration of one execution. The claim closes
    /// the gap between the run-store read and the first write when the same
    /// job is fired twice in quick succession.
    fn try_claim(&self, id: &JobId) -> Option<InflightGuard<'_>> {
        use dashmap::mapref::entry::Entry;
        match self.inflight.entry(id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(());
                Some(InflightGuard {
                    inflight: &self.inflight,
                    id: id.clone(),
                })
            }
        }
    }
}

struct InflightGuard<'a> {
    inflight: &'a DashMap<JobId, ()>,
    id: JobId,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.remove(&self.id);
    }
}
