//! Process-wide orchestration facade.
//!
//! Owns the scheduling-loop lifecycle and fronts the admin operations a
//! management surface consumes: loop start/stop, status snapshots,
//! schedule/cancel, abort and run listing. Everything is constructed once in
//! `main` and handed in; there are no module-level singletons.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use curator_core::{ConfigStore, JobConfiguration, JobId, RunStatus};
use curator_jobs::{JobController, JobRun};
use curator_scheduler::{SchedulePlan, SchedulerEngine, SchedulerHandle};

/// One status snapshot: loop state, entry plans, non-terminal runs.
#[derive(Debug, Serialize)]
pub struct OrchestratorStatus {
    pub scheduling: bool,
    pub plans: Vec<SchedulePlan>,
    pub active_runs: Vec<JobRun>,
}

pub struct Orchestrator {
    engine: Arc<SchedulerEngine>,
    scheduler: SchedulerHandle,
    controller: Arc<JobController>,
    configs: Arc<dyn ConfigStore>,
    loop_task: Mutex<Option<LoopTask>>,
}

struct LoopTask {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<SchedulerEngine>,
        controller: Arc<JobController>,
        configs: Arc<dyn ConfigStore>,
    ) -> Self {
        let scheduler = engine.handle();
        Self {
            engine,
            scheduler,
            controller,
            configs,
            loop_task: Mutex::new(None),
        }
    }

    /// Starts the scheduling loop. Returns `false` when it is already
    /// running; the registry is shared, so a later start picks up every
    /// entry registered while the loop was stopped.
    pub fn start(&self) -> bool {
        let mut slot = self.loop_task.lock().expect("loop task slot poisoned");
        if slot.as_ref().is_some_and(|running| !running.task.is_finished()) {
            debug!("scheduling loop already running");
            return false;
        }
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&self.engine).run(stop_rx));
        *slot = Some(LoopTask { stop, task });
        info!("scheduling loop started");
        true
    }

    /// Stops the scheduling loop after its in-flight tick. Returns `false`
    /// when no loop is running. Worker tasks and their polls are untouched;
    /// stopping the loop only prevents future firings.
    pub async fn stop(&self) -> bool {
        let taken = self
            .loop_task
            .lock()
            .expect("loop task slot poisoned")
            .take();
        let Some(running) = taken else {
            debug!("scheduling loop not running");
            return false;
        };
        let _ = running.stop.send(true);
        if let Err(err) = running.task.await {
            warn!(error = %err, "scheduling loop task ended abnormally");
        }
        info!("scheduling loop stopped");
        true
    }

    pub fn status(&self) -> anyhow::Result<OrchestratorStatus> {
        let scheduling = self
            .loop_task
            .lock()
            .expect("loop task slot poisoned")
            .as_ref()
            .is_some_and(|running| !running.task.is_finished());
        let active_runs = self
            .controller
            .runs(None)?
            .into_iter()
            .filter(|run| !run.status.is_terminal())
            .collect();
        Ok(OrchestratorStatus {
            scheduling,
            plans: self.scheduler.plans(),
            active_runs,
        })
    }

    /// Persists a configuration and registers (or replaces) its entry.
    /// Returns the computed next trigger.
    pub fn schedule(&self, job: JobConfiguration) -> anyhow::Result<Option<DateTime<Utc>>> {
        self.configs.put(job.clone())?;
        let next = self.scheduler.schedule(job)?;
        Ok(next)
    }

    /// Removes the registry entry for `id`. The stored configuration and any
    /// in-flight run are untouched.
    pub fn cancel(&self, id: &JobId) -> bool {
        self.scheduler.cancel(id)
    }

    /// Aborts the active run of a job, confirming against the processor for
    /// remote runs.
    pub async fn abort(&self, id: &JobId) -> anyhow::Result<RunStatus> {
        Ok(self.controller.abort(id).await?)
    }

    pub fn runs(&self, status: Option<RunStatus>) -> anyhow::Result<Vec<JobRun>> {
        Ok(self.controller.runs(status)?)
    }

    /// Registers every stored configuration. Invalid rules are skipped with
    /// a warning so one bad configuration never blocks startup.
    pub fn seed(&self) -> anyhow::Result<usize> {
        let mut seeded = 0;
        for job in self.configs.list()? {
            let id = job.id.clone();
            match self.scheduler.schedule(job) {
                Ok(_) => seeded += 1,
                Err(err) => warn!(job_id = %id, error = %err, "stored configuration skipped"),
            }
        }
        info!(seeded, "registry seeded from configuration store");
        Ok(seeded)
    }
}
