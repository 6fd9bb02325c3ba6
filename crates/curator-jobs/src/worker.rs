//! Worker pool draining the fired-job channel.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{error, info};

use crate::controller::JobController;
use curator_scheduler::FiredJob;

/// Bounded pool executing fired jobs.
///
/// Each permit covers the whole execute-then-poll sequence, so at most
/// `workers` runs are polled concurrently and a slow run never blocks the
/// scheduler tick loop, only its siblings in the pool.
pub struct WorkerPool {
    controller: Arc<JobController>,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(controller: Arc<JobController>, workers: usize) -> Self {
        Self {
            controller,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Drains the fired-job channel until shutdown or channel close.
    ///
    /// A permit is acquired before the job is spawned, so a full pool exerts
    /// backpressure onto the bounded channel instead of stacking tasks.
    pub async fn run(
        &self,
        mut fired_rx: mpsc::Receiver<FiredJob>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("worker pool started");
        loop {
            tokio::select! {
                maybe_fired = fired_rx.recv() => {
                    let Some(fired) = maybe_fired else {
                        info!("fired-job channel closed");
                        break;
                    };
                    let permit = Arc::clone(&self.permits)
                        .acquire_owned()
                        .await
                        .expect("worker semaphore closed");
                    let controller = Arc::clone(&self.controller);
                    let job_shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        let job_id = fired.job.id.clone();
                        if let Err(err) = controller.execute(fired, job_shutdown).await {
                            error!(%job_id, error = %err, "job execution failed");
                        }
                        drop(permit);
                    });
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::processor::{JobProcessor, Progress};
    use crate::store::RunStore;
    use crate::types::RemoteStatus;
    use async_trait::async_trait;
    use chrono::Utc;
    use curator_core::config::ProcessorConfig;
    use curator_core::{
        JobAction, JobConfiguration, JobId, MemoryConfigStore, MemoryReportStore, RunStatus,
        RunToken, Schedule, TimeUnit,
    };
    use rusqlite::Connection;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct OneShotProcessor;

    #[async_trait]
    impl JobProcessor for OneShotProcessor {
        async fn submit(&self, _request: &Value) -> Result<RunToken> {
            Ok(RunToken::generate())
        }

        async fn status(&self, _token: &RunToken) -> Result<Progress> {
            Ok(Progress {
                status: RemoteStatus::Completed,
                verbose: Some("done".to_string()),
                body: json!({"status": "completed"}),
            })
        }

        async fn cancel(&self, _token: &RunToken) -> Result<()> {
            Ok(())
        }
    }

    fn controller() -> Arc<JobController> {
        let config = ProcessorConfig {
            poll_interval_ms: 10,
            poll_timeout_secs: 1,
            ..ProcessorConfig::default()
        };
        let runs = RunStore::new(Connection::open_in_memory().unwrap()).unwrap();
        Arc::new(JobController::new(
            &config,
            Arc::new(OneShotProcessor),
            runs,
            Arc::new(MemoryConfigStore::new()),
            Arc::new(MemoryReportStore::new()),
            None,
            None,
        ))
    }

    fn fired(name: &str) -> FiredJob {
        FiredJob {
            job: JobConfiguration {
                id: JobId::new(),
                name: name.to_string(),
                action: JobAction::Process {
                    request: json!({"process": {}}),
                },
                schedule: Schedule::every(TimeUnit::Second, 2),
                last_modified: Utc::now(),
                latest_run: None,
            },
            fired_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn pool_executes_queued_fires() {
        let controller = controller();
        let pool = WorkerPool::new(Arc::clone(&controller), 2);
        let (fired_tx, fired_rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        fired_tx.send(fired("first")).await.unwrap();
        fired_tx.send(fired("second")).await.unwrap();

        let handle = tokio::spawn(async move { pool.run(fired_rx, stop_rx).await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        let runs = controller.runs(None).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|run| run.status == RunStatus::Completed));
    }

    #[tokio::test]
    async fn pool_stops_when_shutdown_is_signalled() {
        let pool = WorkerPool::new(controller(), 1);
        let (_fired_tx, fired_rx) = mpsc::channel::<FiredJob>(1);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { pool.run(fired_rx, stop_rx).await });
        stop_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pool did not stop")
            .unwrap();
    }
}
