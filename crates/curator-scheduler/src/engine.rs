use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use curator_core::{JobConfiguration, JobId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    recurrence::{first_occurrence, next_occurrence, validate},
    types::{FiredJob, SchedulePlan, ScheduledEntry},
};

/// Bound on the fired-job channel. A full channel defers the firing to the
/// next tick instead of ever blocking the loop.
pub const FIRED_CHANNEL_CAPACITY: usize = 64;

type Registry = Arc<Mutex<HashMap<JobId, ScheduledEntry>>>;

/// Shared handle for registry management (schedule/cancel/plans) while the
/// engine loop runs. Safe to call from concurrent request-handling contexts;
/// every operation takes the registry lock only for the duration of the map
/// access.
#[derive(Clone)]
pub struct SchedulerHandle {
    registry: Registry,
    tz: Tz,
}

impl SchedulerHandle {
    /// Register or replace the entry for `job.id`. Returns the computed next
    /// trigger; `None` means the entry is recorded but will never fire
    /// (inactive, or the rule is already exhausted).
    pub fn schedule(&self, job: JobConfiguration) -> Result<Option<DateTime<Utc>>> {
        self.schedule_at(job, Utc::now())
    }

    /// Registration against an explicit clock. The engine tests drive this
    /// directly; production code goes through [`Self::schedule`].
    pub fn schedule_at(
        &self,
        job: JobConfiguration,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        validate(&job.schedule)?;
        let anchor = first_occurrence(&job.schedule, now, self.tz);

        let id = job.id.clone();
        let name = job.name.clone();
        let entry = ScheduledEntry {
            job,
            anchor,
            next_trigger: anchor,
        };

        let mut registry = self.registry.lock().expect("entry registry poisoned");
        let replaced = registry.insert(id.clone(), entry).is_some();
        info!(job_id = %id, %name, replaced, next = ?anchor, "job scheduled");
        Ok(anchor)
    }

    /// Remove the entry for `id`. Unknown ids are a no-op; cancelling only
    /// prevents future firings and never touches an in-flight run.
    pub fn cancel(&self, id: &JobId) -> bool {
        let mut registry = self.registry.lock().expect("entry registry poisoned");
        let removed = registry.remove(id).is_some();
        drop(registry);
        if removed {
            info!(job_id = %id, "job cancelled");
        } else {
            debug!(job_id = %id, "cancel for unknown job ignored");
        }
        removed
    }

    /// Snapshot of all registered entries, soonest trigger first, entries
    /// that never fire at the end.
    pub fn plans(&self) -> Vec<SchedulePlan> {
        let registry = self.registry.lock().expect("entry registry poisoned");
        let mut plans: Vec<SchedulePlan> = registry
            .values()
            .map(|entry| SchedulePlan {
                job_id: entry.job.id.clone(),
                name: entry.job.name.clone(),
                active: entry.job.schedule.active,
                next_trigger: entry.next_trigger,
            })
            .collect();
        drop(registry);
        plans.sort_by(|a, b| {
            a.next_trigger
                .is_none()
                .cmp(&b.next_trigger.is_none())
                .then(a.next_trigger.cmp(&b.next_trigger))
                .then_with(|| a.job_id.as_str().cmp(b.job_id.as_str()))
        });
        plans
    }
}

/// Core scheduler: owns the tick loop and dispatches due jobs to the worker
/// channel at roughly tick-interval precision.
pub struct SchedulerEngine {
    registry: Registry,
    tz: Tz,
    tick: Duration,
    fired_tx: mpsc::Sender<FiredJob>,
}

impl SchedulerEngine {
    pub fn new(tick: Duration, tz: Tz, fired_tx: mpsc::Sender<FiredJob>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            tz,
            tick,
            fired_tx,
        }
    }

    /// A management handle sharing this engine's registry.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            registry: Arc::clone(&self.registry),
            tz: self.tz,
        }
    }

    /// Main event loop. Ticks until `shutdown` broadcasts `true`; the
    /// in-flight tick always completes before the loop exits. Takes the
    /// engine by `Arc` so a stopped loop can be started again over the same
    /// registry.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(tick_ms = self.tick.as_millis() as u64, "scheduler engine started");
        let mut interval = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_pending(Utc::now()) {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One tick: fire every entry whose trigger has elapsed at `now`.
    ///
    /// Returns the number of jobs dispatched. Each entry fires at most once
    /// per tick, and its next occurrence is stored only after the worker
    /// channel acknowledged the handoff; a full channel leaves the entry due
    /// so the next tick retries.
    pub fn run_pending(&self, now: DateTime<Utc>) -> Result<usize> {
        // Snapshot due entries eagerly so the lock is never held across
        // dispatch.
        let due: Vec<JobConfiguration> = {
            let registry = self.registry.lock().expect("entry registry poisoned");
            registry
                .values()
                .filter(|e| e.next_trigger.is_some_and(|t| t <= now))
                .map(|e| e.job.clone())
                .collect()
        };

        let mut fired = 0;
        for job in due {
            let id = job.id.clone();
            let name = job.name.clone();
            let stamp = job.last_modified;
            match self.fired_tx.try_send(FiredJob { job, fired_at: now }) {
                Ok(()) => {
                    info!(job_id = %id, %name, "job fired");
                    fired += 1;
                    self.advance(&id, stamp, now);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(job_id = %id, "worker channel full, firing deferred to next tick");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(SchedulerError::ChannelClosed);
                }
            }
        }
        Ok(fired)
    }

    /// After a dispatch acknowledgment, move the entry to its next occurrence
    /// or drop it when the rule is exhausted.
    fn advance(&self, id: &JobId, dispatched_stamp: DateTime<Utc>, now: DateTime<Utc>) {
        let mut registry = self.registry.lock().expect("entry registry poisoned");
        let Some(entry) = registry.get_mut(id) else {
            // Cancelled while the lock was released.
            return;
        };
        if entry.job.last_modified != dispatched_stamp {
            // Replaced while the lock was released; the new registration
            // governs from here on.
            debug!(job_id = %id, "entry replaced during dispatch");
            return;
        }
        let anchor = entry.anchor.unwrap_or(now);
        match next_occurrence(&entry.job.schedule, anchor, now, self.tz) {
            Some(next) => {
                entry.next_trigger = Some(next);
                debug!(job_id = %id, next = %next, "next occurrence stored");
            }
            None => {
                registry.remove(id);
                info!(job_id = %id, "schedule exhausted, entry removed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use curator_core::{JobAction, Schedule, TimeUnit};

    fn config(id: &str) -> JobConfiguration {
        JobConfiguration {
            id: id.into(),
            name: id.to_string(),
            action: JobAction::Sweep,
            schedule: Schedule::every(TimeUnit::Second, 2),
            last_modified: Utc::now(),
            latest_run: None,
        }
    }

    fn engine_with_capacity(capacity: usize) -> (SchedulerEngine, mpsc::Receiver<FiredJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            SchedulerEngine::new(Duration::from_millis(10), Tz::UTC, tx),
            rx,
        )
    }

    #[test]
    fn fires_due_entry_and_stores_next_occurrence() {
        let (engine, mut rx) = engine_with_capacity(8);
        let handle = engine.handle();
        let t0 = Utc::now();

        let next = handle.schedule_at(config("a"), t0).unwrap();
        assert_eq!(next, Some(t0));

        assert_eq!(engine.run_pending(t0).unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap().job.id, "a".into());

        let plans = handle.plans();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].next_trigger, Some(t0 + ChronoDuration::seconds(2)));

        // Not due again until the stored occurrence arrives.
        assert_eq!(engine.run_pending(t0 + ChronoDuration::seconds(1)).unwrap(), 0);
        assert_eq!(engine.run_pending(t0 + ChronoDuration::seconds(2)).unwrap(), 1);
    }

    #[test]
    fn one_time_entry_is_removed_after_firing() {
        let (engine, mut rx) = engine_with_capacity(8);
        let handle = engine.handle();
        let t0 = Utc::now();
        let at = t0 + ChronoDuration::seconds(5);

        let mut job = config("once");
        job.schedule = Schedule::once(at);
        assert_eq!(handle.schedule_at(job, t0).unwrap(), Some(at));

        assert_eq!(engine.run_pending(t0).unwrap(), 0);
        assert_eq!(engine.run_pending(at).unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap().job.id, "once".into());
        assert!(handle.plans().is_empty());

        // Nothing left to fire.
        assert_eq!(engine.run_pending(at + ChronoDuration::seconds(60)).unwrap(), 0);
    }

    #[test]
    fn rescheduling_replaces_the_entry() {
        let (engine, mut rx) = engine_with_capacity(8);
        let handle = engine.handle();
        let t0 = Utc::now();

        let mut first = config("job");
        first.last_modified = t0;
        handle.schedule_at(first, t0).unwrap();

        let mut second = config("job");
        second.schedule = Schedule::every(TimeUnit::Second, 10);
        second.last_modified = t0 + ChronoDuration::seconds(1);
        handle.schedule_at(second, t0).unwrap();

        assert_eq!(handle.plans().len(), 1);

        // The latest registration's rule governs the recomputed trigger.
        assert_eq!(engine.run_pending(t0).unwrap(), 1);
        rx.try_recv().unwrap();
        let plans = handle.plans();
        assert_eq!(plans[0].next_trigger, Some(t0 + ChronoDuration::seconds(10)));
    }

    #[test]
    fn cancel_is_a_noop_for_unknown_ids() {
        let (engine, _rx) = engine_with_capacity(8);
        let handle = engine.handle();
        assert!(!handle.cancel(&"ghost".into()));
    }

    #[test]
    fn inactive_entry_is_recorded_but_never_fires() {
        let (engine, mut rx) = engine_with_capacity(8);
        let handle = engine.handle();
        let t0 = Utc::now();

        let mut job = config("idle");
        job.schedule = Schedule::inactive();
        assert_eq!(handle.schedule_at(job, t0).unwrap(), None);

        let plans = handle.plans();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].next_trigger, None);
        assert!(!plans[0].active);

        assert_eq!(engine.run_pending(t0 + ChronoDuration::days(1)).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn invalid_rule_is_rejected_at_registration() {
        let (engine, _rx) = engine_with_capacity(8);
        let handle = engine.handle();

        let mut job = config("bad");
        job.schedule.repeat.as_mut().unwrap().interval = 0;
        assert!(matches!(
            handle.schedule(job),
            Err(SchedulerError::InvalidSchedule(_))
        ));
        assert!(handle.plans().is_empty());
    }

    #[test]
    fn full_channel_defers_firing_to_the_next_tick() {
        let (engine, mut rx) = engine_with_capacity(1);
        let handle = engine.handle();
        let t0 = Utc::now();

        handle.schedule_at(config("a"), t0).unwrap();
        handle.schedule_at(config("b"), t0).unwrap();

        // Capacity one: a single dispatch succeeds, the other stays due.
        assert_eq!(engine.run_pending(t0).unwrap(), 1);
        let first = rx.try_recv().unwrap().job.id;

        assert_eq!(engine.run_pending(t0).unwrap(), 1);
        let second = rx.try_recv().unwrap().job.id;
        assert_ne!(first, second);
    }

    #[test]
    fn two_second_repeat_fires_five_times_in_ten_ticks_then_cancel_stops_it() {
        let (engine, mut rx) = engine_with_capacity(16);
        let handle = engine.handle();
        let t0 = Utc::now();

        handle.schedule_at(config("metronome"), t0).unwrap();

        let mut fired = 0;
        for tick in 0..10 {
            fired += engine
                .run_pending(t0 + ChronoDuration::seconds(tick))
                .unwrap();
        }
        assert_eq!(fired, 5); // t0, +2, +4, +6, +8

        assert!(handle.cancel(&"metronome".into()));
        for tick in 10..13 {
            assert_eq!(
                engine
                    .run_pending(t0 + ChronoDuration::seconds(tick))
                    .unwrap(),
                0
            );
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 5);
    }

    #[tokio::test]
    async fn engine_loop_fires_and_shuts_down() {
        let (tx, mut rx) = mpsc::channel(8);
        let engine = Arc::new(SchedulerEngine::new(Duration::from_millis(10), Tz::UTC, tx));
        let handle = engine.handle();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&engine).run(stop_rx));

        let mut job = config("loop-job");
        job.schedule = Schedule::once(Utc::now() + ChronoDuration::milliseconds(30));
        handle.schedule(job).unwrap();

        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("engine should fire before the timeout")
            .expect("channel should stay open");
        assert_eq!(fired.job.id, "loop-job".into());

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("engine should stop after the shutdown signal")
            .unwrap();
    }
}
