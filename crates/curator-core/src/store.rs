use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{CoreError, Result};
use crate::types::{JobConfiguration, JobId, RunReport, RunToken};

/// Persistent home of job configurations.
///
/// The real backend lives outside this process; the orchestration crates only
/// ever see this trait. Implementations must be safe to call from concurrent
/// request-handling contexts.
pub trait ConfigStore: Send + Sync {
    fn get(&self, id: &JobId) -> Result<Option<JobConfiguration>>;
    fn list(&self) -> Result<Vec<JobConfiguration>>;
    /// Insert or replace wholesale; the caller owns `last_modified`.
    fn put(&self, config: JobConfiguration) -> Result<()>;
    /// Returns whether a configuration was actually removed.
    fn delete(&self, id: &JobId) -> Result<bool>;
    /// Write back the most recent dispatch token. Leaves `last_modified`
    /// untouched so the write-back never looks like an external edit.
    fn set_latest_run(&self, id: &JobId, token: &RunToken) -> Result<()>;
}

/// Append-only home of terminal run reports, keyed by run token.
pub trait ReportStore: Send + Sync {
    fn put(&self, report: RunReport) -> Result<()>;
    fn get(&self, token: &RunToken) -> Result<Option<RunReport>>;
}

/// Reference in-memory configuration store: the default backend when no
/// external adapter is deployed, and the test double everywhere else.
#[derive(Default)]
pub struct MemoryConfigStore {
    configs: Mutex<HashMap<JobId, JobConfiguration>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, id: &JobId) -> Result<Option<JobConfiguration>> {
        let configs = self.configs.lock().expect("config store poisoned");
        Ok(configs.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<JobConfiguration>> {
        let configs = self.configs.lock().expect("config store poisoned");
        Ok(configs.values().cloned().collect())
    }

    fn put(&self, config: JobConfiguration) -> Result<()> {
        let mut configs = self.configs.lock().expect("config store poisoned");
        configs.insert(config.id.clone(), config);
        Ok(())
    }

    fn delete(&self, id: &JobId) -> Result<bool> {
        let mut configs = self.configs.lock().expect("config store poisoned");
        Ok(configs.remove(id).is_some())
    }

    fn set_latest_run(&self, id: &JobId, token: &RunToken) -> Result<()> {
        let mut configs = self.configs.lock().expect("config store poisoned");
        let config = configs
            .get_mut(id)
            .ok_or_else(|| CoreError::Store(format!("unknown job configuration: {id}")))?;
        config.latest_run = Some(token.clone());
        Ok(())
    }
}

/// Reference in-memory report store.
#[derive(Default)]
pub struct MemoryReportStore {
    reports: Mutex<HashMap<RunToken, RunReport>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for MemoryReportStore {
    fn put(&self, report: RunReport) -> Result<()> {
        let mut reports = self.reports.lock().expect("report store poisoned");
        reports.insert(report.token.clone(), report);
        Ok(())
    }

    fn get(&self, token: &RunToken) -> Result<Option<RunReport>> {
        let reports = self.reports.lock().expect("report store poisoned");
        Ok(reports.get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobAction, RunStatus, Schedule};
    use chrono::Utc;

    fn config(id: &str) -> JobConfiguration {
        JobConfiguration {
            id: id.into(),
            name: format!("job {id}"),
            action: JobAction::Sweep,
            schedule: Schedule::inactive(),
            last_modified: Utc::now(),
            latest_run: None,
        }
    }

    #[test]
    fn put_replaces_wholesale() {
        let store = MemoryConfigStore::new();
        store.put(config("a")).unwrap();

        let mut updated = config("a");
        updated.name = "renamed".into();
        store.put(updated).unwrap();

        let got = store.get(&"a".into()).unwrap().unwrap();
        assert_eq!(got.name, "renamed");
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn set_latest_run_preserves_last_modified() {
        let store = MemoryConfigStore::new();
        store.put(config("a")).unwrap();
        let before = store.get(&"a".into()).unwrap().unwrap().last_modified;

        store.set_latest_run(&"a".into(), &"tok-1".into()).unwrap();

        let after = store.get(&"a".into()).unwrap().unwrap();
        assert_eq!(after.latest_run, Some("tok-1".into()));
        assert_eq!(after.last_modified, before);
    }

    #[test]
    fn set_latest_run_on_unknown_id_is_an_error() {
        let store = MemoryConfigStore::new();
        assert!(store.set_latest_run(&"ghost".into(), &"tok".into()).is_err());
    }

    #[test]
    fn delete_reports_whether_anything_was_removed() {
        let store = MemoryConfigStore::new();
        store.put(config("a")).unwrap();
        assert!(store.delete(&"a".into()).unwrap());
        assert!(!store.delete(&"a".into()).unwrap());
    }

    #[test]
    fn report_store_keyed_by_token() {
        let store = MemoryReportStore::new();
        store
            .put(RunReport {
                token: "tok-9".into(),
                job_id: "a".into(),
                status: RunStatus::Completed,
                detail: None,
                data: Some(serde_json::json!({"records": 3})),
                finished: Utc::now(),
            })
            .unwrap();

        let report = store.get(&"tok-9".into()).unwrap().unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert!(store.get(&"tok-0".into()).unwrap().is_none());
    }
}
