use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

// Tuning defaults shared across the workspace
pub const DEFAULT_TICK_MS: u64 = 1_000;
pub const DEFAULT_PROCESSOR_URL: &str = "http://localhost:8086";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000; // status query cadence
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30; // overall budget per run
pub const DEFAULT_ABORT_ATTEMPTS: u32 = 3;
pub const DEFAULT_ABORT_BACKOFF_MS: u64 = 500;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3_600;
pub const DEFAULT_ARTIFACT_TTL_SECS: u64 = 86_400;

/// Top-level config (curator.toml + CURATOR_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratorConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    /// Absent means no archive backend is configured; ingest actions fail
    /// with a configuration error instead of reaching the network.
    #[serde(default)]
    pub archive: Option<ArchiveConfig>,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            processor: ProcessorConfig::default(),
            archive: None,
            sweeper: SweeperConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Control-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seed the registry from the configuration store and start the tick
    /// loop at process startup (default: true).
    /// Override with env var: CURATOR_SCHEDULER_STARTUP=false
    #[serde(default = "bool_true")]
    pub startup: bool,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// IANA timezone name used to evaluate wall-clock schedule targets.
    /// Falls back to the system timezone, then UTC.
    pub timezone: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            startup: true,
            tick_ms: DEFAULT_TICK_MS,
            timezone: None,
        }
    }
}

impl SchedulerConfig {
    /// Resolve the effective timezone. A configured name that does not parse
    /// is a hard error so bad deployments fail at startup, not at first fire.
    pub fn resolve_timezone(&self) -> Result<Tz> {
        match &self.timezone {
            Some(name) => name
                .parse()
                .map_err(|_| CoreError::UnknownTimezone(name.clone())),
            None => Ok(system_timezone()),
        }
    }
}

fn system_timezone() -> Tz {
    iana_time_zone::get_timezone()
        .ok()
        .and_then(|name| name.parse().ok())
        .unwrap_or(Tz::UTC)
}

/// Remote Job Processor client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default = "default_processor_url")]
    pub url: String,
    /// Per-HTTP-call timeout; a hung connection never eats the poll budget.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Overall polling budget per run before the run is marked timed out.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_abort_attempts")]
    pub abort_attempts: u32,
    #[serde(default = "default_abort_backoff_ms")]
    pub abort_backoff_ms: u64,
    /// Worker pool size, the upper bound on concurrently polled runs.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            url: default_processor_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            abort_attempts: DEFAULT_ABORT_ATTEMPTS,
            abort_backoff_ms: DEFAULT_ABORT_BACKOFF_MS,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Supported archive backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveKind {
    /// REST deposit API, v0 wire contract, HTTP Basic authentication.
    RestV0,
}

/// Archive backend settings. `kind` selects the implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub kind: ArchiveKind,
    pub url: String,
    pub producer: String,
    pub material_flow: String,
    /// Path to a credentials file containing an `Authorization: Basic ...`
    /// header line. Takes precedence over `username`/`password`.
    pub auth_file: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Artifact lifecycle sweeper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    /// Artifacts live this long after first observation.
    #[serde(default = "default_artifact_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_storage_root")]
    pub storage_root: String,
    /// Directories under `storage_root` whose direct children are swept.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Objects modified more recently than this are left alone; defaults to
    /// the sweep interval.
    pub min_age_secs: Option<u64>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            ttl_secs: DEFAULT_ARTIFACT_TTL_SECS,
            storage_root: default_storage_root(),
            targets: Vec::new(),
            min_age_secs: None,
        }
    }
}

impl SweeperConfig {
    pub fn min_age_secs(&self) -> u64 {
        self.min_age_secs.unwrap_or(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}
fn default_processor_url() -> String {
    DEFAULT_PROCESSOR_URL.to_string()
}
fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_poll_timeout_secs() -> u64 {
    DEFAULT_POLL_TIMEOUT_SECS
}
fn default_abort_attempts() -> u32 {
    DEFAULT_ABORT_ATTEMPTS
}
fn default_abort_backoff_ms() -> u64 {
    DEFAULT_ABORT_BACKOFF_MS
}
fn default_workers() -> usize {
    DEFAULT_WORKERS
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_artifact_ttl_secs() -> u64 {
    DEFAULT_ARTIFACT_TTL_SECS
}
fn default_storage_root() -> String {
    "storage".to_string()
}
fn default_db_path() -> String {
    "curator.db".to_string()
}

impl CuratorConfig {
    /// Load config from a TOML file with CURATOR_* env var overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or("curator.toml");

        let config: CuratorConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CURATOR_").split("_"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_expectations() {
        let cfg = CuratorConfig::default();
        assert!(cfg.scheduler.startup);
        assert_eq!(cfg.scheduler.tick_ms, 1_000);
        assert_eq!(cfg.processor.url, "http://localhost:8086");
        assert_eq!(cfg.processor.poll_timeout_secs, 30);
        assert_eq!(cfg.processor.poll_interval_ms, 1_000);
        assert_eq!(cfg.sweeper.ttl_secs, 86_400);
        assert!(cfg.archive.is_none());
    }

    #[test]
    fn min_age_falls_back_to_sweep_interval() {
        let mut sweeper = SweeperConfig::default();
        assert_eq!(sweeper.min_age_secs(), sweeper.interval_secs);
        sweeper.min_age_secs = Some(5);
        assert_eq!(sweeper.min_age_secs(), 5);
    }

    #[test]
    fn explicit_timezone_must_parse() {
        let mut scheduler = SchedulerConfig::default();
        scheduler.timezone = Some("Europe/Berlin".to_string());
        assert_eq!(scheduler.resolve_timezone().unwrap(), chrono_tz::Europe::Berlin);

        scheduler.timezone = Some("Mars/OlympusMons".to_string());
        assert!(scheduler.resolve_timezone().is_err());
    }
}
