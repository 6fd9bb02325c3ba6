//! `curator-core`: shared model types, configuration, and collaborator traits.
//!
//! # Overview
//!
//! Everything the subsystem crates agree on lives here: the job-configuration
//! model ([`types::JobConfiguration`] with its [`types::Schedule`]), the run
//! status vocabulary, the figment-backed [`config::CuratorConfig`], and the
//! narrow store traits ([`store::ConfigStore`], [`store::ReportStore`]) behind
//! which the persistent configuration/report backends sit. The in-memory store
//! implementations here are the reference backends; deployments swap in real
//! adapters without the orchestration crates noticing.

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::CuratorConfig;
pub use error::{CoreError, Result};
pub use store::{ConfigStore, MemoryConfigStore, MemoryReportStore, ReportStore};
pub use types::{
    JobAction, JobConfiguration, JobId, Repeat, RunReport, RunStatus, RunToken, Schedule,
    TimeOfDay, TimeUnit, Weekday,
};
