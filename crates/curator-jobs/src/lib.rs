//! Job execution for curator.
//!
//! Consumes fired jobs from the scheduler, dispatches them to the remote
//! job processor (or runs them locally for ingest and sweep actions), and
//! tracks every run in a SQLite-backed run store.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `controller` | Dispatch, poll and abort logic per job |
//! | `db` | Run table schema |
//! | `processor` | HTTP client for the remote job processor |
//! | `store` | Persistent run records |
//! | `types` | Run records and remote status vocabulary |
//! | `worker` | Worker pool draining the fired-job channel |

pub mod controller;
pub mod db;
pub mod error;
pub mod processor;
pub mod store;
pub mod types;
pub mod worker;

pub use controller::JobController;
pub use error::{JobError, Result};
pub use processor::{HttpProcessor, JobProcessor, Progress};
pub use store::RunStore;
pub use types::{JobRun, RemoteStatus, SubmitOutcome};
pub use worker::WorkerPool;
