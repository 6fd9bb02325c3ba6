//! Pluggable archive backends for deposit activities.
//!
//! `ArchiveBackend` is the seam: the job controller only ever talks to the
//! trait. The `kind` field of the archive configuration selects the
//! implementation; `rest-v0` speaks a REST deposit API with HTTP Basic
//! authentication.

pub mod backend;
pub mod error;
pub mod rest;

pub use backend::{from_config, ArchiveBackend, Deposit, DepositState};
pub use error::{ArchiveError, Result};
pub use rest::RestArchive;
