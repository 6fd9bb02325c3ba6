//! Artifact lifecycle management for shared storage.
//!
//! Producers drop artifacts into target directories under the shared storage
//! root; nothing tells this process about them. The sweeper discovers new
//! objects, stamps them with an expiry, and deletes them once the TTL has
//! passed. Runs as a recurring scheduled job.

pub mod db;
pub mod error;
pub mod store;
pub mod sweep;

pub use error::{Result, SweeperError};
pub use store::{ArtifactRecord, ArtifactStore};
pub use sweep::{SweepStats, Sweeper};
