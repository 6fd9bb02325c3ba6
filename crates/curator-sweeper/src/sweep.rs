//! The three-pass sweep.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::ArtifactStore;
use curator_core::config::SweeperConfig;

/// Outcome of one sweep, recorded in the run report.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SweepStats {
    /// New objects stamped with an expiry.
    pub discovered: usize,
    /// Expired objects deleted (or already gone) along with their records.
    pub expired: usize,
    /// Records dropped because their object vanished externally.
    pub reconciled: usize,
    /// Deletions that failed. The record is dropped anyway; the surviving
    /// object is re-stamped by discovery and retried a TTL later.
    pub failed: usize,
}

pub struct Sweeper {
    store: ArtifactStore,
    storage_root: PathBuf,
    targets: Vec<PathBuf>,
    ttl_secs: u64,
    min_age_secs: u64,
}

impl Sweeper {
    pub fn new(config: &SweeperConfig, conn: Connection) -> Result<Self> {
        let storage_root = PathBuf::from(&config.storage_root);
        let targets = config
            .targets
            .iter()
            .map(|t| storage_root.join(t))
            .collect();
        Ok(Self {
            store: ArtifactStore::new(conn)?,
            storage_root,
            targets,
            ttl_secs: config.ttl_secs,
            min_age_secs: config.min_age_secs(),
        })
    }

    /// Runs one sweep as of `now`: one directory listing, then the expiry,
    /// reconciliation and discovery passes.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepStats> {
        let mut stats = SweepStats::default();
        let listing = self.list_objects()?;

        for path in self.store.expired(&now.to_rfc3339())? {
            match remove_object(&self.storage_root.join(&path)) {
                Ok(()) => {
                    stats.expired += 1;
                    info!(artifact = %path, "expired artifact removed");
                }
                Err(err) => {
                    stats.failed += 1;
                    warn!(artifact = %path, error = %err, "could not remove expired artifact");
                }
            }
            self.store.remove(&path)?;
        }

        let listed: HashSet<&String> = listing.iter().collect();
        for path in self.store.recorded()? {
            if !listed.contains(&path) {
                self.store.remove(&path)?;
                stats.reconciled += 1;
                debug!(artifact = %path, "record dropped, object gone");
            }
        }

        let recorded: HashSet<String> = self.store.recorded()?.into_iter().collect();
        let expires_at = (now + Duration::seconds(self.ttl_secs as i64)).to_rfc3339();
        for path in &listing {
            if recorded.contains(path) {
                continue;
            }
            let object = self.storage_root.join(path);
            let modified = match object.metadata().and_then(|m| m.modified()) {
                Ok(mtime) => DateTime::<Utc>::from(mtime),
                // deleted between the listing and now
                Err(_) => continue,
            };
            if now.signed_duration_since(modified) < Duration::seconds(self.min_age_secs as i64) {
                debug!(artifact = %path, "object modified recently, left unstamped");
                continue;
            }
            self.store.insert(path, &now.to_rfc3339(), &expires_at)?;
            stats.discovered += 1;
            info!(artifact = %path, %expires_at, "artifact recorded");
        }

        info!(
            discovered = stats.discovered,
            expired = stats.expired,
            reconciled = stats.reconciled,
            failed = stats.failed,
            "sweep completed"
        );
        Ok(stats)
    }

    /// One listing of every target directory's direct children, as paths
    /// relative to the storage root. A missing target is skipped, not an
    /// error; producers create those directories on demand.
    fn list_objects(&self) -> Result<Vec<String>> {
        let mut objects = Vec::new();
        for target in &self.targets {
            let entries = match std::fs::read_dir(target) {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!(target = %target.display(), "sweep target missing, skipped");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            for entry in entries {
                let path = entry?.path();
                match path.strip_prefix(&self.storage_root) {
                    Ok(rel) => objects.push(rel.to_string_lossy().into_owned()),
                    Err(_) => {
                        warn!(object = %path.display(), "object outside storage root, skipped")
                    }
                }
            }
        }
        Ok(objects)
    }
}

/// Deletes a file or directory; a missing object is not an error.
fn remove_object(object: &Path) -> std::io::Result<()> {
    if object.is_dir() {
        std::fs::remove_dir_all(object)
    } else if object.is_file() {
        std::fs::remove_file(object)
    } else {
        Ok(())
    }
}
