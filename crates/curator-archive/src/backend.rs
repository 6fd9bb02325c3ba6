//! Archive backend abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::rest::RestArchive;
use curator_core::config::{ArchiveConfig, ArchiveKind};

/// Deposit lifecycle, normalized across backends. Each implementation maps
/// its own wire vocabulary onto this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositState {
    /// Triggered but not picked up by the archive yet.
    Pending,
    InProgress,
    Completed,
    Error,
}

impl fmt::Display for DepositState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DepositState::Pending => "PENDING",
            DepositState::InProgress => "IN_PROGRESS",
            DepositState::Completed => "COMPLETED",
            DepositState::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// One deposit activity as reported by the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub id: String,
    pub state: DepositState,
    /// Status string exactly as the archive reported it.
    pub raw_status: String,
    /// Reason the archive rejected or declined the package, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sip_reason: Option<String>,
}

impl Deposit {
    /// The deposit the archive has not answered for yet.
    pub fn pending(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: DepositState::Pending,
            raw_status: "PENDING".to_string(),
            sip_reason: None,
        }
    }
}

#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    /// Triggers a deposit activity for a subdirectory of the shared load
    /// directory. Returns the new deposit's id.
    async fn start_deposit(&self, subdirectory: &str) -> Result<String>;

    /// Queries the current state of a deposit activity.
    async fn get_deposit(&self, id: &str) -> Result<Deposit>;
}

/// Builds the backend selected by the configuration's `kind` field.
pub fn from_config(config: &ArchiveConfig) -> Result<Arc<dyn ArchiveBackend>> {
    match config.kind {
        ArchiveKind::RestV0 => Ok(Arc::new(RestArchive::new(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_state_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&DepositState::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert_eq!(DepositState::Completed.to_string(), "COMPLETED");
    }

    #[test]
    fn pending_deposit_carries_the_id() {
        let deposit = Deposit::pending("dep-17");
        assert_eq!(deposit.id, "dep-17");
        assert_eq!(deposit.state, DepositState::Pending);
        assert!(deposit.sip_reason.is_none());
    }
}
