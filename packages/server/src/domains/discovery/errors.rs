use thiserror::Error;

use crate::common::{DiscoveryRunId, IntentId};
use crate::domains::discovery::models::RunStatus;

/// Errors surfaced by the discovery engine to its callers.
///
/// Channel failures and per-result materialization failures never appear
/// here; they are recorded in the run's stats instead.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Discovery runner is disabled")]
    RunnerDisabled,

    #[error("Discovery intent not found: {0}")]
    IntentNotFound(IntentId),

    #[error("Discovery run not found: {0}")]
    RunNotFound(DiscoveryRunId),

    #[error("Discovery run {0} is still in progress")]
    RunInProgress(DiscoveryRunId),

    #[error("Discovery run {0} is not a dry run")]
    NotDryRun(DiscoveryRunId),

    #[error("Discovery run {0} has no results to materialize")]
    EmptyResults(DiscoveryRunId),

    #[error("Discovery run {0} was already materialized")]
    AlreadyMaterialized(DiscoveryRunId),

    #[error("Discovery run {0} must be archived before it can be deleted")]
    NotArchived(DiscoveryRunId),

    #[error("Discovery run {0} is not running")]
    NotRunning(DiscoveryRunId),

    #[error("Invalid run status transition: {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("Discovery run {run_id} failed: {message}")]
    RunFailed {
        run_id: DiscoveryRunId,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl DiscoveryError {
    /// Whether the caller asked for something the current state forbids.
    /// These are rejected before any mutation and must not be retried.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            DiscoveryError::RunnerDisabled
                | DiscoveryError::IntentNotFound(_)
                | DiscoveryError::RunNotFound(_)
                | DiscoveryError::RunInProgress(_)
                | DiscoveryError::NotDryRun(_)
                | DiscoveryError::EmptyResults(_)
                | DiscoveryError::AlreadyMaterialized(_)
                | DiscoveryError::NotArchived(_)
                | DiscoveryError::NotRunning(_)
        )
    }

    /// Whether the failure may succeed when the same call is made again.
    pub fn is_transient(&self) -> bool {
        matches!(self, DiscoveryError::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_errors_are_transient() {
        let id = DiscoveryRunId::new();
        assert!(DiscoveryError::Storage(anyhow::anyhow!("connection reset")).is_transient());
        assert!(!DiscoveryError::NotArchived(id).is_transient());
        assert!(!DiscoveryError::RunFailed {
            run_id: id,
            message: "all channels failed".to_string(),
        }
        .is_transient());
        assert!(!DiscoveryError::InvalidTransition {
            from: RunStatus::Completed,
            to: RunStatus::Running,
        }
        .is_transient());
    }

    #[test]
    fn caller_errors_are_not_storage_errors() {
        let id = DiscoveryRunId::new();
        assert!(DiscoveryError::AlreadyMaterialized(id).is_caller_error());
        assert!(!DiscoveryError::Storage(anyhow::anyhow!("timeout")).is_caller_error());
    }
}
