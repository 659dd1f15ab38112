//! Lifecycle manager
//!
//! Every out-of-band change to a run goes through here. Each operation is a
//! conditional write against the run store; when the write does not apply,
//! the stored run is re-read to report why.
//!
//! Soft-delete dimension: live -> archived -> deleted, with unarchive going
//! back. Hard delete requires archived.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::materialize::{materialize_results, MaterializeMode};
use crate::common::DiscoveryRunId;
use crate::domains::discovery::errors::DiscoveryError;
use crate::domains::discovery::models::{DiscoveryRun, RunFilter, RunStatus};
use crate::kernel::ServerDeps;

pub async fn get_run(id: DiscoveryRunId, deps: &ServerDeps) -> Result<DiscoveryRun, DiscoveryError> {
    deps.run_store
        .find(id)
        .await?
        .ok_or(DiscoveryError::RunNotFound(id))
}

pub async fn list_runs(
    filter: &RunFilter,
    deps: &ServerDeps,
) -> Result<Vec<DiscoveryRun>, DiscoveryError> {
    Ok(deps.run_store.list(filter).await?)
}

/// Ask an active run to stop at its next channel boundary.
pub async fn request_cancel(
    id: DiscoveryRunId,
    deps: &ServerDeps,
) -> Result<DiscoveryRun, DiscoveryError> {
    if let Some(run) = deps.run_store.request_cancel(id).await? {
        info!(run_id = %id, "Cancellation requested");
        return Ok(run);
    }

    let run = get_run(id, deps).await?;
    info!(run_id = %id, status = %run.status, "Cancel rejected, run is not active");
    Err(DiscoveryError::NotRunning(id))
}

/// Soft delete. Only runs in a terminal status can be archived.
pub async fn archive_run(
    id: DiscoveryRunId,
    deps: &ServerDeps,
) -> Result<DiscoveryRun, DiscoveryError> {
    if let Some(run) = deps.run_store.archive(id).await? {
        info!(run_id = %id, "Archived discovery run");
        return Ok(run);
    }

    let run = get_run(id, deps).await?;
    info!(run_id = %id, status = %run.status, "Archive rejected, run still in progress");
    Err(DiscoveryError::RunInProgress(id))
}

pub async fn unarchive_run(
    id: DiscoveryRunId,
    deps: &ServerDeps,
) -> Result<DiscoveryRun, DiscoveryError> {
    let run = deps
        .run_store
        .unarchive(id)
        .await?
        .ok_or(DiscoveryError::RunNotFound(id))?;
    info!(run_id = %id, "Unarchived discovery run");
    Ok(run)
}

/// Hard delete. Irreversible, so the run must have been archived first.
pub async fn delete_run(id: DiscoveryRunId, deps: &ServerDeps) -> Result<(), DiscoveryError> {
    if deps.run_store.delete_archived(id).await? {
        info!(run_id = %id, "Deleted discovery run");
        return Ok(());
    }

    get_run(id, deps).await?;
    info!(run_id = %id, "Delete rejected, run is not archived");
    Err(DiscoveryError::NotArchived(id))
}

/// A materialization claim older than this is presumed abandoned and may be
/// taken over.
pub const MATERIALIZE_CLAIM_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Turn a finished dry run's results into durable records, in place.
///
/// The run keeps its id. `dry_run` flips to false, counters and stats take
/// the materialization outcome, and a `completed` run with per-result errors
/// becomes `completed_with_errors`.
///
/// The run is claimed before any record is written, so of two concurrent
/// calls only one walks the results and writes the counters.
pub async fn materialize_run(
    id: DiscoveryRunId,
    deps: &ServerDeps,
) -> Result<DiscoveryRun, DiscoveryError> {
    let run = get_run(id, deps).await?;

    if !run.status.is_terminal() {
        return Err(DiscoveryError::RunInProgress(id));
    }
    if !run.dry_run {
        return Err(DiscoveryError::NotDryRun(id));
    }
    if run.results_json.is_empty() {
        return Err(DiscoveryError::EmptyResults(id));
    }

    let Some(mut run) = deps
        .run_store
        .claim_materialization(id, MATERIALIZE_CLAIM_TIMEOUT)
        .await?
    else {
        let current = get_run(id, deps).await?;
        info!(run_id = %id, dry_run = current.dry_run, "Materialize rejected, run already claimed");
        return Err(if current.dry_run {
            DiscoveryError::AlreadyMaterialized(id)
        } else {
            DiscoveryError::NotDryRun(id)
        });
    };

    let outcome = materialize_results(
        run.id,
        &run.results_json,
        MaterializeMode::Create,
        deps.records.as_ref(),
    )
    .await;

    run.stats.record_materialized(&outcome);
    run.set_counters(outcome.created, outcome.skipped, outcome.errors.len());
    if run.status == RunStatus::Completed && !outcome.errors.is_empty() {
        run.transition_to(RunStatus::CompletedWithErrors)?;
    }

    let run = deps
        .run_store
        .mark_materialized(&run)
        .await?
        .ok_or(DiscoveryError::AlreadyMaterialized(id))?;

    info!(
        run_id = %id,
        status = %run.status,
        created_companies = run.created_companies_count,
        created_contacts = run.created_contacts_count,
        created_leads = run.created_leads_count,
        skipped = run.skipped_count,
        errors = run.error_count,
        "Materialized dry run"
    );

    Ok(run)
}

// =============================================================================
// Bulk variants
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    pub id: DiscoveryRunId,
    pub error: String,
}

/// Per-id result of a bulk lifecycle operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub succeeded: Vec<DiscoveryRunId>,
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    fn record<T>(&mut self, id: DiscoveryRunId, result: Result<T, DiscoveryError>) {
        match result {
            Ok(_) => self.succeeded.push(id),
            Err(e) => self.failed.push(BulkFailure {
                id,
                error: e.to_string(),
            }),
        }
    }
}

pub async fn archive_runs(ids: &[DiscoveryRunId], deps: &ServerDeps) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();
    for &id in ids {
        outcome.record(id, archive_run(id, deps).await);
    }
    outcome
}

pub async fn unarchive_runs(ids: &[DiscoveryRunId], deps: &ServerDeps) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();
    for &id in ids {
        outcome.record(id, unarchive_run(id, deps).await);
    }
    outcome
}

pub async fn delete_runs(ids: &[DiscoveryRunId], deps: &ServerDeps) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();
    for &id in ids {
        outcome.record(id, delete_run(id, deps).await);
    }
    outcome
}
