//! Discovery service (stateless)
//!
//! Trigger, inspect, cancel and manage discovery runs.

use chrono::{DateTime, Utc};
use restate_sdk::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::common::{DiscoveryRunId, IntentId};
use crate::domains::discovery::activities::{self as discovery_activities, BulkOutcome, RunRequest};
use crate::domains::discovery::errors::DiscoveryError;
use crate::domains::discovery::models::{
    DiscoveryResult, DiscoveryRun, LimitOverrides, RunFilter, RunLimits, RunMode, RunStats,
    RunStatus, StoppedReason,
};
use crate::impl_restate_serde;
use crate::kernel::ServerDeps;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRunRequest {
    pub intent_id: IntentId,
    #[serde(default)]
    pub dry_run: bool,
    pub overrides: Option<LimitOverrides>,
    pub triggered_by: Option<String>,
}

impl_restate_serde!(TriggerRunRequest);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIdRequest {
    pub run_id: DiscoveryRunId,
}

impl_restate_serde!(RunIdRequest);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIdsRequest {
    pub run_ids: Vec<DiscoveryRunId>,
}

impl_restate_serde!(RunIdsRequest);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRunsRequest {
    pub archived: Option<bool>,
    pub mode: Option<RunMode>,
    pub limit: Option<i64>,
}

impl_restate_serde!(ListRunsRequest);

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: DiscoveryRunId,
    pub mode: RunMode,
    pub dry_run: bool,
    pub intent_id: IntentId,
    pub intent_name: String,
    pub status: RunStatus,
    pub triggered_by: String,
    pub created_companies_count: i32,
    pub created_contacts_count: i32,
    pub created_leads_count: i32,
    pub skipped_count: i32,
    pub error_count: i32,
    pub error: Option<String>,
    pub stopped_reason: Option<StoppedReason>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl_restate_serde!(RunSummary);

impl From<&DiscoveryRun> for RunSummary {
    fn from(run: &DiscoveryRun) -> Self {
        Self {
            id: run.id,
            mode: run.mode,
            dry_run: run.dry_run,
            intent_id: run.intent_id,
            intent_name: run.intent_name.clone(),
            status: run.status,
            triggered_by: run.triggered_by.clone(),
            created_companies_count: run.created_companies_count,
            created_contacts_count: run.created_contacts_count,
            created_leads_count: run.created_leads_count,
            skipped_count: run.skipped_count,
            error_count: run.error_count,
            error: run.error.clone(),
            stopped_reason: run.stats.stopped_reason,
            started_at: run.started_at,
            finished_at: run.finished_at,
            cancel_requested_at: run.cancel_requested_at,
            archived_at: run.archived_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunListResult {
    pub runs: Vec<RunSummary>,
}

impl_restate_serde!(RunListResult);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub summary: RunSummary,
    pub limits: RunLimits,
    pub stats: RunStats,
    pub results: Vec<DiscoveryResult>,
}

impl_restate_serde!(RunDetail);

impl From<DiscoveryRun> for RunDetail {
    fn from(run: DiscoveryRun) -> Self {
        Self {
            summary: RunSummary::from(&run),
            limits: run.limits,
            stats: run.stats,
            results: run.results_json,
        }
    }
}

impl_restate_serde!(BulkOutcome);

/// Storage errors are retried; everything else is terminal.
fn handler_error(e: DiscoveryError) -> HandlerError {
    if e.is_transient() {
        anyhow::Error::from(e).into()
    } else {
        TerminalError::new(e.to_string()).into()
    }
}

/// Errors from executing a run are never retried: a retry would insert
/// and execute a second run.
fn run_error(e: DiscoveryError) -> TerminalError {
    TerminalError::new(e.to_string())
}

// =============================================================================
// Service definition
// =============================================================================

#[restate_sdk::service]
#[name = "Discovery"]
pub trait DiscoveryService {
    async fn trigger_run(req: TriggerRunRequest) -> Result<RunSummary, HandlerError>;
    async fn request_cancel(req: RunIdRequest) -> Result<RunSummary, HandlerError>;
    async fn materialize_run(req: RunIdRequest) -> Result<RunSummary, HandlerError>;
    async fn archive_runs(req: RunIdsRequest) -> Result<BulkOutcome, HandlerError>;
    async fn unarchive_runs(req: RunIdsRequest) -> Result<BulkOutcome, HandlerError>;
    async fn delete_runs(req: RunIdsRequest) -> Result<BulkOutcome, HandlerError>;
    async fn list_runs(req: ListRunsRequest) -> Result<RunListResult, HandlerError>;
    async fn get_run(req: RunIdRequest) -> Result<RunDetail, HandlerError>;
}

pub struct DiscoveryServiceImpl {
    deps: Arc<ServerDeps>,
}

impl DiscoveryServiceImpl {
    pub fn with_deps(deps: Arc<ServerDeps>) -> Self {
        Self { deps }
    }
}

impl DiscoveryService for DiscoveryServiceImpl {
    async fn trigger_run(
        &self,
        ctx: Context<'_>,
        req: TriggerRunRequest,
    ) -> Result<RunSummary, HandlerError> {
        let summary = ctx
            .run(|| async {
                let mut request = RunRequest::builder()
                    .intent_id(req.intent_id)
                    .dry_run(req.dry_run)
                    .triggered_by(
                        req.triggered_by
                            .clone()
                            .unwrap_or_else(|| "restate".to_string()),
                    )
                    .build();
                request.overrides = req.overrides.clone();

                discovery_activities::trigger_run(request, &self.deps)
                    .await
                    .map(|run| RunSummary::from(&run))
                    .map_err(|e| HandlerError::from(run_error(e)))
            })
            .await?;

        Ok(summary)
    }

    async fn request_cancel(
        &self,
        ctx: Context<'_>,
        req: RunIdRequest,
    ) -> Result<RunSummary, HandlerError> {
        let summary = ctx
            .run(|| async {
                discovery_activities::request_cancel(req.run_id, &self.deps)
                    .await
                    .map(|run| RunSummary::from(&run))
                    .map_err(handler_error)
            })
            .await?;

        Ok(summary)
    }

    async fn materialize_run(
        &self,
        ctx: Context<'_>,
        req: RunIdRequest,
    ) -> Result<RunSummary, HandlerError> {
        let summary = ctx
            .run(|| async {
                discovery_activities::materialize_run(req.run_id, &self.deps)
                    .await
                    .map(|run| RunSummary::from(&run))
                    .map_err(handler_error)
            })
            .await?;

        Ok(summary)
    }

    async fn archive_runs(
        &self,
        ctx: Context<'_>,
        req: RunIdsRequest,
    ) -> Result<BulkOutcome, HandlerError> {
        let outcome = ctx
            .run(|| async { Ok(discovery_activities::archive_runs(&req.run_ids, &self.deps).await) })
            .await?;

        Ok(outcome)
    }

    async fn unarchive_runs(
        &self,
        ctx: Context<'_>,
        req: RunIdsRequest,
    ) -> Result<BulkOutcome, HandlerError> {
        let outcome = ctx
            .run(|| async {
                Ok(discovery_activities::unarchive_runs(&req.run_ids, &self.deps).await)
            })
            .await?;

        Ok(outcome)
    }

    async fn delete_runs(
        &self,
        ctx: Context<'_>,
        req: RunIdsRequest,
    ) -> Result<BulkOutcome, HandlerError> {
        let outcome = ctx
            .run(|| async { Ok(discovery_activities::delete_runs(&req.run_ids, &self.deps).await) })
            .await?;

        Ok(outcome)
    }

    async fn list_runs(
        &self,
        _ctx: Context<'_>,
        req: ListRunsRequest,
    ) -> Result<RunListResult, HandlerError> {
        let filter = RunFilter {
            archived: req.archived,
            mode: req.mode,
            limit: req.limit,
        };

        let runs = discovery_activities::list_runs(&filter, &self.deps)
            .await
            .map_err(handler_error)?;

        Ok(RunListResult {
            runs: runs.iter().map(RunSummary::from).collect(),
        })
    }

    async fn get_run(
        &self,
        _ctx: Context<'_>,
        req: RunIdRequest,
    ) -> Result<RunDetail, HandlerError> {
        let run = discovery_activities::get_run(req.run_id, &self.deps)
            .await
            .map_err(handler_error)?;

        Ok(RunDetail::from(run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_execution_errors_become_terminal() {
        let error = run_error(DiscoveryError::Storage(anyhow::anyhow!("connection reset")));
        assert!(error.message().contains("connection reset"));
    }

    #[test]
    fn summary_carries_the_stop_reason() {
        let intent = crate::domains::discovery::models::DiscoveryIntent::new(
            "Solar installers",
            vec!["web_search".to_string()],
        );
        let mut run = DiscoveryRun::pending(&intent, RunLimits::default(), RunMode::Manual, false, "ops");
        run.stats.stopped_reason = Some(StoppedReason::CompanyLimit);

        let summary = RunSummary::from(&run);

        assert_eq!(summary.id, run.id);
        assert_eq!(summary.stopped_reason, Some(StoppedReason::CompanyLimit));
        assert_eq!(summary.triggered_by, "ops");
    }
}
