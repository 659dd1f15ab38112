//! DiscoveryRun model
//!
//! One audit/control record per execution of the discovery engine. The
//! executing task owns `status`, results, stats and counters; lifecycle
//! operations only touch `cancel_requested_at`, `archived_at` and the
//! materialization columns, always through conditional updates.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use super::{DiscoveryIntent, DiscoveryResult, RecordCounts, RunLimits, RunStats};
use crate::common::{DiscoveryRunId, IntentId};
use crate::domains::discovery::errors::DiscoveryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "discovery_run_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending | RunStatus::Running)
    }

    /// Status only moves forward. The single terminal-to-terminal move is
    /// `completed -> completed_with_errors`, taken when materialization
    /// reports per-result errors.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (*self, next) {
            (Pending, Running | Failed | Cancelled) => true,
            (Running, Completed | CompletedWithErrors | Failed | Cancelled) => true,
            (Completed, CompletedWithErrors) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "discovery_run_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Manual,
    Scheduled,
}

/// Listing filter for the audit view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunFilter {
    /// `Some(true)` only archived, `Some(false)` only live, `None` both.
    pub archived: Option<bool>,
    pub mode: Option<RunMode>,
    pub limit: Option<i64>,
}

impl RunFilter {
    pub const DEFAULT_LIMIT: i64 = 50;

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, 500)
    }

    pub fn matches(&self, run: &DiscoveryRun) -> bool {
        self.archived.map_or(true, |a| run.is_archived() == a)
            && self.mode.map_or(true, |m| run.mode == m)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DiscoveryRun {
    pub id: DiscoveryRunId,
    pub mode: RunMode,
    pub dry_run: bool,
    pub intent_id: IntentId,
    pub intent_name: String,
    pub status: RunStatus,
    pub triggered_by: String,
    #[sqlx(json)]
    pub limits: RunLimits,
    #[sqlx(json)]
    pub results_json: Vec<DiscoveryResult>,
    #[sqlx(json)]
    pub stats: RunStats,
    pub created_companies_count: i32,
    pub created_contacts_count: i32,
    pub created_leads_count: i32,
    pub skipped_count: i32,
    pub error_count: i32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    /// Set while a materialization holds the run; the value is the claim token.
    pub materializing_at: Option<DateTime<Utc>>,
}

impl DiscoveryRun {
    /// A fresh `pending` run for the given intent.
    pub fn pending(
        intent: &DiscoveryIntent,
        limits: RunLimits,
        mode: RunMode,
        dry_run: bool,
        triggered_by: impl Into<String>,
    ) -> Self {
        Self {
            id: DiscoveryRunId::new(),
            mode,
            dry_run,
            intent_id: intent.id,
            intent_name: intent.name.clone(),
            status: RunStatus::Pending,
            triggered_by: triggered_by.into(),
            limits,
            results_json: Vec::new(),
            stats: RunStats::default(),
            created_companies_count: 0,
            created_contacts_count: 0,
            created_leads_count: 0,
            skipped_count: 0,
            error_count: 0,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            cancel_requested_at: None,
            archived_at: None,
            materializing_at: None,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn transition_to(&mut self, next: RunStatus) -> Result<(), DiscoveryError> {
        if !self.status.can_transition_to(next) {
            return Err(DiscoveryError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Copy a materialization result into the denormalized counters.
    pub fn set_counters(&mut self, created: RecordCounts, skipped: u32, errors: usize) {
        self.created_companies_count = created.companies as i32;
        self.created_contacts_count = created.contacts as i32;
        self.created_leads_count = created.leads as i32;
        self.skipped_count = skipped as i32;
        self.error_count = errors as i32;
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO discovery_runs
             (id, mode, dry_run, intent_id, intent_name, status, triggered_by,
              limits, results_json, stats, started_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(self.id)
        .bind(self.mode)
        .bind(self.dry_run)
        .bind(self.intent_id)
        .bind(&self.intent_name)
        .bind(self.status)
        .bind(&self.triggered_by)
        .bind(Json(&self.limits))
        .bind(Json(&self.results_json))
        .bind(Json(&self.stats))
        .bind(self.started_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Write the executing task's view of the run. Only applies while the
    /// stored run is still pending/running, so a finished run is never
    /// overwritten.
    pub async fn save_progress(&self, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "UPDATE discovery_runs
             SET status = $2, results_json = $3, stats = $4,
                 created_companies_count = $5, created_contacts_count = $6,
                 created_leads_count = $7, skipped_count = $8, error_count = $9,
                 error = $10, finished_at = $11
             WHERE id = $1 AND status IN ('pending', 'running')
             RETURNING *",
        )
        .bind(self.id)
        .bind(self.status)
        .bind(Json(&self.results_json))
        .bind(Json(&self.stats))
        .bind(self.created_companies_count)
        .bind(self.created_contacts_count)
        .bind(self.created_leads_count)
        .bind(self.skipped_count)
        .bind(self.error_count)
        .bind(&self.error)
        .bind(self.finished_at)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: DiscoveryRunId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM discovery_runs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Find runs for the audit view, newest first
    pub async fn find_filtered(filter: &RunFilter, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM discovery_runs
             WHERE ($1::bool IS NULL OR (archived_at IS NOT NULL) = $1)
               AND ($2::discovery_run_mode IS NULL OR mode = $2)
             ORDER BY started_at DESC
             LIMIT $3",
        )
        .bind(filter.archived)
        .bind(filter.mode)
        .bind(filter.limit())
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn request_cancel(id: DiscoveryRunId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "UPDATE discovery_runs
             SET cancel_requested_at = COALESCE(cancel_requested_at, NOW())
             WHERE id = $1 AND status IN ('pending', 'running')
             RETURNING *",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Soft delete. Only applies to runs in a terminal status.
    pub async fn archive(id: DiscoveryRunId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "UPDATE discovery_runs
             SET archived_at = COALESCE(archived_at, NOW())
             WHERE id = $1 AND status NOT IN ('pending', 'running')
             RETURNING *",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn unarchive(id: DiscoveryRunId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "UPDATE discovery_runs SET archived_at = NULL WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Hard delete. Returns false unless the run exists and is archived.
    pub async fn delete_archived(id: DiscoveryRunId, pool: &PgPool) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM discovery_runs WHERE id = $1 AND archived_at IS NOT NULL")
                .bind(id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Claim a terminal dry run for materialization. Applies when no claim
    /// is held or the held claim is older than `stale_after_secs`.
    pub async fn claim_materialization(
        id: DiscoveryRunId,
        stale_after_secs: f64,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "UPDATE discovery_runs
             SET materializing_at = NOW()
             WHERE id = $1 AND dry_run = true AND status NOT IN ('pending', 'running')
               AND (materializing_at IS NULL
                    OR materializing_at < NOW() - $2::float8 * INTERVAL '1 second')
             RETURNING *",
        )
        .bind(id)
        .bind(stale_after_secs)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Record a completed materialization and release the claim. Applies
    /// only while `self.materializing_at` is still the stored claim.
    pub async fn mark_materialized(&self, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "UPDATE discovery_runs
             SET dry_run = false, materializing_at = NULL, status = $2, stats = $3,
                 created_companies_count = $4, created_contacts_count = $5,
                 created_leads_count = $6, skipped_count = $7, error_count = $8
             WHERE id = $1 AND dry_run = true AND materializing_at = $9
             RETURNING *",
        )
        .bind(self.id)
        .bind(self.status)
        .bind(Json(&self.stats))
        .bind(self.created_companies_count)
        .bind(self.created_contacts_count)
        .bind(self.created_leads_count)
        .bind(self.skipped_count)
        .bind(self.error_count)
        .bind(self.materializing_at)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_never_return_to_active() {
        let terminal = [
            RunStatus::Completed,
            RunStatus::CompletedWithErrors,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ];
        for status in terminal {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(RunStatus::Pending));
            assert!(!status.can_transition_to(RunStatus::Running));
        }
    }

    #[test]
    fn completed_may_degrade_to_completed_with_errors_only() {
        assert!(RunStatus::Completed.can_transition_to(RunStatus::CompletedWithErrors));
        assert!(!RunStatus::CompletedWithErrors.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Cancelled.can_transition_to(RunStatus::CompletedWithErrors));
    }

    #[test]
    fn transition_sets_finished_at_on_terminal() {
        let intent = DiscoveryIntent::new("Solar installers", vec!["web_search".to_string()]);
        let mut run =
            DiscoveryRun::pending(&intent, RunLimits::default(), RunMode::Manual, true, "test");

        run.transition_to(RunStatus::Running).unwrap();
        assert!(run.finished_at.is_none());

        run.transition_to(RunStatus::Completed).unwrap();
        assert!(run.finished_at.is_some());

        let err = run.transition_to(RunStatus::Running).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidTransition { .. }));
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[test]
    fn filter_matches_archived_state_and_mode() {
        let intent = DiscoveryIntent::new("Solar installers", vec![]);
        let mut run =
            DiscoveryRun::pending(&intent, RunLimits::default(), RunMode::Scheduled, false, "cron");

        let live_scheduled = RunFilter {
            archived: Some(false),
            mode: Some(RunMode::Scheduled),
            limit: None,
        };
        assert!(live_scheduled.matches(&run));

        run.archived_at = Some(Utc::now());
        assert!(!live_scheduled.matches(&run));
        assert!(RunFilter::default().matches(&run));
    }
}
