//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! Runs the configured discovery intent on a cron schedule, in `scheduled`
//! mode. The runner kill switch applies exactly as it does to manual runs.
//!
//! ```text
//! Scheduler (DISCOVERY_SCHEDULE)
//!     │
//!     └─► trigger_run(intent, mode = scheduled)
//!             └─► channels → dedup → materialize / preview
//! ```

use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::ScheduleConfig;
use crate::domains::discovery::activities::{trigger_run, RunRequest};
use crate::domains::discovery::errors::DiscoveryError;
use crate::domains::discovery::models::{DiscoveryRun, RunMode};
use crate::kernel::ServerDeps;

/// Start the scheduled discovery job
pub async fn start_scheduler(deps: Arc<ServerDeps>, schedule: ScheduleConfig) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let cron = schedule.cron.clone();
    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let deps = deps.clone();
        let schedule = schedule.clone();
        Box::pin(async move {
            match run_scheduled_discovery(&deps, &schedule).await {
                Ok(run) => {
                    tracing::info!(run_id = %run.id, status = %run.status, "Scheduled discovery finished")
                }
                Err(DiscoveryError::RunnerDisabled) => {
                    tracing::warn!("Discovery runner disabled, skipping scheduled run")
                }
                Err(e) => tracing::error!("Scheduled discovery run failed: {}", e),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(cron = %cron, "Scheduled discovery started");
    Ok(scheduler)
}

/// Run the scheduled intent once.
pub async fn run_scheduled_discovery(
    deps: &ServerDeps,
    schedule: &ScheduleConfig,
) -> Result<DiscoveryRun, DiscoveryError> {
    tracing::info!(intent_id = %schedule.intent_id, dry_run = schedule.dry_run, "Running scheduled discovery");

    let request = RunRequest::builder()
        .intent_id(schedule.intent_id)
        .dry_run(schedule.dry_run)
        .mode(RunMode::Scheduled)
        .triggered_by("scheduler")
        .build();

    trigger_run(request, deps).await
}
