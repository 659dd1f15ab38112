//! Run controller
//!
//! Drives one discovery run from creation to a terminal status:
//!
//! 1. Refuse if the runner is disabled or the intent is unknown
//! 2. Persist a `pending` run, move it to `running`
//! 3. Execute the intent's channels one after another
//! 4. Dedup candidates into the results buffer under the run's limits
//! 5. After each channel: honour cancellation, company limit, time budget
//! 6. Materialize (real run) or project (dry run), then persist the terminal status
//!
//! Channel failures are recorded in the stats and never abort the run. The
//! run only fails when no channel produced anything.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info, warn};
use typed_builder::TypedBuilder;

use super::channel_executor::{build_queries, execute_channel, ChannelBudget, ScoredCandidate};
use super::dedup::{ContactIdentity, DedupIndex};
use super::materialize::{materialize_results, MaterializeMode};
use crate::common::IntentId;
use crate::domains::discovery::errors::DiscoveryError;
use crate::domains::discovery::models::{
    ChannelStats, CompanyResult, ContactResult, DiscoveryIntent, DiscoveryResult, DiscoveryRun,
    LeadResult, LimitOverrides, Provenance, RunLimits, RunMode, RunStatus, StoppedReason,
    MAX_CONTACTS_PER_COMPANY,
};
use crate::kernel::ServerDeps;

/// A request to start a discovery run.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub intent_id: IntentId,
    #[builder(default)]
    #[serde(default)]
    pub dry_run: bool,
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub overrides: Option<LimitOverrides>,
    #[builder(default = RunMode::Manual)]
    #[serde(default = "default_mode")]
    pub mode: RunMode,
    #[builder(setter(into))]
    pub triggered_by: String,
}

fn default_mode() -> RunMode {
    RunMode::Manual
}

/// Start and execute a run to completion.
///
/// Returns the terminal run. A run in which every channel failed is persisted
/// as `failed` and reported as [`DiscoveryError::RunFailed`].
pub async fn trigger_run(
    request: RunRequest,
    deps: &ServerDeps,
) -> Result<DiscoveryRun, DiscoveryError> {
    if !deps.runner.enabled {
        info!(intent_id = %request.intent_id, triggered_by = %request.triggered_by, "Discovery runner disabled, refusing run");
        return Err(DiscoveryError::RunnerDisabled);
    }

    let intent = deps
        .intents
        .find(request.intent_id)
        .await?
        .filter(|intent| intent.is_active)
        .ok_or(DiscoveryError::IntentNotFound(request.intent_id))?;

    let limits = intent
        .default_limits
        .with_overrides(request.overrides.as_ref());

    let run = DiscoveryRun::pending(
        &intent,
        limits,
        request.mode,
        request.dry_run,
        request.triggered_by,
    );
    let run = deps.run_store.insert(&run).await?;

    info!(
        run_id = %run.id,
        intent = %intent.name,
        mode = ?run.mode,
        dry_run = run.dry_run,
        max_companies = limits.max_companies,
        max_leads = limits.max_leads,
        max_queries = limits.max_queries,
        time_budget_secs = limits.time_budget_secs,
        "Starting discovery run"
    );

    execute_run(run, &intent, deps).await
}

/// Execute an already-persisted pending run.
pub async fn execute_run(
    mut run: DiscoveryRun,
    intent: &DiscoveryIntent,
    deps: &ServerDeps,
) -> Result<DiscoveryRun, DiscoveryError> {
    let started = Instant::now();

    match drive(&mut run, intent, deps, started).await {
        Ok(()) => {}
        Err(DiscoveryError::Storage(e)) => {
            // Best effort: the store may be the thing that failed
            error!(run_id = %run.id, error = %e, "Discovery run aborted by storage error");
            if !run.status.is_terminal() {
                run.error = Some(e.to_string());
                run.stats.duration_ms = started.elapsed().as_millis() as u64;
                if run.transition_to(RunStatus::Failed).is_ok() {
                    if let Err(save_err) = deps.run_store.save_progress(&run).await {
                        error!(run_id = %run.id, error = %save_err, "Failed to record run failure");
                    }
                }
            }
            return Err(DiscoveryError::Storage(e));
        }
        Err(e) => return Err(e),
    }

    if run.status == RunStatus::Failed {
        let message = run.error.clone().unwrap_or_default();
        error!(run_id = %run.id, error = %message, "Discovery run failed");
        return Err(DiscoveryError::RunFailed {
            run_id: run.id,
            message,
        });
    }

    info!(
        run_id = %run.id,
        status = %run.status,
        companies_found = run.stats.companies_found,
        leads_found = run.stats.leads_found,
        created_companies = run.created_companies_count,
        created_contacts = run.created_contacts_count,
        created_leads = run.created_leads_count,
        skipped = run.skipped_count,
        channel_errors = run.stats.channel_errors.len(),
        stopped_reason = ?run.stats.stopped_reason,
        duration_ms = run.stats.duration_ms,
        "Discovery run finished"
    );

    Ok(run)
}

async fn drive(
    run: &mut DiscoveryRun,
    intent: &DiscoveryIntent,
    deps: &ServerDeps,
    started: Instant,
) -> Result<(), DiscoveryError> {
    let limits = run.limits;
    let deadline = started + limits.time_budget();

    run.transition_to(RunStatus::Running)?;
    persist(run, deps).await?;

    let queries = build_queries(intent, limits.max_queries);
    let mut collector = Collector::new(limits);
    let mut gathered = 0usize;
    let mut cancelled = false;

    for (position, channel_name) in intent.channels.iter().enumerate() {
        let channels_remain = position + 1 < intent.channels.len();

        let Some(channel) = deps.channels.get(channel_name) else {
            warn!(run_id = %run.id, channel = %channel_name, "Unknown discovery channel");
            run.stats
                .channel_errors
                .insert(channel_name.clone(), "unknown channel".to_string());
            run.stats
                .channels
                .insert(channel_name.clone(), ChannelStats::default());
            continue;
        };

        let outcome = execute_channel(
            channel.as_ref(),
            &queries,
            ChannelBudget {
                cap: limits.max_companies as usize,
                call_timeout: deps.runner.channel_timeout,
                deadline,
            },
        )
        .await;

        let mut channel_stats = outcome.stats;
        let cut_short =
            outcome.error.is_none() && (channel_stats.queries_executed as usize) < queries.len();
        if let Some(message) = outcome.error {
            run.stats.channel_errors.insert(channel_name.clone(), message);
        }

        gathered += outcome.candidates.len();
        let unconsumed =
            collector.absorb(channel_name, outcome.candidates, &mut channel_stats);

        info!(
            run_id = %run.id,
            channel = %channel_name,
            queries = channel_stats.queries_executed,
            raw = channel_stats.raw_candidates,
            excluded = channel_stats.excluded,
            accepted = channel_stats.accepted,
            duplicates = channel_stats.duplicates,
            "Channel finished"
        );
        run.stats.channels.insert(channel_name.clone(), channel_stats);

        collector.write_into(run);
        persist(run, deps).await?;

        // Channel boundary: cancellation, then company limit, then time budget
        if cancel_requested(run, deps).await? {
            info!(run_id = %run.id, channel = %channel_name, "Cancellation requested, stopping run");
            cancelled = true;
            break;
        }

        if collector.companies_full() {
            if unconsumed || channels_remain {
                stop_early(run, StoppedReason::CompanyLimit);
            }
            break;
        }

        if started.elapsed() > limits.time_budget() {
            if channels_remain || cut_short {
                stop_early(run, StoppedReason::TimeLimit);
            }
            break;
        }
    }

    collector.write_into(run);

    let attempted = run.stats.channels.len();
    let all_failed = run.stats.channel_errors.len() >= attempted && gathered == 0;

    if !cancelled && (attempted == 0 || all_failed) {
        run.error = Some(if attempted == 0 {
            "intent has no channels".to_string()
        } else {
            format!(
                "all channels failed: {}",
                run.stats
                    .channel_errors
                    .iter()
                    .map(|(name, message)| format!("{}: {}", name, message))
                    .collect::<Vec<_>>()
                    .join("; ")
            )
        });
        run.stats.duration_ms = started.elapsed().as_millis() as u64;
        run.transition_to(RunStatus::Failed)?;
        persist(run, deps).await?;
        return Ok(());
    }

    if run.dry_run {
        let projected = materialize_results(
            run.id,
            &run.results_json,
            MaterializeMode::Project,
            deps.records.as_ref(),
        )
        .await;
        run.stats.projected = Some(projected);
    } else {
        let outcome = materialize_results(
            run.id,
            &run.results_json,
            MaterializeMode::Create,
            deps.records.as_ref(),
        )
        .await;
        run.stats.record_materialized(&outcome);
        run.set_counters(outcome.created, outcome.skipped, outcome.errors.len());
    }

    let status = if cancelled {
        RunStatus::Cancelled
    } else if run.stats.has_errors() {
        RunStatus::CompletedWithErrors
    } else {
        RunStatus::Completed
    };

    run.stats.duration_ms = started.elapsed().as_millis() as u64;
    run.transition_to(status)?;
    persist(run, deps).await?;
    Ok(())
}

fn stop_early(run: &mut DiscoveryRun, reason: StoppedReason) {
    info!(run_id = %run.id, reason = ?reason, "Stopping discovery run early");
    run.stats.stopped_early = true;
    run.stats.stopped_reason = Some(reason);
}

async fn persist(run: &DiscoveryRun, deps: &ServerDeps) -> Result<(), DiscoveryError> {
    deps.run_store
        .save_progress(run)
        .await?
        .map(|_| ())
        .ok_or_else(|| {
            DiscoveryError::Storage(anyhow::anyhow!(
                "discovery run {} is no longer active",
                run.id
            ))
        })
}

async fn cancel_requested(run: &DiscoveryRun, deps: &ServerDeps) -> Result<bool, DiscoveryError> {
    Ok(deps
        .run_store
        .find(run.id)
        .await?
        .is_some_and(|stored| stored.cancel_requested_at.is_some()))
}

/// Results buffer with in-run dedup and limit accounting.
struct Collector {
    limits: RunLimits,
    index: DedupIndex,
    results: Vec<DiscoveryResult>,
    companies: u32,
    leads: u32,
}

impl Collector {
    fn new(limits: RunLimits) -> Self {
        Self {
            limits,
            index: DedupIndex::new(),
            results: Vec::new(),
            companies: 0,
            leads: 0,
        }
    }

    fn companies_full(&self) -> bool {
        self.companies >= self.limits.max_companies
    }

    /// Accept candidates in order until the company limit is reached.
    /// Returns whether candidates were left over.
    fn absorb(
        &mut self,
        channel: &str,
        candidates: Vec<ScoredCandidate>,
        stats: &mut ChannelStats,
    ) -> bool {
        let mut candidates = candidates.into_iter();

        for scored in candidates.by_ref() {
            let provenance = Provenance {
                channel: channel.to_string(),
                query: scored.query.clone(),
                discovered_at: Utc::now(),
                relevance_score: scored.relevance_score,
                relevance_reasons: scored.relevance_reasons.clone(),
            };

            let raw = scored.candidate;
            let company = CompanyResult {
                name: raw.name.trim().to_string(),
                website: raw.website.filter(|w| !w.trim().is_empty()),
                industry: raw.industry,
                country: raw.country,
                description: raw.description,
                provenance: provenance.clone(),
            };

            let company_result = DiscoveryResult::Company(company.clone());
            if self.index.is_duplicate(&company_result) {
                stats.duplicates += 1;
                continue;
            }
            self.index.merge(&company_result);
            self.results.push(company_result);
            self.companies += 1;
            stats.accepted += 1;

            let mut primary: Option<ContactResult> = None;
            let mut kept = 0;
            for raw_contact in raw.contacts {
                if kept == MAX_CONTACTS_PER_COMPANY {
                    break;
                }
                let contact = ContactResult {
                    first_name: raw_contact.first_name,
                    last_name: raw_contact.last_name,
                    email: raw_contact.email,
                    phone: raw_contact.phone,
                    role: raw_contact.role,
                    company: company.reference(),
                    provenance: provenance.clone(),
                };
                if ContactIdentity::of(&contact).is_none() {
                    continue;
                }
                let contact_result = DiscoveryResult::Contact(contact.clone());
                if !self.index.merge(&contact_result) {
                    continue;
                }
                self.results.push(contact_result);
                kept += 1;
                primary.get_or_insert(contact);
            }

            if let Some(contact) = primary {
                if self.leads < self.limits.max_leads {
                    let lead = DiscoveryResult::Lead(LeadResult {
                        company: company.clone(),
                        contact,
                        provenance,
                    });
                    if self.index.merge(&lead) {
                        self.results.push(lead);
                        self.leads += 1;
                    }
                }
            }

            if self.companies_full() {
                break;
            }
        }

        candidates.next().is_some()
    }

    fn write_into(&self, run: &mut DiscoveryRun) {
        run.results_json = self.results.clone();
        run.stats.companies_found = self.companies;
        run.stats.leads_found = self.leads;
    }
}
