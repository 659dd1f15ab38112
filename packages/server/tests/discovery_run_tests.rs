//! Integration tests for the run controller.
//!
//! Runs are triggered against scripted channels and in-memory stores:
//! - partial channel failure, total channel failure
//! - company limit and time budget stop conditions
//! - cooperative cancellation at channel boundaries
//! - kill switch, unknown or inactive intents
//! - dry runs and scheduled runs

mod common;

use std::sync::Arc;
use std::time::Duration;

use crate::common::{
    candidate, candidate_with_contact, candidates, intent, intent_with_company_limit, TestHarness,
};
use leadgen_core::common::IntentId;
use leadgen_core::domains::discovery::activities::request_cancel;
use leadgen_core::domains::discovery::models::{
    DiscoveryResult, LimitOverrides, RunLimits, RunMode, RunStatus, StoppedReason,
    MAX_COMPANIES_CAP,
};
use leadgen_core::domains::discovery::{trigger_run, DiscoveryError, RunRequest};
use leadgen_core::kernel::scheduled_tasks::run_scheduled_discovery;
use leadgen_core::kernel::MockChannel;
use leadgen_core::ScheduleConfig;
use test_context::test_context;

fn request(intent_id: IntentId) -> RunRequest {
    RunRequest::builder()
        .intent_id(intent_id)
        .triggered_by("operator@example.com")
        .build()
}

fn company_names(results: &[DiscoveryResult]) -> Vec<String> {
    results
        .iter()
        .filter_map(|r| match r {
            DiscoveryResult::Company(c) => Some(c.name.clone()),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Channel failure handling
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn one_failing_channel_completes_with_errors(ctx: &mut TestHarness) {
    ctx.register(Arc::new(MockChannel::new("broken").failing("quota exceeded")));
    ctx.register(Arc::new(
        MockChannel::new("web_search").with_candidates(candidates("Solar", 3)),
    ));
    let intent = intent(&["broken", "web_search"]);
    ctx.add_intent(&intent);

    let run = trigger_run(request(intent.id), &ctx.server_deps())
        .await
        .expect("run should complete");

    assert_eq!(run.status, RunStatus::CompletedWithErrors);
    assert_eq!(run.created_companies_count, 3);
    assert_eq!(run.error_count, 0);
    assert_eq!(run.stats.channel_errors.len(), 1);
    assert_eq!(
        run.stats.channel_errors.get("broken").map(String::as_str),
        Some("quota exceeded")
    );
    assert_eq!(ctx.deps.records.companies().len(), 3);

    let stored = ctx.stored_run(run.id).expect("run persisted");
    assert_eq!(stored.status, RunStatus::CompletedWithErrors);
    assert!(stored.finished_at.is_some());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn all_channels_failing_fails_the_run(ctx: &mut TestHarness) {
    ctx.register(Arc::new(MockChannel::new("a").failing("401 unauthorized")));
    ctx.register(Arc::new(MockChannel::new("b").failing("connection reset")));
    let intent = intent(&["a", "b"]);
    ctx.add_intent(&intent);

    let result = trigger_run(request(intent.id), &ctx.server_deps()).await;

    let (run_id, message) = match result {
        Err(DiscoveryError::RunFailed { run_id, message }) => (run_id, message),
        other => panic!("expected RunFailed, got {:?}", other),
    };
    assert!(message.contains("a: 401 unauthorized"));
    assert!(message.contains("b: connection reset"));

    let stored = ctx.stored_run(run_id).expect("failed run persisted");
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some(message.as_str()));
    assert!(ctx.deps.records.companies().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn unknown_channel_is_recorded_and_skipped(ctx: &mut TestHarness) {
    ctx.register(Arc::new(
        MockChannel::new("web_search").with_candidates(candidates("Solar", 2)),
    ));
    let intent = intent(&["not_registered", "web_search"]);
    ctx.add_intent(&intent);

    let run = trigger_run(request(intent.id), &ctx.server_deps())
        .await
        .expect("run should complete");

    assert_eq!(run.status, RunStatus::CompletedWithErrors);
    assert_eq!(
        run.stats.channel_errors.get("not_registered").map(String::as_str),
        Some("unknown channel")
    );
    assert_eq!(run.created_companies_count, 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn storage_failure_mid_run_marks_the_run_failed(ctx: &mut TestHarness) {
    ctx.register(Arc::new(
        MockChannel::new("web_search").with_candidates(candidates("Solar", 2)),
    ));
    let intent = intent(&["web_search"]);
    ctx.add_intent(&intent);
    // First save moves the run to running, the second records the channel
    ctx.deps.run_store.fail_save_progress_on(2);

    let result = trigger_run(request(intent.id), &ctx.server_deps()).await;

    assert!(matches!(result, Err(DiscoveryError::Storage(_))));
    let runs = ctx.stored_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].finished_at.is_some());
    assert!(runs[0]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("simulated write failure")));
    assert!(ctx.deps.records.companies().is_empty());
}

// =============================================================================
// Stop conditions
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn company_limit_stops_mid_second_channel(ctx: &mut TestHarness) {
    let second = Arc::new(MockChannel::new("b").with_candidates(candidates("Beta", 4)));
    ctx.register(Arc::new(
        MockChannel::new("a").with_candidates(candidates("Alpha", 4)),
    ));
    ctx.register(second.clone());
    let intent = intent_with_company_limit(&["a", "b"], 5);
    ctx.add_intent(&intent);

    let run = trigger_run(request(intent.id), &ctx.server_deps())
        .await
        .expect("run should complete");

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.stats.stopped_early);
    assert_eq!(run.stats.stopped_reason, Some(StoppedReason::CompanyLimit));
    assert_eq!(run.results_json.len(), 5);
    assert_eq!(
        company_names(&run.results_json),
        vec!["Alpha 0", "Alpha 1", "Alpha 2", "Alpha 3", "Beta 0"]
    );
    assert_eq!(run.stats.companies_found, 5);
    assert_eq!(second.call_count(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn exhausting_channels_exactly_at_the_limit_is_not_an_early_stop(ctx: &mut TestHarness) {
    ctx.register(Arc::new(
        MockChannel::new("a").with_candidates(candidates("Alpha", 3)),
    ));
    let intent = intent_with_company_limit(&["a"], 3);
    ctx.add_intent(&intent);

    let run = trigger_run(request(intent.id), &ctx.server_deps())
        .await
        .expect("run should complete");

    assert_eq!(run.results_json.len(), 3);
    assert!(!run.stats.stopped_early);
    assert_eq!(run.stats.stopped_reason, None);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn overrides_are_clamped_to_safety_caps(ctx: &mut TestHarness) {
    ctx.register(Arc::new(MockChannel::new("a")));
    let intent = intent(&["a"]);
    ctx.add_intent(&intent);

    let request = RunRequest::builder()
        .intent_id(intent.id)
        .dry_run(true)
        .overrides(LimitOverrides {
            max_companies: Some(10_000),
            ..Default::default()
        })
        .triggered_by("operator@example.com")
        .build();

    let run = trigger_run(request, &ctx.server_deps())
        .await
        .expect("run should complete");

    assert_eq!(run.limits.max_companies, MAX_COMPANIES_CAP);
    assert_eq!(run.limits.max_leads, intent.default_limits.max_leads);
}

#[tokio::test(start_paused = true)]
async fn time_budget_stops_before_the_next_channel() {
    let mut ctx = TestHarness::new();
    let slow = Arc::new(
        MockChannel::new("slow")
            .with_candidates(candidates("Slow", 2))
            .with_delay(Duration::from_secs(15)),
    );
    let never = Arc::new(MockChannel::new("never").with_candidates(candidates("Never", 2)));
    ctx.register(slow.clone());
    ctx.register(never.clone());

    let mut intent = intent(&["slow", "never"]);
    intent.default_limits = RunLimits {
        max_queries: 1,
        time_budget_secs: 10,
        ..RunLimits::default()
    };
    ctx.add_intent(&intent);

    let run = trigger_run(request(intent.id), &ctx.server_deps())
        .await
        .expect("run should complete");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.stats.stopped_reason, Some(StoppedReason::TimeLimit));
    assert!(run.stats.stopped_early);
    assert_eq!(run.created_companies_count, 2);
    assert_eq!(slow.call_count(), 1);
    assert_eq!(never.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn run_that_uses_exactly_its_budget_is_not_stopped() {
    let mut ctx = TestHarness::new();
    let slow = Arc::new(
        MockChannel::new("slow")
            .with_candidates(candidates("Slow", 1))
            .with_delay(Duration::from_secs(10)),
    );
    let next = Arc::new(MockChannel::new("next").with_candidates(candidates("Next", 1)));
    ctx.register(slow.clone());
    ctx.register(next.clone());

    let mut intent = intent(&["slow", "next"]);
    intent.default_limits = RunLimits {
        max_queries: 1,
        time_budget_secs: 10,
        ..RunLimits::default()
    };
    ctx.add_intent(&intent);

    let run = trigger_run(request(intent.id), &ctx.server_deps())
        .await
        .expect("run should complete");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.stats.stopped_reason, None);
    assert!(!run.stats.stopped_early);
    assert_eq!(next.call_count(), 1);
    assert_eq!(run.created_companies_count, 2);
}

#[tokio::test(start_paused = true)]
async fn hanging_channel_times_out_and_the_run_continues() {
    let mut ctx = TestHarness::new();
    ctx.set_channel_timeout(Duration::from_secs(5));
    ctx.register(Arc::new(MockChannel::new("stuck").hanging()));
    ctx.register(Arc::new(
        MockChannel::new("web_search").with_candidates(candidates("Solar", 1)),
    ));
    let intent = intent(&["stuck", "web_search"]);
    ctx.add_intent(&intent);

    let run = trigger_run(request(intent.id), &ctx.server_deps())
        .await
        .expect("run should complete");

    assert_eq!(run.status, RunStatus::CompletedWithErrors);
    assert_eq!(
        run.stats.channel_errors.get("stuck").map(String::as_str),
        Some("timed out after 5s")
    );
    assert_eq!(run.created_companies_count, 1);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn cancel_is_honoured_at_the_next_channel_boundary() {
    let mut ctx = TestHarness::new();
    let first = Arc::new(
        MockChannel::new("first")
            .with_candidates(candidates("First", 2))
            .with_delay(Duration::from_secs(10)),
    );
    let second = Arc::new(MockChannel::new("second").with_candidates(candidates("Second", 2)));
    ctx.register(first.clone());
    ctx.register(second.clone());
    let intent = intent(&["first", "second"]);
    ctx.add_intent(&intent);

    let deps = Arc::new(ctx.server_deps());
    let run_deps = deps.clone();
    let run_request = request(intent.id);
    let handle = tokio::spawn(async move { trigger_run(run_request, &run_deps).await });

    let run_id = loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if let Some(run) = ctx
            .stored_runs()
            .into_iter()
            .find(|r| r.status == RunStatus::Running)
        {
            break run.id;
        }
    };

    let requested = request_cancel(run_id, &deps)
        .await
        .expect("running run accepts cancel");
    assert!(requested.cancel_requested_at.is_some());

    let run = handle
        .await
        .expect("run task panicked")
        .expect("cancelled run is not an error");

    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(first.call_count(), 1);
    assert_eq!(second.call_count(), 0);
    // Candidates gathered before the boundary are kept
    assert_eq!(run.created_companies_count, 2);
    assert_eq!(ctx.stored_run(run_id).map(|r| r.status), Some(RunStatus::Cancelled));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancel_is_rejected_for_finished_runs(ctx: &mut TestHarness) {
    ctx.register(Arc::new(MockChannel::new("a").with_candidates(candidates("A", 1))));
    let intent = intent(&["a"]);
    ctx.add_intent(&intent);
    let deps = ctx.server_deps();

    let run = trigger_run(request(intent.id), &deps).await.expect("run completes");
    let result = request_cancel(run.id, &deps).await;

    assert!(matches!(result, Err(DiscoveryError::NotRunning(id)) if id == run.id));
    assert_eq!(ctx.stored_run(run.id).map(|r| r.status), Some(RunStatus::Completed));
}

// =============================================================================
// Preconditions
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn disabled_runner_refuses_without_creating_a_run(ctx: &mut TestHarness) {
    let channel = Arc::new(MockChannel::new("a").with_candidates(candidates("A", 1)));
    ctx.register(channel.clone());
    ctx.disable_runner();
    let intent = intent(&["a"]);
    ctx.add_intent(&intent);

    let result = trigger_run(request(intent.id), &ctx.server_deps()).await;

    assert!(matches!(result, Err(DiscoveryError::RunnerDisabled)));
    assert!(ctx.stored_runs().is_empty());
    assert_eq!(channel.call_count(), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn unknown_or_inactive_intent_is_rejected(ctx: &mut TestHarness) {
    let missing = IntentId::new();
    let result = trigger_run(request(missing), &ctx.server_deps()).await;
    assert!(matches!(result, Err(DiscoveryError::IntentNotFound(id)) if id == missing));

    let mut inactive = intent(&["a"]);
    inactive.is_active = false;
    ctx.add_intent(&inactive);
    let result = trigger_run(request(inactive.id), &ctx.server_deps()).await;
    assert!(matches!(result, Err(DiscoveryError::IntentNotFound(_))));

    assert!(ctx.stored_runs().is_empty());
}

// =============================================================================
// Dry runs, dedup and scheduling
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn dry_run_projects_without_writing_records(ctx: &mut TestHarness) {
    ctx.register(Arc::new(MockChannel::new("web_search").with_candidates(vec![
        candidate_with_contact("Sonnenkraft", "https://sonnenkraft.example", "Jana", "Vogel", "jana@sonnenkraft.example"),
        candidate("Lichtwerk", "https://lichtwerk.example"),
    ])));
    let intent = intent(&["web_search"]);
    ctx.add_intent(&intent);

    let request = RunRequest::builder()
        .intent_id(intent.id)
        .dry_run(true)
        .triggered_by("operator@example.com")
        .build();
    let run = trigger_run(request, &ctx.server_deps())
        .await
        .expect("dry run completes");

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.dry_run);
    assert_eq!(run.results_json.len(), 4);
    assert_eq!(run.created_companies_count, 0);

    let projected = run.stats.projected.expect("dry run carries a projection");
    assert_eq!(projected.created.companies, 2);
    assert_eq!(projected.created.contacts, 1);
    assert_eq!(projected.created.leads, 1);

    assert!(ctx.deps.records.companies().is_empty());
    assert!(ctx.deps.records.contacts().is_empty());
    assert!(ctx.deps.records.leads().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn same_company_across_channels_is_kept_once(ctx: &mut TestHarness) {
    ctx.register(Arc::new(MockChannel::new("a").with_candidates(vec![candidate(
        "Foo",
        "http://foo.com",
    )])));
    ctx.register(Arc::new(MockChannel::new("b").with_candidates(vec![
        candidate("Foo GmbH", "https://www.foo.com/"),
        candidate("Bar", "https://bar.com"),
    ])));
    let intent = intent(&["a", "b"]);
    ctx.add_intent(&intent);

    let run = trigger_run(request(intent.id), &ctx.server_deps())
        .await
        .expect("run completes");

    assert_eq!(company_names(&run.results_json), vec!["Foo", "Bar"]);
    assert_eq!(run.stats.channels.get("b").map(|s| s.duplicates), Some(1));
    assert_eq!(run.created_companies_count, 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn scheduled_run_uses_the_configured_intent(ctx: &mut TestHarness) {
    ctx.register(Arc::new(MockChannel::new("a").with_candidates(candidates("A", 2))));
    let intent = intent(&["a"]);
    ctx.add_intent(&intent);

    let schedule = ScheduleConfig {
        cron: "0 0 6 * * *".to_string(),
        intent_id: intent.id,
        dry_run: true,
    };
    let run = run_scheduled_discovery(&ctx.server_deps(), &schedule)
        .await
        .expect("scheduled run completes");

    assert_eq!(run.mode, RunMode::Scheduled);
    assert_eq!(run.triggered_by, "scheduler");
    assert!(run.dry_run);
}
