//! Test fixtures for creating test data.
//!
//! Candidates are what a channel returns; runs are seeded straight into the
//! in-memory run store for lifecycle tests.

use chrono::Utc;
use leadgen_core::domains::discovery::models::{
    CompanyResult, DiscoveryIntent, DiscoveryResult, DiscoveryRun, Provenance, RunLimits,
    RunMode, RunStatus,
};
use leadgen_core::kernel::{RawCandidate, RawContact};

/// A candidate with a website and no contacts.
pub fn candidate(name: &str, website: &str) -> RawCandidate {
    RawCandidate {
        website: Some(website.to_string()),
        ..RawCandidate::named(name)
    }
}

/// `count` distinct candidates, `<prefix> 0` .. `<prefix> count-1`.
pub fn candidates(prefix: &str, count: usize) -> Vec<RawCandidate> {
    (0..count)
        .map(|i| {
            let slug = prefix.to_lowercase().replace(' ', "-");
            candidate(
                &format!("{} {}", prefix, i),
                &format!("https://{}-{}.example", slug, i),
            )
        })
        .collect()
}

/// A candidate with one named, emailed contact.
pub fn candidate_with_contact(
    name: &str,
    website: &str,
    first_name: &str,
    last_name: &str,
    email: &str,
) -> RawCandidate {
    RawCandidate {
        contacts: vec![RawContact {
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }],
        ..candidate(name, website)
    }
}

/// An active intent over the given channels with the default limits.
pub fn intent(channels: &[&str]) -> DiscoveryIntent {
    let mut intent = DiscoveryIntent::new(
        "Solar installers",
        channels.iter().map(|c| c.to_string()).collect(),
    );
    intent.include_keywords = vec!["solar".to_string()];
    intent.countries = vec!["DE".to_string()];
    intent
}

/// An intent with one query per channel and the given company limit.
pub fn intent_with_company_limit(channels: &[&str], max_companies: u32) -> DiscoveryIntent {
    let mut intent = intent(channels);
    intent.default_limits = RunLimits {
        max_companies,
        max_leads: max_companies,
        max_queries: 1,
        ..RunLimits::default()
    };
    intent
}

pub fn company_result(name: &str, website: &str) -> DiscoveryResult {
    DiscoveryResult::Company(CompanyResult {
        name: name.to_string(),
        website: Some(website.to_string()),
        industry: None,
        country: Some("DE".to_string()),
        description: None,
        provenance: Provenance {
            channel: "web_search".to_string(),
            query: "solar DE".to_string(),
            discovered_at: Utc::now(),
            relevance_score: 0.5,
            relevance_reasons: Vec::new(),
        },
    })
}

/// A run that already reached `status`, holding `results`.
pub fn finished_run(
    intent: &DiscoveryIntent,
    status: RunStatus,
    dry_run: bool,
    results: Vec<DiscoveryResult>,
) -> DiscoveryRun {
    let mut run = DiscoveryRun::pending(
        intent,
        intent.default_limits,
        RunMode::Manual,
        dry_run,
        "test",
    );
    run.status = status;
    run.results_json = results;
    if status.is_terminal() {
        run.finished_at = Some(Utc::now());
    }
    run
}
