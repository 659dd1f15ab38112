//! Channel executor
//!
//! Runs the queries of one channel under a per-call timeout and turns the raw
//! candidates into scored ones. A failing channel never propagates: its error
//! is returned as data and the channel contributes zero candidates.
//!
//! No deduplication happens here; the run controller owns that.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domains::discovery::models::{ChannelStats, DiscoveryIntent};
use crate::kernel::{BaseDiscoveryChannel, ChannelQuery, RawCandidate};

/// Weight of the channel's own score when keyword hits are also available.
const CHANNEL_SCORE_WEIGHT: f64 = 0.5;
/// Score assumed for channels that report none.
const DEFAULT_CHANNEL_SCORE: f64 = 0.5;

/// A raw candidate that passed exclusion, with its relevance assessment.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: RawCandidate,
    pub query: String,
    pub relevance_score: f64,
    pub relevance_reasons: Vec<String>,
}

/// What one channel produced during a run.
#[derive(Debug, Default)]
pub struct ChannelOutcome {
    pub candidates: Vec<ScoredCandidate>,
    pub stats: ChannelStats,
    pub error: Option<String>,
}

/// Limits for one channel execution.
#[derive(Debug, Clone, Copy)]
pub struct ChannelBudget {
    /// Maximum candidates requested per query.
    pub cap: usize,
    pub call_timeout: Duration,
    /// No new query starts after this instant.
    pub deadline: Instant,
}

/// Queries for an intent: every include keyword crossed with every country,
/// in intent order, truncated to `max_queries`.
///
/// Falls back to the intent name when there are no keywords.
pub fn build_queries(intent: &DiscoveryIntent, max_queries: u32) -> Vec<ChannelQuery> {
    let keywords: Vec<&str> = if intent.include_keywords.is_empty() {
        vec![intent.name.as_str()]
    } else {
        intent.include_keywords.iter().map(String::as_str).collect()
    };

    let countries: Vec<Option<&str>> = if intent.countries.is_empty() {
        vec![None]
    } else {
        intent.countries.iter().map(|c| Some(c.as_str())).collect()
    };

    keywords
        .iter()
        .flat_map(|keyword| {
            countries.iter().map(move |country| ChannelQuery {
                text: match country {
                    Some(country) => format!("{} {}", keyword, country),
                    None => keyword.to_string(),
                },
                country: country.map(String::from),
                include_keywords: intent.include_keywords.clone(),
                exclude_keywords: intent.exclude_keywords.clone(),
            })
        })
        .take(max_queries as usize)
        .collect()
}

/// Execute the given queries against one channel, in order.
pub async fn execute_channel(
    channel: &dyn BaseDiscoveryChannel,
    queries: &[ChannelQuery],
    budget: ChannelBudget,
) -> ChannelOutcome {
    let started = Instant::now();
    let mut outcome = ChannelOutcome::default();

    for query in queries {
        if Instant::now() > budget.deadline {
            debug!(channel = %channel.name(), "Time budget spent, not issuing more queries");
            break;
        }

        outcome.stats.queries_executed += 1;

        let result =
            tokio::time::timeout(budget.call_timeout, channel.search(query, budget.cap)).await;

        let raw = match result {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(channel = %channel.name(), query = %query.text, error = %e, "Channel query failed");
                outcome.error = Some(e.to_string());
                break;
            }
            Err(_) => {
                warn!(
                    channel = %channel.name(),
                    query = %query.text,
                    timeout_secs = budget.call_timeout.as_secs(),
                    "Channel query timed out"
                );
                outcome.error = Some(format!(
                    "timed out after {}s",
                    budget.call_timeout.as_secs_f64()
                ));
                break;
            }
        };

        debug!(channel = %channel.name(), query = %query.text, results = raw.len(), "Channel query returned");

        // Channels may ignore the requested cap
        for candidate in raw.into_iter().take(budget.cap) {
            outcome.stats.raw_candidates += 1;
            match assess(candidate, query) {
                Some(scored) => outcome.candidates.push(scored),
                None => outcome.stats.excluded += 1,
            }
        }
    }

    if outcome.error.is_some() {
        outcome.candidates.clear();
    }

    outcome.stats.duration_ms = started.elapsed().as_millis() as u64;
    outcome
}

/// Score a candidate, or `None` if it must be dropped (nameless, or matches
/// an exclude keyword).
fn assess(candidate: RawCandidate, query: &ChannelQuery) -> Option<ScoredCandidate> {
    if candidate.name.trim().is_empty() {
        return None;
    }

    let haystack = [
        Some(candidate.name.as_str()),
        candidate.description.as_deref(),
        candidate.industry.as_deref(),
        candidate.website.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase();

    let excluded = query
        .exclude_keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .any(|k| !k.is_empty() && haystack.contains(&k));
    if excluded {
        return None;
    }

    let mut reasons = Vec::new();
    let channel_score = candidate
        .score
        .map(|s| s.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_CHANNEL_SCORE);
    if candidate.score.is_some() {
        reasons.push(format!("channel score {:.2}", channel_score));
    }

    let hits: Vec<&String> = query
        .include_keywords
        .iter()
        .filter(|k| {
            let k = k.trim().to_lowercase();
            !k.is_empty() && haystack.contains(&k)
        })
        .collect();
    for keyword in &hits {
        reasons.push(format!("matched keyword \"{}\"", keyword));
    }

    if let (Some(wanted), Some(actual)) = (query.country.as_deref(), candidate.country.as_deref()) {
        if wanted.eq_ignore_ascii_case(actual) {
            reasons.push(format!("located in {}", actual));
        }
    }

    let relevance_score = if query.include_keywords.is_empty() {
        channel_score
    } else {
        let keyword_score = hits.len() as f64 / query.include_keywords.len() as f64;
        CHANNEL_SCORE_WEIGHT * channel_score + (1.0 - CHANNEL_SCORE_WEIGHT) * keyword_score
    };

    Some(ScoredCandidate {
        candidate,
        query: query.text.clone(),
        relevance_score,
        relevance_reasons: reasons,
    })
}
