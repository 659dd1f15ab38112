//! Structured run summary stored alongside each discovery run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why a run stopped before exhausting its channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppedReason {
    CompanyLimit,
    TimeLimit,
}

/// Per-kind record counts (created, or would-be-created for projections).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub companies: u32,
    pub contacts: u32,
    pub leads: u32,
}

impl RecordCounts {
    pub fn total(&self) -> u32 {
        self.companies + self.contacts + self.leads
    }
}

/// Outcome of materializing (or projecting) a batch of results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeOutcome {
    pub created: RecordCounts,
    pub skipped: u32,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub queries_executed: u32,
    pub raw_candidates: u32,
    /// Dropped by the intent's exclude keywords.
    pub excluded: u32,
    pub accepted: u32,
    /// Already accepted earlier in the same run.
    pub duplicates: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunStats {
    pub channels: BTreeMap<String, ChannelStats>,
    pub channel_errors: BTreeMap<String, String>,
    pub companies_found: u32,
    pub leads_found: u32,
    pub created: RecordCounts,
    pub skipped: u32,
    pub errors: Vec<String>,
    /// Dry runs only: what materializing the buffered results would do.
    pub projected: Option<MaterializeOutcome>,
    pub stopped_early: bool,
    pub stopped_reason: Option<StoppedReason>,
    pub duration_ms: u64,
}

impl RunStats {
    pub fn record_materialized(&mut self, outcome: &MaterializeOutcome) {
        self.created = outcome.created;
        self.skipped = outcome.skipped;
        self.errors.extend(outcome.errors.iter().cloned());
    }

    pub fn has_errors(&self) -> bool {
        !self.channel_errors.is_empty() || !self.errors.is_empty()
    }
}
