//! DiscoveryIntent model
//!
//! Named configuration for a class of discovery runs: which countries and
//! keywords to search for, which channels to ask, and the default limits.
//! Intents are managed outside the discovery engine; this module only reads
//! them.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::time::Duration;

use crate::common::IntentId;

/// Hard ceiling on companies collected by a single run.
pub const MAX_COMPANIES_CAP: u32 = 200;
/// Hard ceiling on lead results produced by a single run.
pub const MAX_LEADS_CAP: u32 = 200;
/// Hard ceiling on queries issued per channel per run.
pub const MAX_QUERIES_CAP: u32 = 20;
/// Hard ceiling on a run's wall-clock budget.
pub const MAX_TIME_BUDGET_SECS: u64 = 900;
/// Contacts kept per discovered company.
pub const MAX_CONTACTS_PER_COMPANY: usize = 3;

/// Bounds applied to one run. Always clamped to the process-wide caps above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLimits {
    pub max_companies: u32,
    pub max_leads: u32,
    pub max_queries: u32,
    pub time_budget_secs: u64,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_companies: 25,
            max_leads: 25,
            max_queries: 5,
            time_budget_secs: 300,
        }
    }
}

/// Caller-supplied limit overrides. Unset fields fall back to the intent's
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOverrides {
    pub max_companies: Option<u32>,
    pub max_leads: Option<u32>,
    pub max_queries: Option<u32>,
    pub time_budget_secs: Option<u64>,
}

impl RunLimits {
    /// Clamp every limit to its cap. Leads may be zero; the rest are at least one.
    pub fn clamped(self) -> Self {
        Self {
            max_companies: self.max_companies.clamp(1, MAX_COMPANIES_CAP),
            max_leads: self.max_leads.min(MAX_LEADS_CAP),
            max_queries: self.max_queries.clamp(1, MAX_QUERIES_CAP),
            time_budget_secs: self.time_budget_secs.clamp(1, MAX_TIME_BUDGET_SECS),
        }
    }

    /// Apply overrides on top of these limits, then clamp.
    pub fn with_overrides(self, overrides: Option<&LimitOverrides>) -> Self {
        let Some(o) = overrides else {
            return self.clamped();
        };

        Self {
            max_companies: o.max_companies.unwrap_or(self.max_companies),
            max_leads: o.max_leads.unwrap_or(self.max_leads),
            max_queries: o.max_queries.unwrap_or(self.max_queries),
            time_budget_secs: o.time_budget_secs.unwrap_or(self.time_budget_secs),
        }
        .clamped()
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }
}

/// A named discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DiscoveryIntent {
    pub id: IntentId,
    pub name: String,
    pub countries: Vec<String>,
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    /// Channel names, executed in this order.
    pub channels: Vec<String>,
    #[sqlx(json)]
    pub default_limits: RunLimits,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscoveryIntent {
    /// Build an in-memory intent (fixtures, scheduled defaults).
    pub fn new(name: impl Into<String>, channels: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: IntentId::new(),
            name: name.into(),
            countries: Vec::new(),
            include_keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            channels,
            default_limits: RunLimits::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn find_by_id(id: IntentId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM discovery_intents WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }
}
