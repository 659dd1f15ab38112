// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Discovery logic lives in domains/discovery/activities and talks to the
// outside world exclusively through these seams.
//
// Naming convention: Base* for trait names (e.g., BaseRunStore, BaseDiscoveryChannel)

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::{CompanyId, ContactId, DiscoveryRunId, IntentId};
use crate::domains::companies::{Company, CreateCompany};
use crate::domains::contacts::{Contact, CreateContact};
use crate::domains::discovery::models::{DiscoveryIntent, DiscoveryRun, RunFilter};
use crate::domains::leads::{CreateLead, Lead};

// =============================================================================
// Discovery Channel Trait (Infrastructure - external lead sources)
// =============================================================================

/// One query sent to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelQuery {
    pub text: String,
    pub country: Option<String>,
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
}

impl ChannelQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            country: None,
            include_keywords: Vec::new(),
            exclude_keywords: Vec::new(),
        }
    }
}

/// A person a channel reported alongside a company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawContact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

/// A company candidate as returned by a channel, before filtering and dedup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub name: String,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    /// Channel-native relevance in 0.0..=1.0, if the source provides one.
    pub score: Option<f64>,
    #[serde(default)]
    pub contacts: Vec<RawContact>,
}

impl RawCandidate {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A pluggable source of company/contact candidates.
///
/// Implementations may fail or hang; the executor bounds every call with a
/// timeout and records failures per channel.
#[async_trait]
pub trait BaseDiscoveryChannel: Send + Sync {
    /// Stable channel name, as referenced by intents.
    fn name(&self) -> &str;

    /// Run one query, returning at most `limit` candidates.
    async fn search(&self, query: &ChannelQuery, limit: usize) -> Result<Vec<RawCandidate>>;
}

// =============================================================================
// Run Store Trait (Infrastructure - discovery run audit records)
// =============================================================================

/// Persistence for discovery runs.
///
/// Conditional writes return `None`/`false` when the stored run is not in a
/// state that permits the write; callers map that to a domain error.
#[async_trait]
pub trait BaseRunStore: Send + Sync {
    async fn insert(&self, run: &DiscoveryRun) -> Result<DiscoveryRun>;

    /// Persist progress of an active run. `None` once the stored run is terminal.
    async fn save_progress(&self, run: &DiscoveryRun) -> Result<Option<DiscoveryRun>>;

    async fn find(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>>;

    /// Newest first.
    async fn list(&self, filter: &RunFilter) -> Result<Vec<DiscoveryRun>>;

    /// Flag an active run for cancellation. `None` if missing or not active.
    async fn request_cancel(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>>;

    /// `None` if missing or not terminal.
    async fn archive(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>>;

    async fn unarchive(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>>;

    /// `false` unless the run existed and was archived.
    async fn delete_archived(&self, id: DiscoveryRunId) -> Result<bool>;

    /// Claim a terminal dry run for materialization. `None` if the run is
    /// missing, active, no longer a dry run, or claimed more recently than
    /// `stale_after`.
    async fn claim_materialization(
        &self,
        id: DiscoveryRunId,
        stale_after: Duration,
    ) -> Result<Option<DiscoveryRun>>;

    /// Flip a claimed dry run to materialized, copying status, stats and
    /// counters from `run`. `None` unless `run.materializing_at` is still
    /// the stored claim.
    async fn mark_materialized(&self, run: &DiscoveryRun) -> Result<Option<DiscoveryRun>>;
}

// =============================================================================
// Record Store Trait (Infrastructure - durable CRM records)
// =============================================================================

/// Lookup and insert-if-absent for the durable Company/Contact/Lead records.
///
/// `create_*` returns `None` when a record with the same identity already
/// exists. Existing records are never modified.
#[async_trait]
pub trait BaseRecordStore: Send + Sync {
    async fn find_company(&self, dedup_key: &str) -> Result<Option<Company>>;

    async fn create_company(&self, input: CreateCompany) -> Result<Option<Company>>;

    async fn find_contact_by_email(&self, email_key: &str) -> Result<Option<Contact>>;

    async fn find_contact_by_name(
        &self,
        company_id: CompanyId,
        name_key: &str,
    ) -> Result<Option<Contact>>;

    async fn create_contact(&self, input: CreateContact) -> Result<Option<Contact>>;

    async fn find_lead(&self, company_id: CompanyId, contact_id: ContactId)
        -> Result<Option<Lead>>;

    async fn create_lead(&self, input: CreateLead) -> Result<Option<Lead>>;
}

// =============================================================================
// Intent Store Trait (Infrastructure - read-only intent catalog)
// =============================================================================

#[async_trait]
pub trait BaseIntentStore: Send + Sync {
    async fn find(&self, id: IntentId) -> Result<Option<DiscoveryIntent>>;
}
