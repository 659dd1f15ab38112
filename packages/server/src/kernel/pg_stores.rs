//! Postgres-backed store adapters.
//!
//! Thin wrappers that implement the kernel store traits by delegating to the
//! SQL on each domain model.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

use crate::common::{CompanyId, ContactId, DiscoveryRunId, IntentId};
use crate::domains::companies::{Company, CreateCompany};
use crate::domains::contacts::{Contact, CreateContact};
use crate::domains::discovery::models::{DiscoveryIntent, DiscoveryRun, RunFilter};
use crate::domains::leads::{CreateLead, Lead};
use crate::kernel::{BaseIntentStore, BaseRecordStore, BaseRunStore};

// =============================================================================
// Runs
// =============================================================================

pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseRunStore for PgRunStore {
    async fn insert(&self, run: &DiscoveryRun) -> Result<DiscoveryRun> {
        run.insert(&self.pool).await
    }

    async fn save_progress(&self, run: &DiscoveryRun) -> Result<Option<DiscoveryRun>> {
        run.save_progress(&self.pool).await
    }

    async fn find(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>> {
        DiscoveryRun::find_by_id(id, &self.pool).await
    }

    async fn list(&self, filter: &RunFilter) -> Result<Vec<DiscoveryRun>> {
        DiscoveryRun::find_filtered(filter, &self.pool).await
    }

    async fn request_cancel(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>> {
        DiscoveryRun::request_cancel(id, &self.pool).await
    }

    async fn archive(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>> {
        DiscoveryRun::archive(id, &self.pool).await
    }

    async fn unarchive(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>> {
        DiscoveryRun::unarchive(id, &self.pool).await
    }

    async fn delete_archived(&self, id: DiscoveryRunId) -> Result<bool> {
        DiscoveryRun::delete_archived(id, &self.pool).await
    }

    async fn claim_materialization(
        &self,
        id: DiscoveryRunId,
        stale_after: Duration,
    ) -> Result<Option<DiscoveryRun>> {
        DiscoveryRun::claim_materialization(id, stale_after.as_secs_f64(), &self.pool).await
    }

    async fn mark_materialized(&self, run: &DiscoveryRun) -> Result<Option<DiscoveryRun>> {
        run.mark_materialized(&self.pool).await
    }
}

// =============================================================================
// Companies / contacts / leads
// =============================================================================

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseRecordStore for PgRecordStore {
    async fn find_company(&self, dedup_key: &str) -> Result<Option<Company>> {
        Company::find_by_dedup_key(dedup_key, &self.pool).await
    }

    async fn create_company(&self, input: CreateCompany) -> Result<Option<Company>> {
        Company::create(input, &self.pool).await
    }

    async fn find_contact_by_email(&self, email_key: &str) -> Result<Option<Contact>> {
        Contact::find_by_email_key(email_key, &self.pool).await
    }

    async fn find_contact_by_name(
        &self,
        company_id: CompanyId,
        name_key: &str,
    ) -> Result<Option<Contact>> {
        Contact::find_by_name_key(company_id, name_key, &self.pool).await
    }

    async fn create_contact(&self, input: CreateContact) -> Result<Option<Contact>> {
        Contact::create(input, &self.pool).await
    }

    async fn find_lead(
        &self,
        company_id: CompanyId,
        contact_id: ContactId,
    ) -> Result<Option<Lead>> {
        Lead::find_by_pair(company_id, contact_id, &self.pool).await
    }

    async fn create_lead(&self, input: CreateLead) -> Result<Option<Lead>> {
        Lead::create(input, &self.pool).await
    }
}

// =============================================================================
// Intents
// =============================================================================

pub struct PgIntentStore {
    pool: PgPool,
}

impl PgIntentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseIntentStore for PgIntentStore {
    async fn find(&self, id: IntentId) -> Result<Option<DiscoveryIntent>> {
        DiscoveryIntent::find_by_id(id, &self.pool).await
    }
}
