// TestDependencies - mock implementations for testing
//
// Provides scripted channels and in-memory stores that can be injected into
// ServerDeps for tests. The in-memory stores apply the same conditional-write
// rules as the SQL in the domain models.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use super::{
    BaseDiscoveryChannel, BaseIntentStore, BaseRecordStore, BaseRunStore, ChannelQuery,
    ChannelRegistry, RawCandidate, RunnerConfig, ServerDeps,
};
use crate::common::{CompanyId, ContactId, DiscoveryRunId, IntentId, LeadId};
use crate::domains::companies::{Company, CreateCompany};
use crate::domains::contacts::{Contact, CreateContact};
use crate::domains::discovery::models::{DiscoveryIntent, DiscoveryRun, RunFilter};
use crate::domains::leads::{CreateLead, Lead, LeadStatus};

// =============================================================================
// Mock Discovery Channel
// =============================================================================

/// One scripted reply of a [`MockChannel`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Candidates(Vec<RawCandidate>),
    Fail(String),
    /// Never answers; only a timeout gets the caller out.
    Hang,
}

pub struct MockChannel {
    name: String,
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    /// Used once the scripted replies run out.
    fallback: MockReply,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<ChannelQuery>>>,
}

impl MockChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            fallback: MockReply::Candidates(Vec::new()),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a successful reply for the next unanswered call
    pub fn with_candidates(self, candidates: Vec<RawCandidate>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Candidates(candidates));
        self
    }

    /// Queue a failure for the next unanswered call
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Fail(message.into()));
        self
    }

    /// Every call fails
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fallback = MockReply::Fail(message.into());
        self
    }

    /// Every call hangs
    pub fn hanging(mut self) -> Self {
        self.fallback = MockReply::Hang;
        self
    }

    /// Sleep this long before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all queries this channel received
    pub fn calls(&self) -> Vec<ChannelQuery> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl BaseDiscoveryChannel for MockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &ChannelQuery, limit: usize) -> Result<Vec<RawCandidate>> {
        self.calls.lock().unwrap().push(query.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            MockReply::Candidates(mut candidates) => {
                candidates.truncate(limit);
                Ok(candidates)
            }
            MockReply::Fail(message) => Err(anyhow::anyhow!(message)),
            MockReply::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Ok(Vec::new())
            }
        }
    }
}

// =============================================================================
// In-memory Run Store
// =============================================================================

#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<BTreeMap<DiscoveryRunId, DiscoveryRun>>,
    save_calls: Mutex<usize>,
    /// 1-based `save_progress` call that returns a storage error
    failing_save: Mutex<Option<usize>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored run
    pub fn get(&self, id: DiscoveryRunId) -> Option<DiscoveryRun> {
        self.runs.read().unwrap().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<DiscoveryRun> {
        self.runs.read().unwrap().values().cloned().collect()
    }

    /// Put a run into the store as-is (fixtures for lifecycle tests)
    pub fn seed(&self, run: DiscoveryRun) {
        self.runs.write().unwrap().insert(run.id, run);
    }

    /// Make the `call`-th `save_progress` (counting from 1) fail once
    pub fn fail_save_progress_on(&self, call: usize) {
        *self.failing_save.lock().unwrap() = Some(call);
    }
}

#[async_trait]
impl BaseRunStore for MemoryRunStore {
    async fn insert(&self, run: &DiscoveryRun) -> Result<DiscoveryRun> {
        let mut runs = self.runs.write().unwrap();
        if runs.contains_key(&run.id) {
            anyhow::bail!("duplicate discovery run id {}", run.id);
        }
        runs.insert(run.id, run.clone());
        Ok(run.clone())
    }

    async fn save_progress(&self, run: &DiscoveryRun) -> Result<Option<DiscoveryRun>> {
        let call = {
            let mut calls = self.save_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if *self.failing_save.lock().unwrap() == Some(call) {
            anyhow::bail!("simulated write failure for discovery run {}", run.id);
        }

        let mut runs = self.runs.write().unwrap();
        let Some(stored) = runs.get_mut(&run.id) else {
            return Ok(None);
        };
        if stored.status.is_terminal() {
            return Ok(None);
        }

        stored.status = run.status;
        stored.results_json = run.results_json.clone();
        stored.stats = run.stats.clone();
        stored.created_companies_count = run.created_companies_count;
        stored.created_contacts_count = run.created_contacts_count;
        stored.created_leads_count = run.created_leads_count;
        stored.skipped_count = run.skipped_count;
        stored.error_count = run.error_count;
        stored.error = run.error.clone();
        stored.finished_at = run.finished_at;
        Ok(Some(stored.clone()))
    }

    async fn find(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>> {
        Ok(self.get(id))
    }

    async fn list(&self, filter: &RunFilter) -> Result<Vec<DiscoveryRun>> {
        let mut runs: Vec<DiscoveryRun> = self
            .runs
            .read()
            .unwrap()
            .values()
            .filter(|run| filter.matches(run))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        runs.truncate(filter.limit() as usize);
        Ok(runs)
    }

    async fn request_cancel(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>> {
        let mut runs = self.runs.write().unwrap();
        match runs.get_mut(&id) {
            Some(run) if !run.status.is_terminal() => {
                run.cancel_requested_at.get_or_insert_with(Utc::now);
                Ok(Some(run.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn archive(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>> {
        let mut runs = self.runs.write().unwrap();
        match runs.get_mut(&id) {
            Some(run) if run.status.is_terminal() => {
                run.archived_at.get_or_insert_with(Utc::now);
                Ok(Some(run.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn unarchive(&self, id: DiscoveryRunId) -> Result<Option<DiscoveryRun>> {
        let mut runs = self.runs.write().unwrap();
        Ok(runs.get_mut(&id).map(|run| {
            run.archived_at = None;
            run.clone()
        }))
    }

    async fn delete_archived(&self, id: DiscoveryRunId) -> Result<bool> {
        let mut runs = self.runs.write().unwrap();
        if runs.get(&id).is_some_and(|run| run.is_archived()) {
            runs.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn claim_materialization(
        &self,
        id: DiscoveryRunId,
        stale_after: Duration,
    ) -> Result<Option<DiscoveryRun>> {
        let now = Utc::now();
        let stale_before = now - chrono::Duration::from_std(stale_after)?;
        let mut runs = self.runs.write().unwrap();
        match runs.get_mut(&id) {
            Some(run)
                if run.dry_run
                    && run.status.is_terminal()
                    && run.materializing_at.map_or(true, |at| at < stale_before) =>
            {
                run.materializing_at = Some(now);
                Ok(Some(run.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_materialized(&self, run: &DiscoveryRun) -> Result<Option<DiscoveryRun>> {
        let mut runs = self.runs.write().unwrap();
        match runs.get_mut(&run.id) {
            Some(stored)
                if stored.dry_run
                    && stored.materializing_at.is_some()
                    && stored.materializing_at == run.materializing_at =>
            {
                stored.dry_run = false;
                stored.materializing_at = None;
                stored.status = run.status;
                stored.stats = run.stats.clone();
                stored.created_companies_count = run.created_companies_count;
                stored.created_contacts_count = run.created_contacts_count;
                stored.created_leads_count = run.created_leads_count;
                stored.skipped_count = run.skipped_count;
                stored.error_count = run.error_count;
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }
}

// =============================================================================
// In-memory Record Store
// =============================================================================

#[derive(Default)]
pub struct MemoryRecordStore {
    companies: RwLock<Vec<Company>>,
    contacts: RwLock<Vec<Contact>>,
    leads: RwLock<Vec<Lead>>,
    /// Company names whose insert returns a storage error
    failing_companies: RwLock<Vec<String>>,
    /// Company names whose insert waits before applying
    slow_companies: RwLock<HashMap<String, Duration>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make inserts of a company with this name fail
    pub fn fail_company(&self, name: impl Into<String>) {
        self.failing_companies.write().unwrap().push(name.into());
    }

    /// Make inserts of a company with this name wait `delay` first
    pub fn delay_company(&self, name: impl Into<String>, delay: Duration) {
        self.slow_companies.write().unwrap().insert(name.into(), delay);
    }

    pub fn companies(&self) -> Vec<Company> {
        self.companies.read().unwrap().clone()
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.contacts.read().unwrap().clone()
    }

    pub fn leads(&self) -> Vec<Lead> {
        self.leads.read().unwrap().clone()
    }
}

#[async_trait]
impl BaseRecordStore for MemoryRecordStore {
    async fn find_company(&self, dedup_key: &str) -> Result<Option<Company>> {
        Ok(self
            .companies
            .read()
            .unwrap()
            .iter()
            .find(|c| c.dedup_key == dedup_key)
            .cloned())
    }

    async fn create_company(&self, input: CreateCompany) -> Result<Option<Company>> {
        if self
            .failing_companies
            .read()
            .unwrap()
            .iter()
            .any(|name| *name == input.name)
        {
            anyhow::bail!("simulated insert failure for company {}", input.name);
        }

        let delay = self.slow_companies.read().unwrap().get(&input.name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut companies = self.companies.write().unwrap();
        if companies.iter().any(|c| c.dedup_key == input.dedup_key) {
            return Ok(None);
        }

        let now = Utc::now();
        let company = Company {
            id: CompanyId::new(),
            name: input.name,
            website: input.website,
            dedup_key: input.dedup_key,
            industry: input.industry,
            country: input.country,
            description: input.description,
            discovery_provenance: input.discovery_provenance.map(Json),
            discovered_by_run_id: input.discovered_by_run_id,
            created_at: now,
            updated_at: now,
        };
        companies.push(company.clone());
        Ok(Some(company))
    }

    async fn find_contact_by_email(&self, email_key: &str) -> Result<Option<Contact>> {
        Ok(self
            .contacts
            .read()
            .unwrap()
            .iter()
            .find(|c| c.email_key.as_deref() == Some(email_key))
            .cloned())
    }

    async fn find_contact_by_name(
        &self,
        company_id: CompanyId,
        name_key: &str,
    ) -> Result<Option<Contact>> {
        Ok(self
            .contacts
            .read()
            .unwrap()
            .iter()
            .find(|c| c.company_id == company_id && c.name_key == name_key && c.email_key.is_none())
            .cloned())
    }

    async fn create_contact(&self, input: CreateContact) -> Result<Option<Contact>> {
        let mut contacts = self.contacts.write().unwrap();
        let taken = contacts.iter().any(|c| match &input.email_key {
            Some(key) => c.email_key.as_ref() == Some(key),
            None => {
                c.email_key.is_none()
                    && c.company_id == input.company_id
                    && c.name_key == input.name_key
            }
        });
        if taken {
            return Ok(None);
        }

        let now = Utc::now();
        let contact = Contact {
            id: ContactId::new(),
            company_id: input.company_id,
            first_name: input.first_name,
            last_name: input.last_name,
            name_key: input.name_key,
            email: input.email,
            email_key: input.email_key,
            phone: input.phone,
            role: input.role,
            discovery_provenance: input.discovery_provenance.map(Json),
            discovered_by_run_id: input.discovered_by_run_id,
            created_at: now,
            updated_at: now,
        };
        contacts.push(contact.clone());
        Ok(Some(contact))
    }

    async fn find_lead(
        &self,
        company_id: CompanyId,
        contact_id: ContactId,
    ) -> Result<Option<Lead>> {
        Ok(self
            .leads
            .read()
            .unwrap()
            .iter()
            .find(|l| l.company_id == company_id && l.contact_id == contact_id)
            .cloned())
    }

    async fn create_lead(&self, input: CreateLead) -> Result<Option<Lead>> {
        let mut leads = self.leads.write().unwrap();
        if leads
            .iter()
            .any(|l| l.company_id == input.company_id && l.contact_id == input.contact_id)
        {
            return Ok(None);
        }

        let now = Utc::now();
        let lead = Lead {
            id: LeadId::new(),
            company_id: input.company_id,
            contact_id: input.contact_id,
            status: LeadStatus::New,
            discovery_provenance: input.discovery_provenance.map(Json),
            discovered_by_run_id: input.discovered_by_run_id,
            created_at: now,
            updated_at: now,
        };
        leads.push(lead.clone());
        Ok(Some(lead))
    }
}

// =============================================================================
// In-memory Intent Store
// =============================================================================

#[derive(Default)]
pub struct MemoryIntentStore {
    intents: RwLock<HashMap<IntentId, DiscoveryIntent>>,
}

impl MemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, intent: DiscoveryIntent) {
        self.intents.write().unwrap().insert(intent.id, intent);
    }
}

#[async_trait]
impl BaseIntentStore for MemoryIntentStore {
    async fn find(&self, id: IntentId) -> Result<Option<DiscoveryIntent>> {
        Ok(self.intents.read().unwrap().get(&id).cloned())
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub run_store: Arc<MemoryRunStore>,
    pub records: Arc<MemoryRecordStore>,
    pub intents: Arc<MemoryIntentStore>,
    pub channels: ChannelRegistry,
    pub runner: RunnerConfig,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            run_store: Arc::new(MemoryRunStore::new()),
            records: Arc::new(MemoryRecordStore::new()),
            intents: Arc::new(MemoryIntentStore::new()),
            channels: ChannelRegistry::new(),
            runner: RunnerConfig::default(),
        }
    }

    /// Register a channel (keep your own `Arc` to inspect its calls)
    pub fn channel(mut self, channel: Arc<dyn BaseDiscoveryChannel>) -> Self {
        self.channels.register(channel);
        self
    }

    pub fn intent(self, intent: DiscoveryIntent) -> Self {
        self.intents.add(intent);
        self
    }

    /// Flip the runner kill switch
    pub fn runner_enabled(mut self, enabled: bool) -> Self {
        self.runner.enabled = enabled;
        self
    }

    pub fn channel_timeout(mut self, timeout: Duration) -> Self {
        self.runner.channel_timeout = timeout;
        self
    }

    /// Convert into ServerDeps for testing
    pub fn into_server_deps(&self) -> ServerDeps {
        ServerDeps::new(
            self.run_store.clone(),
            self.records.clone(),
            self.intents.clone(),
            self.channels.clone(),
            self.runner,
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
