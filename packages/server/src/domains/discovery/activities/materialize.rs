//! Result materializer
//!
//! Turns buffered discovery results into Company/Contact/Lead rows. Existing
//! rows are never touched; a result whose record already exists is counted as
//! skipped. Running it twice over the same results creates nothing the second
//! time.
//!
//! The same walk runs in `Project` mode for dry runs: identical lookups, no
//! writes, so the projected counts are exactly what `Create` would produce.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};
use tracing::{debug, warn};

use super::dedup::{company_result_key, normalize_name, ContactIdentity};
use crate::common::{CompanyId, ContactId, DiscoveryRunId};
use crate::domains::companies::CreateCompany;
use crate::domains::contacts::CreateContact;
use crate::domains::discovery::models::{
    CompanyRef, CompanyResult, ContactResult, DiscoveryResult, LeadResult, MaterializeOutcome,
    Provenance,
};
use crate::domains::leads::CreateLead;
use crate::kernel::BaseRecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeMode {
    /// Look up only; count what would be created.
    Project,
    /// Create missing rows.
    Create,
}

/// Materialize `results` in order. Per-result failures are collected in the
/// outcome's `errors` and do not stop the walk.
pub async fn materialize_results(
    run_id: DiscoveryRunId,
    results: &[DiscoveryResult],
    mode: MaterializeMode,
    records: &dyn BaseRecordStore,
) -> MaterializeOutcome {
    let mut ledger = Ledger::new(run_id, mode, records);

    for result in results {
        let applied = match result {
            DiscoveryResult::Company(company) => ledger.company(company).await,
            DiscoveryResult::Contact(contact) => ledger.contact(contact).await,
            DiscoveryResult::Lead(lead) => ledger.lead(lead).await,
        };

        match applied {
            Ok(true) => {}
            Ok(false) => ledger.outcome.skipped += 1,
            Err(e) => {
                warn!(run_id = %run_id, kind = result.kind(), result = %result.label(), error = %e, "Failed to materialize result");
                ledger
                    .outcome
                    .errors
                    .push(format!("{} {}: {}", result.kind(), result.label(), e));
            }
        }
    }

    debug!(
        run_id = %run_id,
        ?mode,
        companies = ledger.outcome.created.companies,
        contacts = ledger.outcome.created.contacts,
        leads = ledger.outcome.created.leads,
        skipped = ledger.outcome.skipped,
        errors = ledger.outcome.errors.len(),
        "Materialized discovery results"
    );

    ledger.outcome
}

/// A record resolved during the walk.
#[derive(Debug, Clone, Copy)]
enum Slot<I> {
    Existing(I),
    /// Would be created (projection only).
    Planned,
}

impl<I: Copy> Slot<I> {
    fn id(&self) -> Option<I> {
        match self {
            Slot::Existing(id) => Some(*id),
            Slot::Planned => None,
        }
    }
}

struct Ledger<'a> {
    run_id: DiscoveryRunId,
    mode: MaterializeMode,
    records: &'a dyn BaseRecordStore,
    companies: HashMap<String, Slot<CompanyId>>,
    contacts: HashMap<String, Slot<ContactId>>,
    leads: HashSet<String>,
    outcome: MaterializeOutcome,
}

impl<'a> Ledger<'a> {
    fn new(run_id: DiscoveryRunId, mode: MaterializeMode, records: &'a dyn BaseRecordStore) -> Self {
        Self {
            run_id,
            mode,
            records,
            companies: HashMap::new(),
            contacts: HashMap::new(),
            leads: HashSet::new(),
            outcome: MaterializeOutcome::default(),
        }
    }

    /// Returns whether a new company row was (or would be) created.
    async fn company(&mut self, company: &CompanyResult) -> Result<bool> {
        let (_, created) = self.resolve_company(company).await?;
        Ok(created)
    }

    async fn contact(&mut self, contact: &ContactResult) -> Result<bool> {
        ContactIdentity::of(contact).ok_or_else(|| anyhow!("contact has neither email nor name"))?;
        let company = company_from_ref(&contact.company, &contact.provenance);
        let (company_slot, _) = self.resolve_company(&company).await?;
        let (_, created) = self.resolve_contact(contact, company_slot).await?;
        Ok(created)
    }

    async fn lead(&mut self, lead: &LeadResult) -> Result<bool> {
        let identity = ContactIdentity::of(&lead.contact)
            .ok_or_else(|| anyhow!("lead contact has neither email nor name"))?;
        let (company_slot, _) = self.resolve_company(&lead.company).await?;
        let (contact_slot, _) = self.resolve_contact(&lead.contact, company_slot).await?;

        let key = format!("{}|{}", company_result_key(&lead.company), identity.key());
        if self.leads.contains(&key) {
            return Ok(false);
        }

        let created = match (company_slot.id(), contact_slot.id()) {
            (Some(company_id), Some(contact_id)) => {
                if self.records.find_lead(company_id, contact_id).await?.is_some() {
                    false
                } else {
                    match self.mode {
                        MaterializeMode::Project => true,
                        MaterializeMode::Create => {
                            let input = CreateLead::builder()
                                .company_id(company_id)
                                .contact_id(contact_id)
                                .discovery_provenance(lead.provenance.clone())
                                .discovered_by_run_id(self.run_id)
                                .build();
                            self.records.create_lead(input).await?.is_some()
                        }
                    }
                }
            }
            // Company or contact is only planned, so the lead cannot exist yet
            _ => true,
        };

        self.leads.insert(key);
        if created {
            self.outcome.created.leads += 1;
        }
        Ok(created)
    }

    async fn resolve_company(&mut self, company: &CompanyResult) -> Result<(Slot<CompanyId>, bool)> {
        let key = company_result_key(company);
        if let Some(slot) = self.companies.get(&key) {
            return Ok((*slot, false));
        }

        if let Some(existing) = self.records.find_company(&key).await? {
            let slot = Slot::Existing(existing.id);
            self.companies.insert(key, slot);
            return Ok((slot, false));
        }

        let (slot, created) = match self.mode {
            MaterializeMode::Project => (Slot::Planned, true),
            MaterializeMode::Create => {
                let input = CreateCompany::builder()
                    .name(company.name.trim())
                    .website(company.website.clone())
                    .dedup_key(key.clone())
                    .industry(company.industry.clone())
                    .country(company.country.clone())
                    .description(company.description.clone())
                    .discovery_provenance(company.provenance.clone())
                    .discovered_by_run_id(self.run_id)
                    .build();

                match self.records.create_company(input).await? {
                    Some(row) => (Slot::Existing(row.id), true),
                    // Lost a race with a concurrent insert
                    None => {
                        let row = self
                            .records
                            .find_company(&key)
                            .await?
                            .ok_or_else(|| anyhow!("company {} vanished after conflict", key))?;
                        (Slot::Existing(row.id), false)
                    }
                }
            }
        };

        if created {
            self.outcome.created.companies += 1;
        }
        self.companies.insert(key, slot);
        Ok((slot, created))
    }

    async fn resolve_contact(
        &mut self,
        contact: &ContactResult,
        company: Slot<CompanyId>,
    ) -> Result<(Slot<ContactId>, bool)> {
        let identity = ContactIdentity::of(contact)
            .ok_or_else(|| anyhow!("contact has neither email nor name"))?;
        let key = identity.key();
        if let Some(slot) = self.contacts.get(&key) {
            return Ok((*slot, false));
        }

        let existing = match (&identity, company.id()) {
            (ContactIdentity::Email(email), _) => self.records.find_contact_by_email(email).await?,
            (ContactIdentity::Name { name_key, .. }, Some(company_id)) => {
                self.records.find_contact_by_name(company_id, name_key).await?
            }
            // Planned company has no contacts yet
            (ContactIdentity::Name { .. }, None) => None,
        };
        if let Some(row) = existing {
            let slot = Slot::Existing(row.id);
            self.contacts.insert(key, slot);
            return Ok((slot, false));
        }

        let (slot, created) = match (self.mode, company.id()) {
            (MaterializeMode::Create, Some(company_id)) => {
                let email_key = match &identity {
                    ContactIdentity::Email(email) => Some(email.clone()),
                    ContactIdentity::Name { .. } => None,
                };
                let input = CreateContact::builder()
                    .company_id(company_id)
                    .first_name(contact.first_name.clone().unwrap_or_default())
                    .last_name(contact.last_name.clone().unwrap_or_default())
                    .name_key(normalize_name(&contact.full_name()))
                    .email(contact.email.as_ref().map(|e| e.trim().to_string()))
                    .email_key(email_key)
                    .phone(contact.phone.clone())
                    .role(contact.role.clone())
                    .discovery_provenance(contact.provenance.clone())
                    .discovered_by_run_id(self.run_id)
                    .build();

                match self.records.create_contact(input).await? {
                    Some(row) => (Slot::Existing(row.id), true),
                    None => {
                        let row = match &identity {
                            ContactIdentity::Email(email) => {
                                self.records.find_contact_by_email(email).await?
                            }
                            ContactIdentity::Name { name_key, .. } => {
                                self.records.find_contact_by_name(company_id, name_key).await?
                            }
                        }
                        .ok_or_else(|| anyhow!("contact {} vanished after conflict", key))?;
                        (Slot::Existing(row.id), false)
                    }
                }
            }
            (MaterializeMode::Create, None) => {
                return Err(anyhow!("company for contact {} was not created", key));
            }
            (MaterializeMode::Project, _) => (Slot::Planned, true),
        };

        if created {
            self.outcome.created.contacts += 1;
        }
        self.contacts.insert(key, slot);
        Ok((slot, created))
    }
}

/// A contact's company reference expanded into a minimal company result.
fn company_from_ref(company: &CompanyRef, provenance: &Provenance) -> CompanyResult {
    CompanyResult {
        name: company.name.clone(),
        website: company.website.clone(),
        industry: None,
        country: None,
        description: None,
        provenance: provenance.clone(),
    }
}
