use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;

use crate::common::{CompanyId, ContactId, DiscoveryRunId, LeadId};
use crate::domains::discovery::models::Provenance;

/// Pipeline stage of a lead. Discovery only ever creates `New` leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "lead_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Disqualified,
}

/// A sales opportunity. At most one lead exists per (company, contact) pair.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: LeadId,
    pub company_id: CompanyId,
    pub contact_id: ContactId,
    pub status: LeadStatus,
    pub discovery_provenance: Option<Json<Provenance>>,
    pub discovered_by_run_id: Option<DiscoveryRunId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct CreateLead {
    pub company_id: CompanyId,
    pub contact_id: ContactId,
    #[builder(default, setter(strip_option))]
    pub discovery_provenance: Option<Provenance>,
    #[builder(default, setter(strip_option))]
    pub discovered_by_run_id: Option<DiscoveryRunId>,
}

impl Lead {
    pub async fn find_by_pair(
        company_id: CompanyId,
        contact_id: ContactId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM leads WHERE company_id = $1 AND contact_id = $2",
        )
        .bind(company_id)
        .bind(contact_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Insert a `New` lead. Returns `None` when the pair already has one.
    pub async fn create(input: CreateLead, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO leads
             (id, company_id, contact_id, status, discovery_provenance, discovered_by_run_id)
             VALUES ($1, $2, $3, 'new', $4, $5)
             ON CONFLICT (company_id, contact_id) DO NOTHING
             RETURNING *",
        )
        .bind(LeadId::new())
        .bind(input.company_id)
        .bind(input.contact_id)
        .bind(input.discovery_provenance.map(Json))
        .bind(input.discovered_by_run_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }
}
