use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;

use crate::common::{CompanyId, DiscoveryRunId};
use crate::domains::discovery::models::Provenance;

/// A company record in the CRM
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub website: Option<String>,
    /// Canonical identity used for duplicate detection (unique).
    pub dedup_key: String,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    /// Set only on rows created by discovery.
    pub discovery_provenance: Option<Json<Provenance>>,
    pub discovered_by_run_id: Option<DiscoveryRunId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new company
#[derive(Debug, Clone, TypedBuilder)]
pub struct CreateCompany {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default)]
    pub website: Option<String>,
    #[builder(setter(into))]
    pub dedup_key: String,
    #[builder(default)]
    pub industry: Option<String>,
    #[builder(default)]
    pub country: Option<String>,
    #[builder(default)]
    pub description: Option<String>,
    #[builder(default, setter(strip_option))]
    pub discovery_provenance: Option<Provenance>,
    #[builder(default, setter(strip_option))]
    pub discovered_by_run_id: Option<DiscoveryRunId>,
}

impl Company {
    pub async fn find_by_dedup_key(key: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM companies WHERE dedup_key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Insert a company. Returns `None` when another row already holds the
    /// same dedup key; existing rows are never updated.
    pub async fn create(input: CreateCompany, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO companies
             (id, name, website, dedup_key, industry, country, description,
              discovery_provenance, discovered_by_run_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (dedup_key) DO NOTHING
             RETURNING *",
        )
        .bind(CompanyId::new())
        .bind(input.name)
        .bind(input.website)
        .bind(input.dedup_key)
        .bind(input.industry)
        .bind(input.country)
        .bind(input.description)
        .bind(input.discovery_provenance.map(Json))
        .bind(input.discovered_by_run_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }
}
