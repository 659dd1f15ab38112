use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;

use crate::common::{CompanyId, ContactId, DiscoveryRunId};
use crate::domains::discovery::models::Provenance;

/// A person at a company
///
/// Identity is the lowercased email when present; otherwise the normalized
/// full name within the owning company. Both keys carry unique indexes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: ContactId,
    pub company_id: CompanyId,
    pub first_name: String,
    pub last_name: String,
    pub name_key: String,
    pub email: Option<String>,
    pub email_key: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub discovery_provenance: Option<Json<Provenance>>,
    pub discovered_by_run_id: Option<DiscoveryRunId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct CreateContact {
    pub company_id: CompanyId,
    #[builder(setter(into))]
    pub first_name: String,
    #[builder(setter(into))]
    pub last_name: String,
    #[builder(setter(into))]
    pub name_key: String,
    #[builder(default)]
    pub email: Option<String>,
    #[builder(default)]
    pub email_key: Option<String>,
    #[builder(default)]
    pub phone: Option<String>,
    #[builder(default)]
    pub role: Option<String>,
    #[builder(default, setter(strip_option))]
    pub discovery_provenance: Option<Provenance>,
    #[builder(default, setter(strip_option))]
    pub discovered_by_run_id: Option<DiscoveryRunId>,
}

impl Contact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub async fn find_by_email_key(email_key: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM contacts WHERE email_key = $1")
            .bind(email_key)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Find an email-less contact by normalized name within a company.
    pub async fn find_by_name_key(
        company_id: CompanyId,
        name_key: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM contacts
             WHERE company_id = $1 AND name_key = $2 AND email_key IS NULL",
        )
        .bind(company_id)
        .bind(name_key)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Insert a contact. Returns `None` if either identity key is taken.
    pub async fn create(input: CreateContact, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO contacts
             (id, company_id, first_name, last_name, name_key, email, email_key,
              phone, role, discovery_provenance, discovered_by_run_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT DO NOTHING
             RETURNING *",
        )
        .bind(ContactId::new())
        .bind(input.company_id)
        .bind(input.first_name)
        .bind(input.last_name)
        .bind(input.name_key)
        .bind(input.email)
        .bind(input.email_key)
        .bind(input.phone)
        .bind(input.role)
        .bind(input.discovery_provenance.map(Json))
        .bind(input.discovered_by_run_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }
}
