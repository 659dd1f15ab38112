//! Provisional discovery results
//!
//! A run buffers what it found as an ordered list of `DiscoveryResult`s. They
//! live only inside the run record until materialized into durable
//! Company/Contact/Lead rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a result came from and why it was considered relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub channel: String,
    pub query: String,
    pub discovered_at: DateTime<Utc>,
    pub relevance_score: f64,
    #[serde(default)]
    pub relevance_reasons: Vec<String>,
}

/// Reference from a contact to the company it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRef {
    pub name: String,
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyResult {
    pub name: String,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    pub provenance: Provenance,
}

impl CompanyResult {
    pub fn reference(&self) -> CompanyRef {
        CompanyRef {
            name: self.name.clone(),
            website: self.website.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResult {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub company: CompanyRef,
    pub provenance: Provenance,
}

impl ContactResult {
    /// First and last name joined by a single space, empty parts dropped.
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A company paired with the contact to approach there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadResult {
    pub company: CompanyResult,
    pub contact: ContactResult,
    pub provenance: Provenance,
}

/// One buffered discovery result, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryResult {
    Company(CompanyResult),
    Contact(ContactResult),
    Lead(LeadResult),
}

impl DiscoveryResult {
    pub fn kind(&self) -> &'static str {
        match self {
            DiscoveryResult::Company(_) => "company",
            DiscoveryResult::Contact(_) => "contact",
            DiscoveryResult::Lead(_) => "lead",
        }
    }

    pub fn provenance(&self) -> &Provenance {
        match self {
            DiscoveryResult::Company(c) => &c.provenance,
            DiscoveryResult::Contact(c) => &c.provenance,
            DiscoveryResult::Lead(l) => &l.provenance,
        }
    }

    /// Short label for logs and error messages.
    pub fn label(&self) -> String {
        match self {
            DiscoveryResult::Company(c) => c.name.clone(),
            DiscoveryResult::Contact(c) => c
                .email
                .clone()
                .unwrap_or_else(|| format!("{} @ {}", c.full_name(), c.company.name)),
            DiscoveryResult::Lead(l) => format!("{} @ {}", l.contact.full_name(), l.company.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance() -> Provenance {
        Provenance {
            channel: "web_search".to_string(),
            query: "solar installers Germany".to_string(),
            discovered_at: Utc::now(),
            relevance_score: 0.8,
            relevance_reasons: vec!["matched keyword \"solar\"".to_string()],
        }
    }

    #[test]
    fn results_are_tagged_by_kind() {
        let result = DiscoveryResult::Company(CompanyResult {
            name: "Sonnenkraft GmbH".to_string(),
            website: Some("https://sonnenkraft.de".to_string()),
            industry: None,
            country: Some("DE".to_string()),
            description: None,
            provenance: provenance(),
        });

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "company");
        assert_eq!(json["name"], "Sonnenkraft GmbH");
        assert_eq!(json["provenance"]["relevanceScore"], 0.8);

        let back: DiscoveryResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let json = serde_json::json!({ "type": "invoice", "name": "x" });
        assert!(serde_json::from_value::<DiscoveryResult>(json).is_err());
    }

    #[test]
    fn full_name_skips_missing_parts() {
        let contact = ContactResult {
            first_name: Some(" Ada ".to_string()),
            last_name: None,
            email: None,
            phone: None,
            role: None,
            company: CompanyRef {
                name: "Analytical Engines".to_string(),
                website: None,
            },
            provenance: provenance(),
        };
        assert_eq!(contact.full_name(), "Ada");
    }
}
