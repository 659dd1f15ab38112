//! `web_search` discovery channel backed by the Tavily search API.
//!
//! Every search hit is treated as one company candidate: the page title
//! becomes the company name and the site origin its website. Email
//! addresses found in the snippet are reported as contacts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{BaseDiscoveryChannel, ChannelQuery, RawCandidate, RawContact};

pub const WEB_SEARCH_CHANNEL: &str = "web_search";

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
const SEARCH_DEPTH: &str = "basic";
const MAX_DESCRIPTION_CHARS: usize = 500;

/// Tavily API request
#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: String,
    search_depth: &'static str,
    max_results: usize,
}

/// Tavily API response
#[derive(Debug, Deserialize)]
struct TavilyResponse {
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    content: String,
    score: f64,
}

/// Tavily-backed web search channel
pub struct TavilyChannel {
    api_key: String,
    client: reqwest::Client,
}

impl TavilyChannel {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
        })
    }
}

#[async_trait]
impl BaseDiscoveryChannel for TavilyChannel {
    fn name(&self) -> &str {
        WEB_SEARCH_CHANNEL
    }

    async fn search(&self, query: &ChannelQuery, limit: usize) -> Result<Vec<RawCandidate>> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query: query.text.clone(),
            search_depth: SEARCH_DEPTH,
            max_results: limit.max(1),
        };

        let response = self
            .client
            .post(TAVILY_SEARCH_URL)
            .json(&request)
            .send()
            .await
            .context("Failed to send Tavily search request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Tavily API error {}: {}", status, body);
        }

        let tavily_response: TavilyResponse = response
            .json()
            .await
            .context("Failed to parse Tavily response")?;

        tracing::debug!(
            query = %query.text,
            results = tavily_response.results.len(),
            "Tavily search returned"
        );

        Ok(tavily_response
            .results
            .into_iter()
            .take(limit)
            .map(|r| candidate_from_result(r, query.country.clone()))
            .collect())
    }
}

fn candidate_from_result(result: TavilyResult, country: Option<String>) -> RawCandidate {
    let contacts = extract_emails(&result.content)
        .into_iter()
        .map(|email| RawContact {
            email: Some(email),
            ..Default::default()
        })
        .collect();

    RawCandidate {
        name: company_name_from_title(&result.title),
        website: site_origin(&result.url),
        industry: None,
        country,
        description: Some(result.content.chars().take(MAX_DESCRIPTION_CHARS).collect()),
        score: Some(result.score.clamp(0.0, 1.0)),
        contacts,
    }
}

/// "Acme Solar | Installers in Berlin" -> "Acme Solar"
fn company_name_from_title(title: &str) -> String {
    title
        .split(['|', '\u{2013}', '\u{2014}'])
        .next()
        .and_then(|s| s.split(" - ").next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(title.trim())
        .to_string()
}

/// Scheme and host of a URL, dropping path and query.
fn site_origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    Some(format!("{}://{}", url.scheme(), host))
}

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").unwrap();
}

/// Distinct email addresses in `text`, lowercased, in order of appearance.
fn extract_emails(text: &str) -> Vec<String> {
    let mut emails: Vec<String> = Vec::new();
    for found in EMAIL_REGEX.find_iter(text) {
        let email = found.as_str().to_lowercase();
        if !emails.contains(&email) {
            emails.push(email);
        }
    }
    emails
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_suffixes_are_dropped_from_company_name() {
        assert_eq!(company_name_from_title("Acme Solar | Installers in Berlin"), "Acme Solar");
        assert_eq!(company_name_from_title("Acme Solar - Home"), "Acme Solar");
        assert_eq!(company_name_from_title("Plain Name"), "Plain Name");
    }

    #[test]
    fn website_is_reduced_to_origin() {
        assert_eq!(
            site_origin("https://www.acme.example/about?ref=x").as_deref(),
            Some("https://www.acme.example")
        );
        assert_eq!(site_origin("not a url"), None);
    }

    #[test]
    fn emails_are_found_in_snippets() {
        let text = "Contact us at Sales@Acme.example or (info@acme.example). Not: foo@bar";
        assert_eq!(
            extract_emails(text),
            vec!["sales@acme.example".to_string(), "info@acme.example".to_string()]
        );
    }

    #[test]
    fn email_prefixes_and_trailing_punctuation_are_not_part_of_the_address() {
        assert_eq!(
            extract_emails("Write to mailto:sales@acme.example today"),
            vec!["sales@acme.example".to_string()]
        );
        assert_eq!(
            extract_emails("Mail <Info@Acme.example>, or info@acme.example."),
            vec!["info@acme.example".to_string()]
        );
    }

    #[test]
    fn candidate_carries_query_country_and_score() {
        let candidate = candidate_from_result(
            TavilyResult {
                title: "Sonnenkraft GmbH | Solar".to_string(),
                url: "https://sonnenkraft.example/kontakt".to_string(),
                content: "Write to vertrieb@sonnenkraft.example".to_string(),
                score: 1.4,
            },
            Some("DE".to_string()),
        );

        assert_eq!(candidate.name, "Sonnenkraft GmbH");
        assert_eq!(candidate.country.as_deref(), Some("DE"));
        assert_eq!(candidate.score, Some(1.0));
        assert_eq!(candidate.contacts.len(), 1);
    }
}
