//! Term lookup against the Monarch search API
//!
//! Queries need exact node ids (`HGNC:11537`), which users rarely know. The
//! agent resolves names to ids with a search before writing a query.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// Monarch v3 search endpoint
pub const MONARCH_SEARCH_URL: &str = "https://api-v3.monarchinitiative.org/v3/api/search";

/// Hits kept per term
const RESULTS_PER_TERM: usize = 5;

/// Fields kept from each hit
const HIT_FIELDS: [&str; 4] = ["id", "category", "name", "in_taxon_label"];

/// Matches for one search term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermMatches {
    pub term: String,
    pub items: Vec<Map<String, Value>>,
}

/// Resolves free-text terms to graph nodes
#[async_trait]
pub trait TermSearch: Send + Sync {
    async fn search(&self, terms: &[String]) -> Result<Vec<TermMatches>>;
}

/// [`TermSearch`] over the public Monarch API
#[derive(Debug, Clone)]
pub struct MonarchSearch {
    http_client: HttpClient,
    base_url: String,
}

impl MonarchSearch {
    pub fn new() -> Result<Self> {
        Self::with_url(MONARCH_SEARCH_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(Error::NetworkError)?;
        Ok(Self {
            http_client,
            base_url: url.into(),
        })
    }
}

#[async_trait]
impl TermSearch for MonarchSearch {
    async fn search(&self, terms: &[String]) -> Result<Vec<TermMatches>> {
        let mut matches = Vec::with_capacity(terms.len());

        for term in terms {
            let limit = RESULTS_PER_TERM.to_string();
            let response = self
                .http_client
                .get(&self.base_url)
                .query(&[("q", term.as_str()), ("limit", limit.as_str()), ("offset", "0")])
                .send()
                .await?
                .error_for_status()?;
            let body: Value = response.json().await?;

            let items = slim_hits(&body);
            debug!(term = %term, hits = items.len(), "Searched Monarch");
            matches.push(TermMatches {
                term: term.clone(),
                items,
            });
        }

        Ok(matches)
    }
}

/// Keep the identifying fields of each hit in a search response
pub fn slim_hits(body: &Value) -> Vec<Map<String, Value>> {
    body.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|item| {
                    item.iter()
                        .filter(|(key, _)| HIT_FIELDS.contains(&key.as_str()))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Search terms from a fenced `search` block, one per line
pub fn extract_search_terms(reply: &str) -> Option<Vec<String>> {
    let start = reply.find("```search")?;
    let body = &reply[start + "```search".len()..];
    let end = body.find("```")?;

    let terms: Vec<String> = body[..end]
        .lines()
        .map(|line| line.trim().trim_start_matches("- ").trim_matches('"').trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    (!terms.is_empty()).then_some(terms)
}
