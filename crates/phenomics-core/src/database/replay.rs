//! Recorded results served without a database

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{GraphBackend, Params};
use crate::error::{Error, Result};
use crate::graph::RawRecord;

/// Fixture file layout: results keyed by exact query text, plus an
/// optional default for any other query
#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    queries: HashMap<String, FixtureEntry>,
    #[serde(default)]
    default: Option<FixtureEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FixtureEntry {
    Records(Vec<RawRecord>),
    Failure { error: String },
}

/// Backend that replays canned rows
///
/// Queries are matched on their whitespace-normalized text. Parameters are
/// ignored.
#[derive(Debug, Default)]
pub struct ReplayBackend {
    responses: HashMap<String, FixtureEntry>,
    fallback: Option<FixtureEntry>,
}

impl ReplayBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `records` for every query without a specific response
    pub fn with_default(mut self, records: Vec<RawRecord>) -> Self {
        self.fallback = Some(FixtureEntry::Records(records));
        self
    }

    /// Serve `records` for `query`
    pub fn with_response(mut self, query: &str, records: Vec<RawRecord>) -> Self {
        self.responses
            .insert(normalize(query), FixtureEntry::Records(records));
        self
    }

    /// Fail `query` with a database error
    pub fn with_failure(mut self, query: &str, message: impl Into<String>) -> Self {
        self.responses.insert(
            normalize(query),
            FixtureEntry::Failure {
                error: message.into(),
            },
        );
        self
    }

    /// Load a JSON fixture file
    ///
    /// ```json
    /// {"queries": {"MATCH (n) RETURN n": [[{"name": "n", "value": {"kind": "node", "value": {"id": "G1"}}}]]},
    ///  "default": []}
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::FixtureError(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&contents)
            .map_err(|e| Error::FixtureError(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let fixture: Fixture = serde_json::from_str(contents)?;
        Ok(Self {
            responses: fixture
                .queries
                .into_iter()
                .map(|(query, entry)| (normalize(&query), entry))
                .collect(),
            fallback: fixture.default,
        })
    }
}

#[async_trait]
impl GraphBackend for ReplayBackend {
    async fn execute(&self, query: &str, _params: Option<&Params>) -> Result<Vec<RawRecord>> {
        let key = normalize(query);
        let entry = self
            .responses
            .get(&key)
            .or(self.fallback.as_ref())
            .ok_or_else(|| Error::QueryExecution(format!("no recorded result for query: {}", key)))?;

        debug!(query = %key, "Replaying recorded result");

        match entry {
            FixtureEntry::Records(records) => Ok(records.clone()),
            FixtureEntry::Failure { error } => Err(Error::QueryExecution(error.clone())),
        }
    }

    fn name(&self) -> &str {
        "replay"
    }
}

fn normalize(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}
