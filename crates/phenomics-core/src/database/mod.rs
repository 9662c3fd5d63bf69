//! Graph database access
//!
//! [`GraphBackend`] is the boundary to the database: a query string and
//! optional named parameters in, typed rows out. Implementations:
//! - [`Neo4jBackend`]: a pooled Bolt connection via `neo4rs`
//! - [`ReplayBackend`]: recorded results served from memory or a fixture file

mod neo4j;
mod replay;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::graph::RawRecord;

pub use neo4j::Neo4jBackend;
pub use replay::ReplayBackend;

/// Named query parameters
pub type Params = Map<String, Value>;

/// Executes queries against a graph database
///
/// Implementations are shared across conversations and must be safe for
/// concurrent use. Dropping the returned future must abandon the query and
/// release whatever session it held.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Run a query and collect every row
    async fn execute(&self, query: &str, params: Option<&Params>) -> Result<Vec<RawRecord>>;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// Parse a JSON object string into query parameters
pub fn parse_params(text: &str) -> Result<Params> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => Err(crate::Error::InvalidInput(format!(
            "query parameters must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
