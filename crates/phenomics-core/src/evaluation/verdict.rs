//! Reviewer verdicts

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured judgement on one query attempt
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    #[serde(default)]
    pub query_summary: String,
    pub accept_query: bool,
    #[serde(default)]
    pub suggestion: String,
    /// "graph" or "table" when the reviewer reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns_edges: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualize: Option<bool>,
}

impl EvaluationVerdict {
    pub fn acceptance(query_summary: impl Into<String>) -> Self {
        Self {
            query_summary: query_summary.into(),
            accept_query: true,
            ..Default::default()
        }
    }

    /// A rejection with `suggestion` as the only content
    pub fn rejection(suggestion: impl Into<String>) -> Self {
        Self {
            accept_query: false,
            suggestion: suggestion.into(),
            ..Default::default()
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accept_query
    }

    /// Parse raw reviewer text
    ///
    /// The outermost `{...}` block is read as the verdict. Anything that does
    /// not yield a boolean `accept_query` becomes a rejection whose
    /// suggestion is the raw text.
    pub fn parse(raw: &str) -> Self {
        if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}'))
            && start < end
            && let Ok(value) = serde_json::from_str::<Value>(&raw[start..=end])
            && value.get("accept_query").is_some_and(Value::is_boolean)
            && let Ok(verdict) = serde_json::from_value::<EvaluationVerdict>(value)
        {
            return verdict;
        }

        Self::rejection(raw.trim())
    }
}
