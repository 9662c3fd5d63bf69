//! Size-bounded previews of nested results
//!
//! Lists longer than the threshold keep their first items, each summarized
//! in turn, followed by a single `"..."` marker. Maps keep every key.
//! Scalars are returned unchanged.

use serde_json::Value;

/// Appended in place of the dropped tail of a long list
pub const TRUNCATION_MARKER: &str = "...";

/// Default number of list items kept at each level
pub const DEFAULT_MAX_LIST_ITEMS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureSummarizer {
    max_list_items: usize,
}

impl Default for StructureSummarizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LIST_ITEMS)
    }
}

impl StructureSummarizer {
    pub fn new(max_list_items: usize) -> Self {
        Self { max_list_items }
    }

    pub fn max_list_items(&self) -> usize {
        self.max_list_items
    }

    pub fn summarize(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, v)| (key.clone(), self.summarize(v)))
                    .collect(),
            ),
            Value::Array(items) if items.len() > self.max_list_items => {
                let mut kept: Vec<Value> = items
                    .iter()
                    .take(self.max_list_items)
                    .map(|v| self.summarize(v))
                    .collect();
                kept.push(Value::String(TRUNCATION_MARKER.to_string()));
                Value::Array(kept)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.summarize(v)).collect()),
            scalar => scalar.clone(),
        }
    }
}

/// Summarize with the default threshold
pub fn summarize(value: &Value) -> Value {
    StructureSummarizer::default().summarize(value)
}
