//! Canonical result shapes handed to callers and the UI
//!
//! Nodes and edges serialize as flat attribute maps (`id`, `caption`,
//! attributes; edges add `source`, `target`, `label`), the element format
//! graph visualizers consume.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::Properties;
use crate::error::{Error, Result};

/// A table row: column name to JSON value
pub type Row = Map<String, Value>;

/// A deduplicated graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub caption: String,
    /// Database labels; cleared once a single category has been chosen
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(flatten)]
    pub attributes: Properties,
}

impl GraphNode {
    /// A node known only by id, e.g. the far end of a relationship
    pub fn placeholder(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            caption: id.clone(),
            id,
            labels: Vec::new(),
            attributes: Properties::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// The single category assigned by projection, if any
    pub fn category(&self) -> Option<&str> {
        self.attributes.get("category").and_then(Value::as_str)
    }
}

/// A deduplicated graph edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub caption: String,
    pub source: String,
    pub target: String,
    /// Relationship type
    #[serde(rename = "label")]
    pub edge_type: String,
    #[serde(flatten)]
    pub attributes: Properties,
}

impl GraphEdge {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Nodes and edges of a graph-shaped result
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphData {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&GraphEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Outcome of classifying a raw result
///
/// Scalar columns that accompanied graph values are kept in the `rows`
/// of the `Graph` variant rather than discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ClassifiedResult {
    Graph {
        #[serde(flatten)]
        graph: GraphData,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rows: Vec<Row>,
    },
    Table {
        rows: Vec<Row>,
    },
    Error {
        message: String,
    },
}

impl ClassifiedResult {
    pub fn graph(graph: GraphData) -> Self {
        Self::Graph {
            graph,
            rows: Vec::new(),
        }
    }

    pub fn table(rows: Vec<Row>) -> Self {
        Self::Table { rows }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_graph(&self) -> bool {
        matches!(self, Self::Graph { .. })
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table { .. })
    }

    pub fn as_graph(&self) -> Option<&GraphData> {
        match self {
            Self::Graph { graph, .. } => Some(graph),
            _ => None,
        }
    }

    /// Table rows, or the scalar side-rows of a graph result
    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Graph { rows, .. } | Self::Table { rows } => rows,
            Self::Error { .. } => &[],
        }
    }

    pub fn node_count(&self) -> usize {
        self.as_graph().map_or(0, |g| g.nodes.len())
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Self::Graph { .. } => "graph",
            Self::Table { .. } => "table",
            Self::Error { .. } => "error",
        }
    }

    /// Tagged JSON form handed to the reviewer and to callers
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Shape a caller asks the executor to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultShape {
    /// Graph if any graph primitive was returned, otherwise table
    #[default]
    Auto,
    Graph,
    Table,
}

impl fmt::Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Graph => write!(f, "graph"),
            Self::Table => write!(f, "table"),
        }
    }
}

impl FromStr for ResultShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "graph" => Ok(Self::Graph),
            "table" => Ok(Self::Table),
            _ => Err(Error::InvalidResultShape(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_serializes_flat() {
        let mut node = GraphNode::placeholder("G1");
        node.caption = "BRCA1".to_string();
        node.attributes.insert("symbol".to_string(), json!("BRCA1"));

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json, json!({"id": "G1", "caption": "BRCA1", "symbol": "BRCA1"}));
    }

    #[test]
    fn test_edge_serializes_type_as_label() {
        let edge = GraphEdge {
            id: "R1".to_string(),
            caption: "causes".to_string(),
            source: "G1".to_string(),
            target: "D1".to_string(),
            edge_type: "causes".to_string(),
            attributes: Properties::new(),
        };

        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["label"], "causes");
        assert_eq!(json["source"], "G1");
        assert!(json.get("edge_type").is_none());
    }

    #[test]
    fn test_classified_result_tagging() {
        let table = ClassifiedResult::table(vec![]);
        assert_eq!(table.to_json().unwrap(), json!({"type": "table", "data": {"rows": []}}));

        let graph = ClassifiedResult::graph(GraphData::default());
        assert_eq!(
            graph.to_json().unwrap(),
            json!({"type": "graph", "data": {"nodes": [], "edges": []}})
        );

        let error = ClassifiedResult::error("boom");
        assert_eq!(error.to_json().unwrap(), json!({"type": "error", "data": {"message": "boom"}}));
    }

    #[test]
    fn test_to_json_is_the_serialized_form() {
        let mut node = GraphNode::placeholder("HGNC:1884");
        node.attributes.insert("name".to_string(), json!("CFTR"));
        let result = ClassifiedResult::graph(GraphData {
            nodes: vec![node],
            edges: vec![],
        });

        let value = result.to_json().unwrap();
        assert_eq!(value, serde_json::to_value(&result).unwrap());
        assert_eq!(value["data"]["nodes"][0]["name"], "CFTR");
        assert!(!value.is_null());
    }

    #[test]
    fn test_classified_result_roundtrip_keeps_attributes() {
        let mut node = GraphNode::placeholder("G1");
        node.attributes.insert("name".to_string(), json!("BRCA1"));
        let result = ClassifiedResult::graph(GraphData {
            nodes: vec![node],
            edges: vec![],
        });

        let text = serde_json::to_string(&result).unwrap();
        let parsed: ClassifiedResult = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn test_result_shape_parsing() {
        assert_eq!("graph".parse::<ResultShape>().unwrap(), ResultShape::Graph);
        assert_eq!(" TABLE ".parse::<ResultShape>().unwrap(), ResultShape::Table);
        assert_eq!("auto".parse::<ResultShape>().unwrap(), ResultShape::Auto);

        let err = "tree".parse::<ResultShape>().unwrap_err();
        assert!(matches!(err, Error::InvalidResultShape(ref s) if s == "tree"));
        assert_eq!(err.code(), "E402");
    }

    #[test]
    fn test_rows_accessor() {
        let mut row = Row::new();
        row.insert("n".to_string(), json!(1));
        let table = ClassifiedResult::table(vec![row.clone()]);
        assert_eq!(table.rows(), &[row]);
        assert!(ClassifiedResult::error("x").rows().is_empty());
        assert_eq!(table.node_count(), 0);
    }
}
