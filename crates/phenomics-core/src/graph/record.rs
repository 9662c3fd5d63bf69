//! Raw query results as delivered by a graph backend
//!
//! Every value in a result row is one of a closed set of shapes, so
//! classification is a single exhaustive match instead of run-time type
//! inspection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property map of a node or relationship
pub type Properties = Map<String, Value>;

/// A node as returned by the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeValue {
    /// Stable identity key
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl NodeValue {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            labels: Vec::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A directed, typed link between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipValue {
    pub id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub start_id: String,
    pub end_id: String,
    #[serde(default)]
    pub properties: Properties,
}

impl RelationshipValue {
    pub fn new(
        id: impl Into<String>,
        rel_type: impl Into<String>,
        start_id: impl Into<String>,
        end_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            rel_type: rel_type.into(),
            start_id: start_id.into(),
            end_id: end_id.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// An alternating walk of nodes and relationships
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PathValue {
    pub nodes: Vec<NodeValue>,
    pub relationships: Vec<RelationshipValue>,
}

/// One named value in a result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RecordValue {
    Scalar(Value),
    Node(NodeValue),
    Relationship(RelationshipValue),
    Path(PathValue),
    Collection(Vec<RecordValue>),
}

impl RecordValue {
    /// Whether this value, or anything nested in it, is a graph primitive
    pub fn contains_graph(&self) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Node(_) | Self::Relationship(_) | Self::Path(_) => true,
            Self::Collection(items) => items.iter().any(Self::contains_graph),
        }
    }

    /// Plain JSON rendering, used when a value lands in a table row
    pub fn to_json(&self) -> Value {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Node(node) => Value::Object(node.properties.clone()),
            Self::Relationship(rel) => Value::Object(rel.properties.clone()),
            Self::Path(path) => Value::Array(
                path.nodes
                    .iter()
                    .map(|n| Value::Object(n.properties.clone()))
                    .collect(),
            ),
            Self::Collection(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

impl From<Value> for RecordValue {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<NodeValue> for RecordValue {
    fn from(node: NodeValue) -> Self {
        Self::Node(node)
    }
}

impl From<RelationshipValue> for RecordValue {
    fn from(rel: RelationshipValue) -> Self {
        Self::Relationship(rel)
    }
}

impl From<PathValue> for RecordValue {
    fn from(path: PathValue) -> Self {
        Self::Path(path)
    }
}

/// A named column of a result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub value: RecordValue,
}

/// One row of a query result, columns in return order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    pub fields: Vec<RecordField>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RecordValue>) -> Self {
        self.fields.push(RecordField {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&RecordValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
