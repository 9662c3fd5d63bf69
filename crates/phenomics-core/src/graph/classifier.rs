//! Result classification
//!
//! Turns the raw rows of a query into either a deduplicated graph or a
//! table. Graph entities are keyed by id: the first full occurrence of an
//! id supplies its attributes, later occurrences are ignored. A node first
//! seen only as a relationship endpoint is a placeholder and is replaced
//! by the full node if that shows up later in the same result.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::{ClassifiedResult, GraphData, GraphEdge, GraphNode, ResultShape, Row};
use super::record::{NodeValue, PathValue, RawRecord, RecordValue, RelationshipValue};

/// Property names that cannot be attributes because they collide with
/// serialized structural fields
const NODE_RESERVED: &[&str] = &["id", "caption"];
const EDGE_RESERVED: &[&str] = &["id", "type", "caption", "source", "target", "label"];

/// Settings for [`ResultClassifier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Properties tried in order for a node caption before falling back to the id
    pub caption_keys: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            caption_keys: vec!["name".to_string(), "symbol".to_string()],
        }
    }
}

/// Classifies raw query results into graph or table form
#[derive(Debug, Clone, Default)]
pub struct ResultClassifier {
    config: ClassifierConfig,
}

impl ResultClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Graph if any node, relationship or path was returned, otherwise table
    pub fn classify(&self, records: &[RawRecord]) -> ClassifiedResult {
        self.classify_as(records, ResultShape::Auto)
    }

    /// Classify into a requested shape
    ///
    /// `Graph` always yields a graph, possibly empty. `Table` renders every
    /// column of every record, graph values included, as plain JSON.
    pub fn classify_as(&self, records: &[RawRecord], shape: ResultShape) -> ClassifiedResult {
        if shape == ResultShape::Table {
            return ClassifiedResult::table(records.iter().map(full_row).collect());
        }

        let mut graph = GraphAccumulator::new(&self.config.caption_keys);
        let mut rows = Vec::with_capacity(records.len());

        for record in records {
            let mut row = Row::new();
            for field in &record.fields {
                if field.value.contains_graph() {
                    graph.absorb(&field.value);
                } else {
                    row.insert(field.name.clone(), field.value.to_json());
                }
            }
            rows.push(row);
        }

        if shape == ResultShape::Auto && !graph.observed {
            return ClassifiedResult::table(rows);
        }

        rows.retain(|row| !row.is_empty());
        ClassifiedResult::Graph {
            graph: graph.finish(),
            rows,
        }
    }
}

fn full_row(record: &RawRecord) -> Row {
    record
        .fields
        .iter()
        .map(|field| (field.name.clone(), field.value.to_json()))
        .collect()
}

/// Identity-keyed node and edge sets built up over one classification pass
struct GraphAccumulator<'a> {
    caption_keys: &'a [String],
    nodes: Vec<GraphNode>,
    node_index: HashMap<String, usize>,
    placeholders: HashSet<String>,
    edges: Vec<GraphEdge>,
    edge_ids: HashSet<String>,
    observed: bool,
}

impl<'a> GraphAccumulator<'a> {
    fn new(caption_keys: &'a [String]) -> Self {
        Self {
            caption_keys,
            nodes: Vec::new(),
            node_index: HashMap::new(),
            placeholders: HashSet::new(),
            edges: Vec::new(),
            edge_ids: HashSet::new(),
            observed: false,
        }
    }

    /// Scalars nested inside a graph-bearing collection are dropped
    fn absorb(&mut self, value: &RecordValue) {
        match value {
            RecordValue::Scalar(_) => {}
            RecordValue::Node(node) => {
                self.observed = true;
                self.upsert_node(node);
            }
            RecordValue::Relationship(rel) => {
                self.observed = true;
                self.upsert_relationship(rel);
            }
            RecordValue::Path(path) => {
                self.observed = true;
                self.upsert_path(path);
            }
            RecordValue::Collection(items) => {
                for item in items {
                    self.absorb(item);
                }
            }
        }
    }

    fn upsert_node(&mut self, node: &NodeValue) {
        match self.node_index.get(&node.id) {
            Some(&idx) => {
                if self.placeholders.remove(&node.id) {
                    let built = self.build_node(node);
                    self.nodes[idx] = built;
                }
            }
            None => {
                self.node_index.insert(node.id.clone(), self.nodes.len());
                let built = self.build_node(node);
                self.nodes.push(built);
            }
        }
    }

    fn ensure_endpoint(&mut self, id: &str) {
        if !self.node_index.contains_key(id) {
            self.node_index.insert(id.to_string(), self.nodes.len());
            self.placeholders.insert(id.to_string());
            self.nodes.push(GraphNode::placeholder(id));
        }
    }

    fn upsert_relationship(&mut self, rel: &RelationshipValue) {
        self.ensure_endpoint(&rel.start_id);
        self.ensure_endpoint(&rel.end_id);

        if self.edge_ids.insert(rel.id.clone()) {
            self.edges.push(build_edge(rel));
        }
    }

    fn upsert_path(&mut self, path: &PathValue) {
        for node in &path.nodes {
            self.upsert_node(node);
        }
        for rel in &path.relationships {
            self.upsert_relationship(rel);
        }
    }

    fn build_node(&self, node: &NodeValue) -> GraphNode {
        let caption = self
            .caption_keys
            .iter()
            .filter_map(|key| node.properties.get(key))
            .find_map(caption_text)
            .unwrap_or_else(|| node.id.clone());

        let attributes = node
            .properties
            .iter()
            .filter(|(key, _)| !NODE_RESERVED.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        GraphNode {
            id: node.id.clone(),
            caption,
            labels: node.labels.clone(),
            attributes,
        }
    }

    fn finish(self) -> GraphData {
        GraphData {
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

fn build_edge(rel: &RelationshipValue) -> GraphEdge {
    let attributes = rel
        .properties
        .iter()
        .filter(|(key, _)| !EDGE_RESERVED.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    GraphEdge {
        id: rel.id.clone(),
        caption: rel.rel_type.clone(),
        source: rel.start_id.clone(),
        target: rel.end_id.clone(),
        edge_type: rel.rel_type.clone(),
        attributes,
    }
}

/// Empty strings and nulls do not make a caption
fn caption_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
