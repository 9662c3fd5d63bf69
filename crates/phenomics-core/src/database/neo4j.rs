//! Neo4j backend over Bolt

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use neo4rs::{
    BoltList, BoltMap, BoltNode, BoltNull, BoltPath, BoltRelation, BoltString, BoltType,
    BoltUnboundedRelation, ConfigBuilder, Graph,
};
use serde_json::{Number, Value};
use tracing::{debug, info};

use super::{GraphBackend, Params};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::graph::{NodeValue, PathValue, Properties, RawRecord, RecordValue, RelationshipValue};

/// Property holding the stable identity of Monarch nodes and edges
const IDENTITY_PROPERTY: &str = "id";

/// Pooled Neo4j connection
///
/// The pool is shared: clones and concurrent conversations use the same
/// connections.
#[derive(Clone)]
pub struct Neo4jBackend {
    graph: Arc<Graph>,
    uri: String,
}

impl std::fmt::Debug for Neo4jBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jBackend").field("uri", &self.uri).finish()
    }
}

impl Neo4jBackend {
    /// Connect using database settings; the password comes from NEO4J_PASSWORD
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let driver_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.username.as_str())
            .password(config.password.clone().unwrap_or_default())
            .db(config.database.as_str())
            .max_connections(config.pool_size)
            .build()
            .map_err(|e| Error::DatabaseConnection(e.to_string()))?;

        let graph = Graph::connect(driver_config)
            .await
            .map_err(|e| Error::DatabaseConnection(e.to_string()))?;

        info!(uri = %config.uri, pool_size = config.pool_size, "Connected to Neo4j");

        Ok(Self {
            graph: Arc::new(graph),
            uri: config.uri.clone(),
        })
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        self.execute("RETURN 1 AS ok", None).await.map(|_| ())
    }
}

#[async_trait]
impl GraphBackend for Neo4jBackend {
    /// Rows are pulled from a stream owned by this future; dropping the
    /// future drops the stream together with its connection, so a timed
    /// out query stops being consumed immediately.
    async fn execute(&self, query: &str, params: Option<&Params>) -> Result<Vec<RawRecord>> {
        let mut bolt_query = neo4rs::query(query);
        if let Some(params) = params {
            for (key, value) in params {
                bolt_query = bolt_query.param(key, json_to_bolt(value));
            }
        }

        let mut stream = self
            .graph
            .execute(bolt_query)
            .await
            .map_err(|e| Error::QueryExecution(e.to_string()))?;

        let mut rows = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| Error::QueryExecution(e.to_string()))?
        {
            let columns: BTreeMap<String, BoltType> = row
                .to()
                .map_err(|e| Error::QueryExecution(format!("unreadable row: {}", e)))?;
            rows.push(columns);
        }

        // A relationship may arrive rows before its endpoint nodes
        let converter = RowConverter::from_rows(&rows);
        let records: Vec<RawRecord> = rows
            .into_iter()
            .map(|columns| converter.convert_row(columns))
            .collect();

        debug!(rows = records.len(), "Neo4j query complete");
        Ok(records)
    }

    fn name(&self) -> &str {
        "neo4j"
    }
}

/// Converts Bolt rows, knowing which identity key each internal node id
/// of the whole result maps to so relationship endpoints resolve to the
/// same keys
#[derive(Default)]
struct RowConverter {
    node_keys: HashMap<i64, String>,
}

impl RowConverter {
    fn from_rows(rows: &[BTreeMap<String, BoltType>]) -> Self {
        let mut converter = Self::default();
        for value in rows.iter().flat_map(|columns| columns.values()) {
            converter.remember_nodes(value);
        }
        converter
    }

    fn convert_row(&self, columns: BTreeMap<String, BoltType>) -> RawRecord {
        let mut record = RawRecord::new();
        for (name, value) in columns {
            let converted = self.convert(&value);
            record = record.with(name, converted);
        }
        record
    }

    fn remember_nodes(&mut self, value: &BoltType) {
        match value {
            BoltType::Node(node) => {
                self.node_keys.insert(node.id.value, node_key(node));
            }
            BoltType::Path(path) => {
                for item in &path.nodes.value {
                    self.remember_nodes(item);
                }
            }
            BoltType::List(list) => {
                for item in &list.value {
                    self.remember_nodes(item);
                }
            }
            _ => {}
        }
    }

    fn convert(&self, value: &BoltType) -> RecordValue {
        match value {
            BoltType::Node(node) => RecordValue::Node(convert_node(node)),
            BoltType::Relation(rel) => RecordValue::Relationship(self.convert_relation(rel)),
            BoltType::Path(path) => RecordValue::Path(convert_path(path)),
            BoltType::List(list) if list.value.iter().any(is_graph) => {
                RecordValue::Collection(list.value.iter().map(|v| self.convert(v)).collect())
            }
            other => RecordValue::Scalar(bolt_to_json(other)),
        }
    }

    fn convert_relation(&self, rel: &BoltRelation) -> RelationshipValue {
        let endpoint = |internal: i64| {
            self.node_keys
                .get(&internal)
                .cloned()
                .unwrap_or_else(|| internal.to_string())
        };

        RelationshipValue {
            id: identity(&rel.properties, rel.id.value),
            rel_type: rel.typ.value.clone(),
            start_id: endpoint(rel.start_node_id.value),
            end_id: endpoint(rel.end_node_id.value),
            properties: properties(&rel.properties),
        }
    }
}

fn is_graph(value: &BoltType) -> bool {
    match value {
        BoltType::Node(_) | BoltType::Relation(_) | BoltType::Path(_) => true,
        BoltType::List(list) => list.value.iter().any(is_graph),
        _ => false,
    }
}

fn node_key(node: &BoltNode) -> String {
    identity(&node.properties, node.id.value)
}

/// The `id` property when it is a string, else the internal id
fn identity(props: &BoltMap, internal: i64) -> String {
    match props.value.get(&BoltString::from(IDENTITY_PROPERTY)) {
        Some(BoltType::String(s)) => s.value.clone(),
        _ => internal.to_string(),
    }
}

fn convert_node(node: &BoltNode) -> NodeValue {
    NodeValue {
        id: node_key(node),
        labels: node
            .labels
            .value
            .iter()
            .filter_map(|label| match label {
                BoltType::String(s) => Some(s.value.clone()),
                _ => None,
            })
            .collect(),
        properties: properties(&node.properties),
    }
}

/// Rebuild a path from Bolt's unique node/relationship lists and the
/// alternating (relationship, node) index sequence. A positive
/// relationship index walks forwards, a negative one backwards.
fn convert_path(path: &BoltPath) -> PathValue {
    let nodes: Vec<&BoltNode> = path
        .nodes
        .value
        .iter()
        .filter_map(|v| match v {
            BoltType::Node(node) => Some(node),
            _ => None,
        })
        .collect();
    let rels: Vec<&BoltUnboundedRelation> = path
        .rels
        .value
        .iter()
        .filter_map(|v| match v {
            BoltType::UnboundedRelation(rel) => Some(rel),
            _ => None,
        })
        .collect();
    let indices: Vec<i64> = path
        .indices
        .value
        .iter()
        .filter_map(|v| match v {
            BoltType::Integer(i) => Some(i.value),
            _ => None,
        })
        .collect();

    let mut relationships = Vec::new();
    let mut previous = 0usize;

    for step in indices.chunks_exact(2) {
        let (rel_index, node_index) = (step[0], step[1]);
        let Ok(next) = usize::try_from(node_index) else {
            break;
        };
        let rel_slot = usize::try_from(rel_index.unsigned_abs()).unwrap_or(0);
        let (Some(rel), Some(from), Some(to)) = (
            rel_slot.checked_sub(1).and_then(|i| rels.get(i)),
            nodes.get(previous),
            nodes.get(next),
        ) else {
            break;
        };

        let (start, end) = if rel_index > 0 { (from, to) } else { (to, from) };
        relationships.push(RelationshipValue {
            id: identity(&rel.properties, rel.id.value),
            rel_type: rel.typ.value.clone(),
            start_id: node_key(start),
            end_id: node_key(end),
            properties: properties(&rel.properties),
        });
        previous = next;
    }

    PathValue {
        nodes: nodes.into_iter().map(convert_node).collect(),
        relationships,
    }
}

fn properties(map: &BoltMap) -> Properties {
    map.value
        .iter()
        .map(|(key, value)| (key.value.clone(), bolt_to_json(value)))
        .collect()
}

/// Plain JSON for scalar Bolt values; graph values become their property maps
fn bolt_to_json(value: &BoltType) -> Value {
    match value {
        BoltType::Null(_) => Value::Null,
        BoltType::Boolean(b) => Value::Bool(b.value),
        BoltType::Integer(i) => Value::from(i.value),
        BoltType::Float(f) => Number::from_f64(f.value).map_or(Value::Null, Value::Number),
        BoltType::String(s) => Value::String(s.value.clone()),
        BoltType::List(list) => Value::Array(list.value.iter().map(bolt_to_json).collect()),
        BoltType::Map(map) => Value::Object(properties(map)),
        BoltType::Node(node) => Value::Object(properties(&node.properties)),
        BoltType::Relation(rel) => Value::Object(properties(&rel.properties)),
        BoltType::UnboundedRelation(rel) => Value::Object(properties(&rel.properties)),
        other => Value::String(format!("{:?}", other)),
    }
}

/// Query parameter conversion
fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => BoltType::from(s.as_str()),
        Value::Array(items) => BoltType::List(BoltList {
            value: items.iter().map(json_to_bolt).collect(),
        }),
        Value::Object(map) => BoltType::Map(BoltMap {
            value: map
                .iter()
                .map(|(key, v)| (BoltString::from(key.as_str()), json_to_bolt(v)))
                .collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo4rs::BoltInteger;
    use serde_json::json;

    fn bolt_map(entries: &[(&str, BoltType)]) -> BoltMap {
        BoltMap {
            value: entries
                .iter()
                .map(|(k, v)| (BoltString::from(*k), v.clone()))
                .collect(),
        }
    }

    fn node(internal: i64, id: &str, label: &str) -> BoltNode {
        BoltNode {
            id: BoltInteger::new(internal),
            labels: BoltList {
                value: vec![BoltType::from(label)],
            },
            properties: bolt_map(&[("id", BoltType::from(id)), ("name", BoltType::from(id))]),
        }
    }

    fn unbounded(internal: i64, typ: &str) -> BoltUnboundedRelation {
        BoltUnboundedRelation {
            id: BoltInteger::new(internal),
            typ: BoltString::from(typ),
            properties: BoltMap { value: HashMap::new() },
        }
    }

    fn relation(internal: i64, start: i64, end: i64) -> BoltRelation {
        BoltRelation {
            id: BoltInteger::new(internal),
            start_node_id: BoltInteger::new(start),
            end_node_id: BoltInteger::new(end),
            typ: BoltString::from("biolink:subclass_of"),
            properties: BoltMap { value: HashMap::new() },
        }
    }

    #[test]
    fn test_json_to_bolt_roundtrip_scalars() {
        let value = json!({"id": "HGNC:1", "limit": 5, "score": 0.5, "flags": [true, null]});
        let bolt = json_to_bolt(&value);
        assert_eq!(bolt_to_json(&bolt), value);
    }

    #[test]
    fn test_node_identity_prefers_id_property() {
        let converted = convert_node(&node(7, "HGNC:1100", "biolink:Gene"));
        assert_eq!(converted.id, "HGNC:1100");
        assert_eq!(converted.labels, vec!["biolink:Gene".to_string()]);
        assert_eq!(converted.properties["name"], "HGNC:1100");

        let anonymous = BoltNode {
            id: BoltInteger::new(42),
            labels: BoltList { value: vec![] },
            properties: BoltMap { value: HashMap::new() },
        };
        assert_eq!(convert_node(&anonymous).id, "42");
    }

    #[test]
    fn test_relationship_endpoints_resolve_through_seen_nodes() {
        let mut columns = BTreeMap::new();
        columns.insert("g".to_string(), BoltType::Node(node(1, "HGNC:1100", "biolink:Gene")));
        columns.insert("r".to_string(), BoltType::Relation(relation(10, 1, 2)));

        let rows = vec![columns];
        let converter = RowConverter::from_rows(&rows);
        let record = converter.convert_row(rows.into_iter().next().unwrap());
        match record.get("r") {
            Some(RecordValue::Relationship(rel)) => {
                assert_eq!(rel.start_id, "HGNC:1100");
                assert_eq!(rel.end_id, "2");
                assert_eq!(rel.id, "10");
            }
            other => panic!("expected relationship, got {:?}", other),
        }
    }

    #[test]
    fn test_endpoint_in_later_row_keeps_one_identity() {
        let mut first = BTreeMap::new();
        first.insert(
            "subD".to_string(),
            BoltType::Node(node(1, "MONDO:0000001", "biolink:Disease")),
        );
        first.insert("r".to_string(), BoltType::Relation(relation(10, 1, 2)));
        let mut second = BTreeMap::new();
        second.insert("subD".to_string(), BoltType::Node(node(2, "D1", "biolink:Disease")));

        let rows = vec![first, second];
        let converter = RowConverter::from_rows(&rows);
        let records: Vec<RawRecord> = rows
            .into_iter()
            .map(|columns| converter.convert_row(columns))
            .collect();

        match records[0].get("r") {
            Some(RecordValue::Relationship(rel)) => {
                assert_eq!(rel.start_id, "MONDO:0000001");
                assert_eq!(rel.end_id, "D1");
            }
            other => panic!("expected relationship, got {:?}", other),
        }

        let classified = crate::graph::ResultClassifier::default().classify(&records);
        let graph = classified.as_graph().unwrap();
        let mut ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["D1", "MONDO:0000001"]);
    }

    #[test]
    fn test_path_direction_from_indices() {
        // (a)-[r1]->(b)<-[r2]-(c)
        let path = BoltPath {
            nodes: BoltList {
                value: vec![
                    BoltType::Node(node(1, "A", "X")),
                    BoltType::Node(node(2, "B", "X")),
                    BoltType::Node(node(3, "C", "X")),
                ],
            },
            rels: BoltList {
                value: vec![
                    BoltType::UnboundedRelation(unbounded(11, "r1")),
                    BoltType::UnboundedRelation(unbounded(12, "r2")),
                ],
            },
            indices: BoltList {
                value: vec![
                    BoltType::from(1i64),
                    BoltType::from(1i64),
                    BoltType::from(-2i64),
                    BoltType::from(2i64),
                ],
            },
        };

        let converted = convert_path(&path);
        assert_eq!(converted.nodes.len(), 3);
        assert_eq!(converted.relationships.len(), 2);
        assert_eq!(converted.relationships[0].start_id, "A");
        assert_eq!(converted.relationships[0].end_id, "B");
        assert_eq!(converted.relationships[1].start_id, "C");
        assert_eq!(converted.relationships[1].end_id, "B");
    }

    #[test]
    fn test_scalar_lists_stay_scalar() {
        let converter = RowConverter::default();
        let list = BoltType::List(BoltList {
            value: vec![BoltType::from("a"), BoltType::from(2i64)],
        });
        assert_eq!(converter.convert(&list), RecordValue::Scalar(json!(["a", 2])));
    }
}
