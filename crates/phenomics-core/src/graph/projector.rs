//! Graph projection
//!
//! Trims node and edge attributes to an allow-list and collapses the
//! multi-valued category of each node to a single representative, chosen
//! as the first entry of a priority list the node belongs to. Projection
//! is idempotent.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::{ClassifiedResult, GraphData, GraphNode};
use super::qualifiers::QualifierLabels;
use super::record::Properties;

const CATEGORY: &str = "category";
const LABEL: &str = "label";

/// Allow-lists and category priority for [`GraphProjector`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    pub node_attributes: Vec<String>,
    pub edge_attributes: Vec<String>,
    /// Attribute names containing any of these fragments are always kept
    pub passthrough_fragments: Vec<String>,
    /// Most specific category first
    pub category_priority: Vec<String>,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self::monarch()
    }
}

impl ProjectionConfig {
    /// Biolink categories and attributes of the Monarch knowledge graph
    pub fn monarch() -> Self {
        Self {
            node_attributes: strings(&[
                "id",
                "name",
                "symbol",
                "description",
                "full_name",
                "in_taxon_label",
                "caption",
                "category",
            ]),
            edge_attributes: strings(&[
                "id",
                "subject",
                "predicate",
                "object",
                "primary_knowledge_source",
                "publications",
                "has_evidence",
                "caption",
                "source",
                "target",
                "label",
            ]),
            passthrough_fragments: strings(&["negated", "qualifier"]),
            category_priority: strings(&[
                "biolink:LifeStage",
                "biolink:MolecularEntity",
                "biolink:OrganismTaxon",
                "biolink:Cell",
                "biolink:CellularComponent",
                "biolink:MolecularActivity",
                "biolink:SequenceVariant",
                "biolink:ChemicalEntity",
                "biolink:ChemicalOrDrugOrTreatment",
                "biolink:GeneProductMixin",
                "biolink:Protein",
                "biolink:Polypeptide",
                "biolink:Pathway",
                "biolink:Disease",
                "biolink:ChemicalEntityOrProteinOrPolypeptide",
                "biolink:BiologicalProcess",
                "biolink:Occurrent",
                "biolink:BiologicalProcessOrActivity",
                "biolink:AnatomicalEntity",
                "biolink:OrganismalEntity",
                "biolink:SubjectOfInvestigation",
                "biolink:Genotype",
                "biolink:PhenotypicFeature",
                "biolink:DiseaseOrPhenotypicFeature",
                "biolink:Gene",
                "biolink:MacromolecularMachineMixin",
                "biolink:GeneOrGeneProduct",
                "biolink:ChemicalEntityOrGeneOrGeneProduct",
                "biolink:GenomicEntity",
                "biolink:OntologyClass",
                "biolink:PhysicalEssence",
                "biolink:PhysicalEssenceOrOccurrent",
                "biolink:BiologicalEntity",
                "biolink:ThingWithTaxon",
                "biolink:NamedThing",
                "biolink:Entity",
            ]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Applies a [`ProjectionConfig`] and optional qualifier labels to results
#[derive(Debug, Clone)]
pub struct GraphProjector {
    node_attributes: HashSet<String>,
    edge_attributes: HashSet<String>,
    passthrough_fragments: Vec<String>,
    category_priority: Vec<String>,
    qualifiers: Option<QualifierLabels>,
}

impl Default for GraphProjector {
    fn default() -> Self {
        Self::new(ProjectionConfig::default())
    }
}

impl GraphProjector {
    pub fn new(config: ProjectionConfig) -> Self {
        Self {
            node_attributes: config.node_attributes.into_iter().collect(),
            edge_attributes: config.edge_attributes.into_iter().collect(),
            passthrough_fragments: config.passthrough_fragments,
            category_priority: config.category_priority,
            qualifiers: None,
        }
    }

    /// Also rewrite known qualifier ids to "id (label)"
    pub fn with_qualifiers(mut self, qualifiers: QualifierLabels) -> Self {
        self.qualifiers = Some(qualifiers);
        self
    }

    /// Project a graph
    pub fn project(&self, mut graph: GraphData) -> GraphData {
        for node in &mut graph.nodes {
            self.project_node(node);
        }
        for edge in &mut graph.edges {
            self.retain_allowed(&mut edge.attributes, &self.edge_attributes);
        }

        if let Some(qualifiers) = &self.qualifiers {
            for node in &mut graph.nodes {
                qualifiers.label_properties(&mut node.attributes);
            }
            for edge in &mut graph.edges {
                qualifiers.label_properties(&mut edge.attributes);
            }
        }

        graph
    }

    /// Project the graph of a classified result and label qualifiers in rows
    pub fn project_result(&self, result: ClassifiedResult) -> ClassifiedResult {
        match result {
            ClassifiedResult::Graph { graph, mut rows } => {
                self.label_rows(&mut rows);
                ClassifiedResult::Graph {
                    graph: self.project(graph),
                    rows,
                }
            }
            ClassifiedResult::Table { mut rows } => {
                self.label_rows(&mut rows);
                ClassifiedResult::Table { rows }
            }
            error @ ClassifiedResult::Error { .. } => error,
        }
    }

    fn label_rows(&self, rows: &mut [super::model::Row]) {
        if let Some(qualifiers) = &self.qualifiers {
            for row in rows {
                qualifiers.label_properties(row);
            }
        }
    }

    fn project_node(&self, node: &mut GraphNode) {
        let category = self.choose_category(node);

        self.retain_allowed(&mut node.attributes, &self.node_attributes);
        node.labels.clear();

        match category {
            Some(category) => {
                node.attributes
                    .insert(CATEGORY.to_string(), Value::String(category.clone()));
                node.attributes
                    .insert(LABEL.to_string(), Value::String(category));
            }
            None => {
                node.attributes.remove(CATEGORY);
                node.attributes.remove(LABEL);
            }
        }
    }

    /// First priority entry found in the node's category attribute, or in
    /// its database labels when it has no category attribute
    fn choose_category(&self, node: &GraphNode) -> Option<String> {
        let candidates: Vec<&str> = match node.attributes.get(CATEGORY) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(single)) => vec![single.as_str()],
            _ => node.labels.iter().map(String::as_str).collect(),
        };

        self.category_priority
            .iter()
            .find(|category| candidates.contains(&category.as_str()))
            .cloned()
    }

    fn retain_allowed(&self, attributes: &mut Properties, allowed: &HashSet<String>) {
        attributes.retain(|key, _| {
            allowed.contains(key)
                || self
                    .passthrough_fragments
                    .iter()
                    .any(|fragment| key.contains(fragment.as_str()))
        });
    }
}
