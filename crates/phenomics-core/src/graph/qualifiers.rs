//! Human-readable labels for qualifier ontology terms
//!
//! Relationship qualifiers in the Monarch graph are stored as bare term
//! ids (`HP:0040281`). Any string value that exactly equals a known id is
//! rewritten to `"HP:0040281 (Very frequent)"`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::Properties;

const SEX: &[(&str, &str)] = &[("PATO:0000383", "Female"), ("PATO:0000384", "Male")];

const EVIDENCE: &[(&str, &str)] = &[
    ("ECO:0000304", "traceable author statement"),
    ("ECO:0006017", "published clinical study evidence"),
    ("ECO:0000501", "inferred from electronic annotation"),
];

const ONSET: &[(&str, &str)] = &[
    ("HP:0003577", "Congenital onset"),
    ("HP:0003581", "Adult onset"),
    ("HP:0003584", "Late onset"),
    ("HP:0003593", "Infantile onset"),
    ("HP:0003596", "Middle age onset"),
    ("HP:0003621", "Juvenile onset"),
    ("HP:0003623", "Neonatal onset"),
    ("HP:0011460", "Embryonal onset"),
    ("HP:0011461", "Fetal onset"),
    ("HP:0011462", "Young adult onset"),
    ("HP:0011463", "Childhood onset"),
    ("HP:0025708", "Early young adult onset"),
    ("HP:0025709", "Intermediate young adult onset"),
    ("HP:0025710", "Late young adult onset"),
    ("HP:0030674", "Antenatal onset"),
    ("HP:0034197", "Third trimester onset"),
    ("HP:0034198", "Second trimester onset"),
    ("HP:0034199", "Late first trimester onset"),
    ("HP:0410280", "Pediatric onset"),
    ("HP:4000040", "Puerpural onset"),
    ("HP:6000314", "Perimenopausal onset"),
    ("HP:6000315", "Postmenopausal onset"),
];

const FREQUENCY: &[(&str, &str)] = &[
    ("HP:0040280", "Obligate"),
    ("HP:0040281", "Very frequent"),
    ("HP:0040282", "Frequent"),
    ("HP:0040283", "Occasional"),
    ("HP:0040284", "Very rare"),
    ("HP:0040285", "Excluded"),
];

/// Onset terms: subclasses of HP:0003674 (Onset)
pub const ONSET_TERMS_QUERY: &str = "MATCH (n:`biolink:PhenotypicFeature` {id: 'HP:0003674'}) \
     <-[:`biolink:subclass_of`*]- (m:`biolink:PhenotypicFeature`) RETURN m.id AS id, m.name AS name";

/// Frequency terms: anything below HP:0040279 (Frequency)
pub const FREQUENCY_TERMS_QUERY: &str =
    "MATCH (n:`biolink:PhenotypicFeature` {id: 'HP:0040279'}) <-[*]- (m) RETURN m.id AS id, m.name AS name";

/// Term id to label lookup
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualifierLabels {
    entries: BTreeMap<String, String>,
}

impl QualifierLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sex, evidence, onset and frequency terms used by Monarch
    pub fn monarch() -> Self {
        let mut labels = Self::new();
        for table in [SEX, EVIDENCE, ONSET, FREQUENCY] {
            for (id, label) in table {
                labels.insert(*id, *label);
            }
        }
        labels
    }

    pub fn insert(&mut self, id: impl Into<String>, label: impl Into<String>) {
        self.entries.insert(id.into(), label.into());
    }

    /// Add `(id, name)` pairs, e.g. from [`ONSET_TERMS_QUERY`]; existing ids are kept
    pub fn extend_missing<I, K, V>(&mut self, terms: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut added = 0;
        for (id, label) in terms {
            let id = id.into();
            if !self.entries.contains_key(&id) {
                self.entries.insert(id, label.into());
                added += 1;
            }
        }
        added
    }

    pub fn label(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite matching strings anywhere inside `value`
    pub fn label_value(&self, value: &mut Value) {
        match value {
            Value::String(s) => {
                if let Some(label) = self.entries.get(s.as_str()) {
                    *s = format!("{} ({})", s, label);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.label_value(item);
                }
            }
            Value::Object(map) => self.label_properties(map),
            _ => {}
        }
    }

    pub fn label_properties(&self, properties: &mut Properties) {
        for value in properties.values_mut() {
            self.label_value(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_monarch_table() {
        let labels = QualifierLabels::monarch();
        assert_eq!(labels.label("PATO:0000383"), Some("Female"));
        assert_eq!(labels.label("HP:0040281"), Some("Very frequent"));
        assert_eq!(labels.label("ECO:0000501"), Some("inferred from electronic annotation"));
        assert_eq!(labels.label("HP:0003581"), Some("Adult onset"));
        assert_eq!(labels.len(), 2 + 3 + 22 + 6);
    }

    #[test]
    fn test_label_value_recurses() {
        let labels = QualifierLabels::monarch();
        let mut value = json!({
            "frequency_qualifier": "HP:0040281",
            "has_evidence": ["ECO:0000304", "ECO:9999999"],
            "nested": {"sex_qualifier": "PATO:0000384"},
            "count": 3
        });

        labels.label_value(&mut value);

        assert_eq!(value["frequency_qualifier"], "HP:0040281 (Very frequent)");
        assert_eq!(value["has_evidence"][0], "ECO:0000304 (traceable author statement)");
        assert_eq!(value["has_evidence"][1], "ECO:9999999");
        assert_eq!(value["nested"]["sex_qualifier"], "PATO:0000384 (Male)");
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn test_labelling_is_idempotent() {
        let labels = QualifierLabels::monarch();
        let mut value = json!("HP:0040280");
        labels.label_value(&mut value);
        labels.label_value(&mut value);
        assert_eq!(value, "HP:0040280 (Obligate)");
    }

    #[test]
    fn test_substrings_are_not_labelled() {
        let labels = QualifierLabels::monarch();
        let mut value = json!("see HP:0040280");
        labels.label_value(&mut value);
        assert_eq!(value, "see HP:0040280");
    }

    #[test]
    fn test_extend_missing_keeps_existing() {
        let mut labels = QualifierLabels::monarch();
        let added = labels.extend_missing([
            ("HP:0040280", "Always"),
            ("HP:0003623", "Neonatal onset"),
            ("HP:9999999", "Made up onset"),
        ]);

        assert_eq!(added, 1);
        assert_eq!(labels.label("HP:0040280"), Some("Obligate"));
        assert_eq!(labels.label("HP:9999999"), Some("Made up onset"));
    }
}
