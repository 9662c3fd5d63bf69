//! Result normalization
//!
//! Pure transforms from raw query rows to display-ready shapes:
//! - [`ResultClassifier`]: raw records to a graph or a table
//! - [`GraphProjector`]: attribute allow-lists and single-category nodes
//! - [`StructureSummarizer`]: bounded previews for the reviewer
//! - [`QualifierLabels`]: readable qualifier term ids

mod classifier;
mod model;
mod projector;
mod qualifiers;
mod record;
mod summarize;

pub use classifier::{ClassifierConfig, ResultClassifier};
pub use model::{ClassifiedResult, GraphData, GraphEdge, GraphNode, ResultShape, Row};
pub use projector::{GraphProjector, ProjectionConfig};
pub use qualifiers::{FREQUENCY_TERMS_QUERY, ONSET_TERMS_QUERY, QualifierLabels};
pub use record::{NodeValue, PathValue, Properties, RawRecord, RecordField, RecordValue, RelationshipValue};
pub use summarize::{DEFAULT_MAX_LIST_ITEMS, StructureSummarizer, TRUNCATION_MARKER, summarize};
