//! Deadline-bounded query execution

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::vocabulary::fix_biolink_labels;
use crate::config::DatabaseConfig;
use crate::database::{GraphBackend, Params};
use crate::error::{Error, Result};
use crate::evaluation::RetryableFailure;
use crate::graph::{
    ClassifiedResult, FREQUENCY_TERMS_QUERY, GraphProjector, ONSET_TERMS_QUERY, QualifierLabels,
    RawRecord, RecordValue, ResultClassifier, ResultShape,
};

/// Default database deadline
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(6);

const LABELS_QUERY: &str = "CALL db.labels() YIELD label RETURN label";
const RELATIONSHIP_TYPES_QUERY: &str =
    "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType";

/// A classified result, or the reason the attempt should be retried
pub type ExecutionOutcome = std::result::Result<ClassifiedResult, RetryableFailure>;

/// Runs queries against a [`GraphBackend`] and shapes the rows
///
/// Every run is bounded by a deadline. When it expires the execution future
/// is dropped in place, which closes the backend's stream and releases its
/// session. Database errors come back as [`RetryableFailure`] values with
/// the driver's message intact.
pub struct QueryExecutor {
    backend: Arc<dyn GraphBackend>,
    classifier: ResultClassifier,
    projector: Option<GraphProjector>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(backend: Arc<dyn GraphBackend>) -> Self {
        Self {
            backend,
            classifier: ResultClassifier::default(),
            projector: Some(GraphProjector::default()),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn from_config(backend: Arc<dyn GraphBackend>, config: &DatabaseConfig) -> Self {
        Self::new(backend).with_timeout(config.query_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_classifier(mut self, classifier: ResultClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_projector(mut self, projector: GraphProjector) -> Self {
        self.projector = Some(projector);
        self
    }

    /// Return graphs with every attribute and label as captured
    pub fn without_projection(mut self) -> Self {
        self.projector = None;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run with automatic shape detection and the configured deadline
    pub async fn run(&self, query: &str, params: Option<&Params>) -> ExecutionOutcome {
        self.run_as(query, params, ResultShape::Auto).await
    }

    pub async fn run_as(
        &self,
        query: &str,
        params: Option<&Params>,
        shape: ResultShape,
    ) -> ExecutionOutcome {
        self.run_with_timeout(query, params, shape, self.timeout)
            .await
    }

    /// Run with a shape given by name; unknown names are rejected before
    /// anything is executed
    pub async fn run_named(
        &self,
        query: &str,
        params: Option<&Params>,
        shape: &str,
    ) -> Result<ExecutionOutcome> {
        let shape: ResultShape = shape.parse()?;
        Ok(self.run_as(query, params, shape).await)
    }

    /// Run unless `cancel` fires first
    pub async fn run_cancellable(
        &self,
        query: &str,
        params: Option<&Params>,
        shape: ResultShape,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Query cancelled");
                Err(Error::UserCancelled)
            }
            outcome = self.run_as(query, params, shape) => Ok(outcome),
        }
    }

    pub async fn run_with_timeout(
        &self,
        query: &str,
        params: Option<&Params>,
        shape: ResultShape,
        timeout: Duration,
    ) -> ExecutionOutcome {
        let query = fix_biolink_labels(query);
        let started = Instant::now();

        debug!(backend = self.backend.name(), %shape, "Executing query");

        match tokio::time::timeout(timeout, self.execute_shaped(&query, params, shape)).await {
            Ok(Ok(result)) => {
                info!(
                    shape = result.shape(),
                    nodes = result.node_count(),
                    rows = result.rows().len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Query complete"
                );
                Ok(self.project(result))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Query failed");
                Err(RetryableFailure::execution_error(driver_message(e)))
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Query timed out");
                Err(RetryableFailure::timeout(timeout))
            }
        }
    }

    /// A graph pass that yields no nodes is followed by a second,
    /// unparameterized pass read as a table
    async fn execute_shaped(
        &self,
        query: &str,
        params: Option<&Params>,
        shape: ResultShape,
    ) -> Result<ClassifiedResult> {
        let records = self.backend.execute(query, params).await?;

        match shape {
            ResultShape::Graph | ResultShape::Table => {
                Ok(self.classifier.classify_as(&records, shape))
            }
            ResultShape::Auto => {
                let graph = self.classifier.classify_as(&records, ResultShape::Graph);
                if graph.node_count() > 0 {
                    return Ok(graph);
                }

                debug!("Graph pass found no nodes, re-running as table");
                let records = self.backend.execute(query, None).await?;
                Ok(self.classifier.classify_as(&records, ResultShape::Table))
            }
        }
    }

    fn project(&self, result: ClassifiedResult) -> ClassifiedResult {
        match &self.projector {
            Some(projector) => projector.project_result(result),
            None => result,
        }
    }

    /// Node labels known to the database
    pub async fn list_labels(&self) -> Result<Vec<String>> {
        self.list_column(LABELS_QUERY, "label").await
    }

    /// Relationship types known to the database
    pub async fn list_relationship_types(&self) -> Result<Vec<String>> {
        self.list_column(RELATIONSHIP_TYPES_QUERY, "relationshipType")
            .await
    }

    /// Add onset and frequency terms from the database to `labels`
    ///
    /// Returns how many new terms were added.
    pub async fn fetch_qualifier_terms(&self, labels: &mut QualifierLabels) -> Result<usize> {
        let mut added = 0;
        for query in [ONSET_TERMS_QUERY, FREQUENCY_TERMS_QUERY] {
            let records = self.execute_bounded(query).await?;
            added += labels.extend_missing(records.iter().filter_map(|record| {
                Some((string_column(record, "id")?, string_column(record, "name")?))
            }));
        }
        debug!(added, total = labels.len(), "Loaded qualifier terms");
        Ok(added)
    }

    async fn list_column(&self, query: &str, column: &str) -> Result<Vec<String>> {
        let records = self.execute_bounded(query).await?;
        Ok(records
            .iter()
            .filter_map(|record| string_column(record, column))
            .collect())
    }

    async fn execute_bounded(&self, query: &str) -> Result<Vec<RawRecord>> {
        tokio::time::timeout(self.timeout, self.backend.execute(query, None))
            .await
            .map_err(|_| {
                Error::QueryExecution(format!("timed out after {:?}", self.timeout))
            })?
    }
}

fn string_column(record: &RawRecord, column: &str) -> Option<String> {
    match record.get(column) {
        Some(RecordValue::Scalar(Value::String(s))) => Some(s.clone()),
        _ => None,
    }
}

/// The database's own wording, without our prefix
fn driver_message(error: Error) -> String {
    match error {
        Error::QueryExecution(message) => message,
        other => other.to_string(),
    }
}
