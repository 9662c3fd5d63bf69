//! Phenomics Core Integration Tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use phenomics_core::{
    Error, Result,
    database::{GraphBackend, Params, ReplayBackend},
    evaluation::{
        EvaluationLog, EvaluationOrchestrator, EvaluationOutcome, FailureReason,
        OrchestratorConfig, ReviewRequest, Reviewer,
    },
    graph::{ClassifiedResult, NodeValue, RawRecord, RelationshipValue},
    llm::Message,
    query::QueryExecutor,
};
use serde_json::json;

const GENE_QUERY: &str = "MATCH (g:biolink_Gene {symbol: 'CFTR'})-[r]->(d) RETURN g, r, d LIMIT 5";
const FIXED_QUERY: &str =
    "MATCH (g:`biolink:Gene` {symbol: 'CFTR'})-[r]->(d) RETURN g, r, d LIMIT 5";

fn cftr_records() -> Vec<RawRecord> {
    let gene = NodeValue::new("HGNC:1884")
        .with_label("biolink:Gene")
        .with_property("name", "CFTR")
        .with_property("category", json!(["biolink:Gene", "biolink:NamedThing"]));
    let disease = NodeValue::new("MONDO:0009061")
        .with_label("biolink:Disease")
        .with_property("name", "cystic fibrosis")
        .with_property("category", "biolink:Disease");
    let rel = RelationshipValue::new(
        "HGNC:1884-causes-MONDO:0009061",
        "biolink:causes",
        "HGNC:1884",
        "MONDO:0009061",
    )
    .with_property("has_evidence", json!(["ECO:0000304"]));

    vec![
        RawRecord::new()
            .with("g", gene)
            .with("r", rel)
            .with("d", disease),
    ]
}

fn replay() -> Arc<dyn GraphBackend> {
    Arc::new(ReplayBackend::new().with_response(FIXED_QUERY, cftr_records()))
}

/// Reviewer that always answers with the same text
struct CannedReviewer(String);

#[async_trait]
impl Reviewer for CannedReviewer {
    async fn review(&self, _request: &ReviewRequest) -> Result<String> {
        Ok(self.0.clone())
    }
}

fn canned(text: &str) -> Arc<dyn Reviewer> {
    Arc::new(CannedReviewer(text.to_string()))
}

struct HangingBackend;

#[async_trait]
impl GraphBackend for HangingBackend {
    async fn execute(&self, _query: &str, _params: Option<&Params>) -> Result<Vec<RawRecord>> {
        std::future::pending().await
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

#[tokio::test]
async fn test_accepted_query_end_to_end() {
    let orchestrator = EvaluationOrchestrator::new(QueryExecutor::new(replay())).with_reviewer(
        canned(r#"{"query_summary": "Diseases caused by CFTR", "accept_query": true, "suggestion": ""}"#),
    );
    let mut log = EvaluationLog::new();
    let history = vec![Message::user("What does CFTR cause?")];

    let outcome = orchestrator
        .evaluate(GENE_QUERY, None, &history, &mut log)
        .await
        .unwrap();

    let result = outcome.result().unwrap();
    let graph = result.as_graph().unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(
        graph.node("HGNC:1884").unwrap().category(),
        Some("biolink:Gene")
    );
    assert_eq!(
        graph.edges[0].attribute("has_evidence"),
        Some(&json!(["ECO:0000304 (traceable author statement)"]))
    );

    assert_eq!(log.len(), 1);
    let entry = log.last().unwrap();
    assert!(entry.is_accepted());
    assert_eq!(entry.query, FIXED_QUERY);
    assert_eq!(entry.verdict.query_summary, "Diseases caused by CFTR");
}

#[tokio::test]
async fn test_rejected_query_carries_suggestion() {
    let orchestrator = EvaluationOrchestrator::new(QueryExecutor::new(replay())).with_reviewer(
        canned(r#"Verdict: {"query_summary": "", "accept_query": false, "suggestion": "Follow biolink:causes from the gene."}"#),
    );
    let mut log = EvaluationLog::new();

    let outcome = orchestrator
        .evaluate(GENE_QUERY, None, &[], &mut log)
        .await
        .unwrap();

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.reason, FailureReason::EvaluationRejected);
    assert!(failure.to_string().contains("Follow biolink:causes from the gene."));

    assert_eq!(log.len(), 1);
    assert!(!log.entries()[0].is_accepted());
    assert_eq!(log.entries()[0].reason, Some(FailureReason::EvaluationRejected));
}

#[tokio::test]
async fn test_unparseable_review_is_a_rejection() {
    let orchestrator = EvaluationOrchestrator::new(QueryExecutor::new(replay()))
        .with_reviewer(canned("  I cannot judge this query.  "));
    let mut log = EvaluationLog::new();

    let outcome = orchestrator
        .evaluate(GENE_QUERY, None, &[], &mut log)
        .await
        .unwrap();

    assert!(!outcome.is_accepted());
    assert_eq!(log.len(), 1);
    assert_eq!(log.entries()[0].verdict.suggestion, "I cannot judge this query.");
}

#[tokio::test]
async fn test_oversized_result_is_retryable() {
    let records: Vec<RawRecord> = (0..200)
        .map(|i| {
            RawRecord::new()
                .with("id", json!(format!("HP:{i:07}")))
                .with("name", json!("a phenotype with a fairly long descriptive name"))
        })
        .collect();
    let backend = Arc::new(ReplayBackend::new().with_default(records));
    let orchestrator = EvaluationOrchestrator::new(QueryExecutor::new(backend)).with_config(
        OrchestratorConfig {
            max_response_tokens: 100,
            ..Default::default()
        },
    );
    let mut log = EvaluationLog::new();

    let outcome = orchestrator
        .evaluate("MATCH (p) RETURN p.id AS id, p.name AS name", None, &[], &mut log)
        .await
        .unwrap();

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.reason, FailureReason::ResponseTooLarge);
    assert!(failure.to_string().contains("Please try a smaller search."));
    assert_eq!(log.len(), 1);
    assert_eq!(log.entries()[0].reason, Some(FailureReason::ResponseTooLarge));
}

#[tokio::test(start_paused = true)]
async fn test_query_timeout_is_retryable() {
    let executor =
        QueryExecutor::new(Arc::new(HangingBackend)).with_timeout(Duration::from_secs(6));
    let orchestrator = EvaluationOrchestrator::new(executor).with_reviewer(canned("unused"));
    let mut log = EvaluationLog::new();

    let outcome = orchestrator
        .evaluate("MATCH (n) RETURN n", None, &[], &mut log)
        .await
        .unwrap();

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.reason, FailureReason::Timeout);
    assert!(failure.detail.contains("6 seconds"));
    assert_eq!(log.len(), 1);
    assert_eq!(log.entries()[0].reason, Some(FailureReason::Timeout));
}

#[tokio::test]
async fn test_execution_error_reaches_caller_verbatim() {
    let backend = Arc::new(
        ReplayBackend::new().with_failure("MATCH (n RETURN n", "Invalid input 'R': expected ')'"),
    );
    let orchestrator = EvaluationOrchestrator::new(QueryExecutor::new(backend))
        .with_reviewer(canned("unused"));
    let mut log = EvaluationLog::new();

    let outcome = orchestrator
        .evaluate("MATCH (n RETURN n", None, &[], &mut log)
        .await
        .unwrap();

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.reason, FailureReason::ExecutionError);
    assert_eq!(failure.detail, "Invalid input 'R': expected ')'");

    let as_result = ClassifiedResult::from(failure);
    assert_eq!(as_result.shape(), "error");
}

#[tokio::test]
async fn test_replayed_query_is_stable() {
    let executor = QueryExecutor::new(replay());

    let first = executor.run(GENE_QUERY, None).await.unwrap();
    let second = executor.run(GENE_QUERY, None).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_log_grows_one_entry_per_reviewed_attempt() {
    let orchestrator = EvaluationOrchestrator::new(QueryExecutor::new(replay())).with_reviewer(
        canned(r#"{"query_summary": "ok", "accept_query": true, "suggestion": ""}"#),
    );
    let mut log = EvaluationLog::new();

    for expected in 1..=3 {
        let outcome = orchestrator
            .evaluate(GENE_QUERY, None, &[], &mut log)
            .await
            .unwrap();
        assert!(matches!(outcome, EvaluationOutcome::Accepted { .. }));
        assert_eq!(log.len(), expected);
    }

    assert_eq!(log.drain().len(), 3);
    assert!(log.is_empty());
}

#[tokio::test]
async fn test_unknown_shape_is_an_error() {
    let executor = QueryExecutor::new(replay());
    let err = executor.run_named(GENE_QUERY, None, "chart").await.unwrap_err();
    assert!(matches!(err, Error::InvalidResultShape(_)));
}

/// Requires a reachable Neo4j (NEO4J_URI, NEO4J_USER, NEO4J_PASSWORD)
#[cfg(feature = "integration-tests")]
mod live {
    use phenomics_core::config::DatabaseConfig;
    use phenomics_core::database::{GraphBackend, Neo4jBackend};
    use phenomics_core::query::QueryExecutor;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_neo4j_round_trip() {
        let config = DatabaseConfig::default().with_env_overrides();
        let backend = Neo4jBackend::connect(&config).await.unwrap();
        backend.ping().await.unwrap();

        let records = backend
            .execute("MATCH (n) RETURN n LIMIT 1", None)
            .await
            .unwrap();
        assert!(records.len() <= 1);

        let executor = QueryExecutor::from_config(Arc::new(backend), &config);
        let labels = executor.list_labels().await.unwrap();
        assert!(labels.iter().all(|label| !label.is_empty()));
    }
}
