//! The evaluate-or-retry loop for a single query attempt

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::failure::{FailureReason, RetryableFailure};
use super::history::HistoryWindow;
use super::log::{EvaluationLog, EvaluationRecord};
use super::reviewer::{ReviewRequest, Reviewer};
use super::state::AttemptState;
use super::verdict::EvaluationVerdict;
use crate::config::EvaluationConfig;
use crate::database::Params;
use crate::error::{Error, Result};
use crate::graph::{ClassifiedResult, DEFAULT_MAX_LIST_ITEMS, ResultShape, StructureSummarizer};
use crate::llm::{Message, estimate_tokens};
use crate::query::{QueryExecutor, fix_biolink_labels};

/// Limits applied to each attempt
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Largest accepted result, in estimated tokens of its JSON form
    pub max_response_tokens: usize,
    pub summary_max_list_items: usize,
    pub history: HistoryWindow,
    pub reviewer_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_response_tokens: 30_000,
            summary_max_list_items: DEFAULT_MAX_LIST_ITEMS,
            history: HistoryWindow::default(),
            reviewer_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&EvaluationConfig> for OrchestratorConfig {
    fn from(config: &EvaluationConfig) -> Self {
        Self {
            max_response_tokens: config.max_response_tokens,
            summary_max_list_items: config.summary_max_list_items,
            history: HistoryWindow {
                turns: config.history_window,
                long_turn_chars: config.long_turn_chars,
                excerpt_chars: config.excerpt_chars,
            },
            reviewer_timeout: config.reviewer_timeout(),
        }
    }
}

/// How an attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    /// The full result, with the reviewer's verdict when one was consulted
    Accepted {
        result: ClassifiedResult,
        verdict: Option<EvaluationVerdict>,
    },
    /// The caller should try a different query
    Retry(RetryableFailure),
}

impl EvaluationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn result(&self) -> Option<&ClassifiedResult> {
        match self {
            Self::Accepted { result, .. } => Some(result),
            Self::Retry(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&RetryableFailure> {
        match self {
            Self::Accepted { .. } => None,
            Self::Retry(failure) => Some(failure),
        }
    }

    /// Terminal state the attempt reached
    pub fn state(&self) -> AttemptState {
        match self {
            Self::Accepted { .. } => AttemptState::Accepted,
            Self::Retry(failure) => match failure.reason {
                FailureReason::EvaluationRejected => AttemptState::Rejected,
                FailureReason::ResponseTooLarge => AttemptState::TooLarge,
                FailureReason::Timeout | FailureReason::ExecutionError => AttemptState::Failed,
            },
        }
    }
}

/// Runs a query, has it reviewed and decides whether it can be shown
///
/// Execution failures skip the reviewer. Accepted results are still held
/// to a size budget measured on the full, unsummarized result. Every
/// decision is appended to the caller's [`EvaluationLog`]; the orchestrator
/// itself keeps no per-attempt state, so the same query, result and
/// verdict always produce the same outcome.
pub struct EvaluationOrchestrator {
    executor: QueryExecutor,
    reviewer: Option<Arc<dyn Reviewer>>,
    summarizer: StructureSummarizer,
    config: OrchestratorConfig,
}

impl EvaluationOrchestrator {
    pub fn new(executor: QueryExecutor) -> Self {
        let config = OrchestratorConfig::default();
        Self {
            executor,
            reviewer: None,
            summarizer: StructureSummarizer::new(config.summary_max_list_items),
            config,
        }
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.summarizer = StructureSummarizer::new(config.summary_max_list_items);
        self.config = config;
        self
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn has_reviewer(&self) -> bool {
        self.reviewer.is_some()
    }

    /// Evaluate one query attempt
    ///
    /// Retryable outcomes come back as [`EvaluationOutcome::Retry`]. `Err` is
    /// reserved for reviewer transport failures.
    pub async fn evaluate(
        &self,
        query: &str,
        params: Option<&Params>,
        history: &[Message],
        log: &mut EvaluationLog,
    ) -> Result<EvaluationOutcome> {
        self.evaluate_as(query, params, ResultShape::Auto, history, log)
            .await
    }

    /// Evaluate with an explicit result shape
    pub async fn evaluate_as(
        &self,
        query: &str,
        params: Option<&Params>,
        shape: ResultShape,
        history: &[Message],
        log: &mut EvaluationLog,
    ) -> Result<EvaluationOutcome> {
        let mut attempt = Attempt::start();
        let display_query = fix_biolink_labels(query);

        let result = match self.executor.run_as(query, params, shape).await {
            Ok(result) => result,
            Err(failure) => {
                attempt.advance(AttemptState::Failed);
                log.push(EvaluationRecord::failure(&display_query, &failure));
                return Ok(EvaluationOutcome::Retry(failure));
            }
        };
        attempt.advance(AttemptState::Classified);

        let full = result.to_json()?;
        let summary = self.summarizer.summarize(&full);
        attempt.advance(AttemptState::Summarized);

        let verdict = match &self.reviewer {
            Some(reviewer) => {
                attempt.advance(AttemptState::Reviewing);
                let request = ReviewRequest {
                    query: display_query.clone(),
                    summarized_result: summary,
                    recent_turns: self.config.history.recent(history),
                };

                let verdict = match tokio::time::timeout(
                    self.config.reviewer_timeout,
                    reviewer.review(&request),
                )
                .await
                {
                    Ok(Ok(raw)) => EvaluationVerdict::parse(&raw),
                    Ok(Err(e)) => {
                        attempt.advance(AttemptState::Failed);
                        warn!(attempt = %attempt.id, error = %e, "Reviewer failed");
                        log.push(EvaluationRecord::new(
                            &display_query,
                            EvaluationVerdict::rejection(format!(
                                "The query could not be evaluated: {}",
                                e
                            )),
                        ));
                        return Err(Error::ReviewerFailed(e.to_string()));
                    }
                    Err(_) => {
                        attempt.advance(AttemptState::Failed);
                        let failure =
                            RetryableFailure::reviewer_timeout(self.config.reviewer_timeout);
                        log.push(EvaluationRecord::failure(&display_query, &failure));
                        return Ok(EvaluationOutcome::Retry(failure));
                    }
                };

                if !verdict.is_accepted() {
                    attempt.advance(AttemptState::Rejected);
                    let failure = RetryableFailure::rejected(&verdict);
                    log.push(
                        EvaluationRecord::new(&display_query, verdict)
                            .with_reason(FailureReason::EvaluationRejected),
                    );
                    return Ok(EvaluationOutcome::Retry(failure));
                }

                Some(verdict)
            }
            None => None,
        };

        let tokens = estimate_tokens(&full.to_string());
        if tokens > self.config.max_response_tokens {
            attempt.advance(AttemptState::TooLarge);
            let failure = RetryableFailure::too_large(tokens, self.config.max_response_tokens);
            if let Some(verdict) = &verdict {
                log.push(EvaluationRecord::new(&display_query, verdict.clone()));
            }
            log.push(EvaluationRecord::failure(&display_query, &failure));
            return Ok(EvaluationOutcome::Retry(failure));
        }

        attempt.advance(AttemptState::Accepted);
        if let Some(verdict) = &verdict {
            log.push(EvaluationRecord::new(&display_query, verdict.clone()));
        }
        info!(
            attempt = %attempt.id,
            shape = result.shape(),
            tokens,
            "Query accepted"
        );

        Ok(EvaluationOutcome::Accepted { result, verdict })
    }
}

/// Tracing context for one attempt
struct Attempt {
    id: Uuid,
    state: AttemptState,
}

impl Attempt {
    fn start() -> Self {
        let attempt = Self {
            id: Uuid::new_v4(),
            state: AttemptState::Executing,
        };
        debug!(attempt = %attempt.id, state = %attempt.state, "Attempt started");
        attempt
    }

    fn advance(&mut self, next: AttemptState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid attempt transition {} -> {}",
            self.state,
            next
        );
        debug!(attempt = %self.id, from = %self.state, to = %next, "Attempt state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ReplayBackend;
    use crate::graph::{NodeValue, RawRecord};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedReviewer {
        reply: String,
        requests: Mutex<Vec<ReviewRequest>>,
    }

    impl ScriptedReviewer {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Reviewer for ScriptedReviewer {
        async fn review(&self, request: &ReviewRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    const ACCEPT: &str = r#"{"query_summary": "Lists genes", "accept_query": true, "suggestion": ""}"#;
    const REJECT: &str = r#"{"query_summary": "Lists genes", "accept_query": false, "suggestion": "Add ORDER BY"}"#;

    fn genes(count: usize) -> Vec<RawRecord> {
        (0..count)
            .map(|i| {
                RawRecord::new().with(
                    "g",
                    NodeValue::new(format!("HGNC:{}", i))
                        .with_label("biolink:Gene")
                        .with_property("name", format!("GENE{}", i)),
                )
            })
            .collect()
    }

    fn orchestrator(records: Vec<RawRecord>) -> EvaluationOrchestrator {
        let backend = ReplayBackend::new().with_default(records);
        EvaluationOrchestrator::new(QueryExecutor::new(Arc::new(backend)))
    }

    #[tokio::test]
    async fn test_accept_logs_one_entry() {
        let reviewer = ScriptedReviewer::new(ACCEPT);
        let orchestrator = orchestrator(genes(5)).with_reviewer(reviewer.clone());
        let mut log = EvaluationLog::new();

        let outcome = orchestrator
            .evaluate("MATCH (g:biolink_Gene) RETURN g", None, &[], &mut log)
            .await
            .unwrap();

        assert_eq!(outcome.state(), AttemptState::Accepted);
        assert_eq!(outcome.result().unwrap().node_count(), 5);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].query, "MATCH (g:`biolink:Gene`) RETURN g");

        let requests = reviewer.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let nodes = requests[0].summarized_result["data"]["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[3], json!("..."));
    }

    #[tokio::test]
    async fn test_reject_returns_suggestion() {
        let orchestrator = orchestrator(genes(2)).with_reviewer(ScriptedReviewer::new(REJECT));
        let mut log = EvaluationLog::new();

        let outcome = orchestrator
            .evaluate("MATCH (g) RETURN g", None, &[], &mut log)
            .await
            .unwrap();

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.reason, FailureReason::EvaluationRejected);
        assert_eq!(failure.detail, "Add ORDER BY");
        assert_eq!(outcome.state(), AttemptState::Rejected);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].reason, Some(FailureReason::EvaluationRejected));
    }

    #[tokio::test]
    async fn test_oversized_accepted_result() {
        let config = OrchestratorConfig {
            max_response_tokens: 50,
            ..Default::default()
        };
        let orchestrator = orchestrator(genes(20))
            .with_reviewer(ScriptedReviewer::new(ACCEPT))
            .with_config(config);
        let mut log = EvaluationLog::new();

        let outcome = orchestrator
            .evaluate("MATCH (g) RETURN g", None, &[], &mut log)
            .await
            .unwrap();

        assert_eq!(outcome.failure().unwrap().reason, FailureReason::ResponseTooLarge);
        assert_eq!(outcome.state(), AttemptState::TooLarge);
        assert_eq!(log.len(), 2);
        assert!(log.entries()[0].verdict.accept_query);
        assert_eq!(log.entries()[1].reason, Some(FailureReason::ResponseTooLarge));
    }

    #[tokio::test]
    async fn test_execution_failure_skips_reviewer() {
        let backend = ReplayBackend::new().with_failure("RETURN x", "Variable `x` not defined");
        let reviewer = ScriptedReviewer::new(ACCEPT);
        let orchestrator = EvaluationOrchestrator::new(QueryExecutor::new(Arc::new(backend)))
            .with_reviewer(reviewer.clone());
        let mut log = EvaluationLog::new();

        let outcome = orchestrator.evaluate("RETURN x", None, &[], &mut log).await.unwrap();

        assert_eq!(outcome.state(), AttemptState::Failed);
        assert_eq!(outcome.failure().unwrap().reason, FailureReason::ExecutionError);
        assert!(reviewer.requests.lock().unwrap().is_empty());
        assert_eq!(log.len(), 1);
        assert!(log.entries()[0].verdict.suggestion.starts_with("The query generated an error:"));
    }

    #[tokio::test]
    async fn test_without_reviewer_still_enforces_size() {
        let mut log = EvaluationLog::new();

        let accepted = orchestrator(genes(1))
            .evaluate("MATCH (g) RETURN g", None, &[], &mut log)
            .await
            .unwrap();
        assert!(accepted.is_accepted());
        assert!(log.is_empty());

        let config = OrchestratorConfig {
            max_response_tokens: 10,
            ..Default::default()
        };
        let too_large = orchestrator(genes(10))
            .with_config(config)
            .evaluate("MATCH (g) RETURN g", None, &[], &mut log)
            .await
            .unwrap();
        assert_eq!(too_large.state(), AttemptState::TooLarge);
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_history_window_passed_to_reviewer() {
        let reviewer = ScriptedReviewer::new(ACCEPT);
        let orchestrator = orchestrator(genes(1)).with_reviewer(reviewer.clone());
        let history: Vec<Message> = (0..12).map(|i| Message::user(format!("turn {}", i))).collect();
        let mut log = EvaluationLog::new();

        orchestrator
            .evaluate("MATCH (g) RETURN g", None, &history, &mut log)
            .await
            .unwrap();

        let requests = reviewer.requests.lock().unwrap();
        assert_eq!(requests[0].recent_turns.len(), 10);
        assert_eq!(requests[0].recent_turns[0].content, "turn 2");
    }
}
