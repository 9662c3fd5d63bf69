//! One conversation with the query agent

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prompts::{evaluator_system_prompt, load_graph_summary, system_prompt};
use super::search::{TermSearch, extract_search_terms};
use crate::config::Config;
use crate::database::GraphBackend;
use crate::error::{Error, Result};
use crate::evaluation::{
    EvaluationLog, EvaluationOrchestrator, EvaluationOutcome, EvaluationRecord, LlmReviewer,
    OrchestratorConfig,
};
use crate::graph::{ClassifiedResult, GraphProjector, QualifierLabels};
use crate::llm::{ChatModel, ChatOptions, Message, estimate_tokens};
use crate::query::{QueryExecutor, extract_cypher};

/// Sent when the tool budget for a question is spent
const BUDGET_EXHAUSTED: &str = "No more queries can be run for this question. Answer with the information you already have, without a fenced block, and tell the user what could not be determined.";

const SEARCH_UNAVAILABLE: &str = "Term search is not available. Match nodes by name instead, e.g. `WHERE toLower(n.name) CONTAINS 'fibrosis'`.";

/// The outcome of one user question
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTurn {
    pub answer: String,
    /// Evaluation log entries for this turn, oldest first
    pub evaluations: Vec<EvaluationRecord>,
    /// Last accepted query result, if any
    pub result: Option<ClassifiedResult>,
    /// Queries and searches run
    pub tool_calls: usize,
}

/// Turns questions into reviewed graph queries and answers
///
/// The model asks for graph access through fenced blocks in its replies
/// (`cypher` to run a query, `search` to resolve names). Failed attempts
/// are fed back so the model can try again, up to `max_attempts` tool calls
/// per question. The evaluation log is drained once per question, after
/// the model's final answer. A question that fails or is cancelled leaves
/// neither history nor log entries behind.
pub struct QueryAgent {
    model: Arc<dyn ChatModel>,
    orchestrator: EvaluationOrchestrator,
    search: Option<Arc<dyn TermSearch>>,
    chat_options: ChatOptions,
    system_prompt: String,
    history: Vec<Message>,
    log: EvaluationLog,
    max_attempts: usize,
}

impl QueryAgent {
    pub fn new(model: Arc<dyn ChatModel>, orchestrator: EvaluationOrchestrator) -> Self {
        Self {
            model,
            orchestrator,
            search: None,
            chat_options: ChatOptions::default(),
            system_prompt: system_prompt(super::prompts::GRAPH_SUMMARY),
            history: Vec::new(),
            log: EvaluationLog::new(),
            max_attempts: 3,
        }
    }

    /// Wire up an agent from configuration
    ///
    /// Qualifier labels are extended from the database when possible; the
    /// built-in table is used if that lookup fails.
    pub async fn from_config(
        config: &Config,
        backend: Arc<dyn GraphBackend>,
        model: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let graph_summary = load_graph_summary(config.agent.graph_summary_path.as_deref())?;

        let executor = QueryExecutor::from_config(backend, &config.database);
        let mut qualifiers = QualifierLabels::monarch();
        if let Err(e) = executor.fetch_qualifier_terms(&mut qualifiers).await {
            warn!(error = %e, "Could not load qualifier terms; using built-in labels");
        }
        let executor =
            executor.with_projector(GraphProjector::default().with_qualifiers(qualifiers));

        let mut orchestrator = EvaluationOrchestrator::new(executor)
            .with_config(OrchestratorConfig::from(&config.evaluation));
        if config.evaluation.reviewer_enabled {
            let reviewer = LlmReviewer::new(model.clone())
                .with_model(config.evaluation.reviewer_model.clone())
                .with_system_prompt(evaluator_system_prompt(&graph_summary))
                .with_instructions(super::prompts::INSTRUCTIONS);
            orchestrator = orchestrator.with_reviewer(Arc::new(reviewer));
        }

        Ok(Self::new(model, orchestrator)
            .with_system_prompt(system_prompt(&graph_summary))
            .with_max_attempts(config.agent.max_attempts))
    }

    pub fn with_search(mut self, search: Arc<dyn TermSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_chat_options(mut self, options: ChatOptions) -> Self {
        self.chat_options = options;
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn orchestrator(&self) -> &EvaluationOrchestrator {
        &self.orchestrator
    }

    /// Forget the conversation so far
    pub fn reset(&mut self) {
        self.history.clear();
        self.log.drain();
    }

    /// Answer a question, abandoning it if `cancel` fires
    pub async fn ask_cancellable(
        &mut self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentTurn> {
        let mark = self.history.len();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::UserCancelled),
            turn = self.ask(question) => turn,
        };
        if outcome.is_err() {
            self.rollback(mark);
        }
        outcome
    }

    /// Answer a question
    pub async fn ask(&mut self, question: &str) -> Result<AgentTurn> {
        let mark = self.history.len();
        let outcome = self.answer(question).await;
        if let Err(e) = &outcome {
            warn!(error = %e, "Question failed");
            self.rollback(mark);
        }
        outcome
    }

    /// Drop everything recorded since `mark`
    fn rollback(&mut self, mark: usize) {
        self.history.truncate(mark);
        let discarded = self.log.drain();
        if !discarded.is_empty() {
            debug!(entries = discarded.len(), "Discarded evaluations of abandoned question");
        }
    }

    async fn answer(&mut self, question: &str) -> Result<AgentTurn> {
        self.history.push(Message::user(question));
        info!(question = %truncate(question, 80), "Question received");

        let mut tool_calls = 0;
        let mut accepted: Option<ClassifiedResult> = None;

        loop {
            let reply = self.chat().await?;

            if let Some(terms) = extract_search_terms(&reply) {
                if !self.take_tool_call(&mut tool_calls, reply) {
                    return self.conclude(accepted, tool_calls).await;
                }
                let feedback = match self.search.clone() {
                    Some(search) => match search.search(&terms).await {
                        Ok(matches) => self.bounded(format!(
                            "Search results:\n\n{}",
                            serde_json::to_string_pretty(&matches)?
                        )),
                        Err(e) => format!("The search failed: {}", e),
                    },
                    None => SEARCH_UNAVAILABLE.to_string(),
                };
                self.history.push(Message::user(feedback));
                continue;
            }

            let query = if reply.contains("```") {
                extract_cypher(&reply)
            } else {
                None
            };
            let Some(query) = query else {
                self.history.push(Message::assistant(reply.clone()));
                return Ok(self.finish(reply, accepted, tool_calls));
            };

            if !self.take_tool_call(&mut tool_calls, reply) {
                return self.conclude(accepted, tool_calls).await;
            }

            let outcome = self
                .orchestrator
                .evaluate(&query, None, &self.history, &mut self.log)
                .await?;

            match outcome {
                EvaluationOutcome::Accepted { result, .. } => {
                    self.history.push(Message::user(format!(
                        "Query result:\n\n{}",
                        result.to_json()?
                    )));
                    accepted = Some(result);
                }
                EvaluationOutcome::Retry(failure) => {
                    debug!(reason = %failure.reason, "Query attempt failed");
                    self.history.push(Message::user(failure.to_string()));
                }
            }
        }
    }

    async fn chat(&self) -> Result<String> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend(self.history.iter().cloned());

        let response = self.model.chat(messages, &self.chat_options).await?;
        debug!(tokens = response.tokens_used, "Model replied");
        Ok(response.content)
    }

    /// Record a tool request; false once the budget is spent
    fn take_tool_call(&mut self, tool_calls: &mut usize, reply: String) -> bool {
        self.history.push(Message::assistant(reply));
        if *tool_calls >= self.max_attempts {
            warn!(max_attempts = self.max_attempts, "Tool budget exhausted");
            return false;
        }
        *tool_calls += 1;
        true
    }

    /// Ask for a final answer once no more tools may be used
    async fn conclude(
        &mut self,
        accepted: Option<ClassifiedResult>,
        tool_calls: usize,
    ) -> Result<AgentTurn> {
        self.history.push(Message::user(BUDGET_EXHAUSTED));
        let answer = self.chat().await?;
        self.history.push(Message::assistant(answer.clone()));
        Ok(self.finish(answer, accepted, tool_calls))
    }

    fn finish(
        &mut self,
        answer: String,
        result: Option<ClassifiedResult>,
        tool_calls: usize,
    ) -> AgentTurn {
        let evaluations = self.log.drain();
        info!(tool_calls, evaluations = evaluations.len(), "Question answered");
        AgentTurn {
            answer,
            evaluations,
            result,
            tool_calls,
        }
    }

    /// Search results are held to the same size budget as query results
    fn bounded(&self, text: String) -> String {
        let tokens = estimate_tokens(&text);
        let max = self.orchestrator.config().max_response_tokens;
        if tokens > max {
            format!(
                "The search result contained {} tokens, greater than the maximum allowable of {}. Please try a smaller search.",
                tokens, max
            )
        } else {
            text
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TermMatches;
    use crate::database::ReplayBackend;
    use crate::evaluation::{FailureReason, ReviewRequest, Reviewer};
    use crate::graph::{NodeValue, RawRecord};
    use crate::llm::{FinishReason, LlmResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, messages: Vec<Message>, _options: &ChatOptions) -> Result<LlmResponse> {
            self.calls.lock().unwrap().push(messages);
            let content = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "Done.".to_string());
            Ok(LlmResponse {
                content,
                model: "scripted".to_string(),
                tokens_used: 1,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    struct FixedReviewer(&'static str);

    #[async_trait]
    impl Reviewer for FixedReviewer {
        async fn review(&self, _request: &ReviewRequest) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingReviewer;

    #[async_trait]
    impl Reviewer for FailingReviewer {
        async fn review(&self, _request: &ReviewRequest) -> Result<String> {
            Err(Error::LLMError("connection reset".to_string()))
        }
    }

    /// Rejects the first query, then cancels the question while reviewing
    struct CancellingReviewer {
        cancel: CancellationToken,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Reviewer for CancellingReviewer {
        async fn review(&self, _request: &ReviewRequest) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(REJECT.to_string());
            }
            self.cancel.cancel();
            std::future::pending().await
        }
    }

    struct StubSearch;

    #[async_trait]
    impl TermSearch for StubSearch {
        async fn search(&self, terms: &[String]) -> Result<Vec<TermMatches>> {
            Ok(terms
                .iter()
                .map(|term| TermMatches {
                    term: term.clone(),
                    items: vec![],
                })
                .collect())
        }
    }

    fn orchestrator(verdict: &'static str) -> EvaluationOrchestrator {
        reviewed_by(Arc::new(FixedReviewer(verdict)))
    }

    fn reviewed_by(reviewer: Arc<dyn Reviewer>) -> EvaluationOrchestrator {
        let backend = ReplayBackend::new().with_default(vec![
            RawRecord::new().with("g", NodeValue::new("HGNC:1884").with_property("name", "CFTR")),
        ]);
        EvaluationOrchestrator::new(QueryExecutor::new(Arc::new(backend))).with_reviewer(reviewer)
    }

    const ACCEPT: &str = r#"{"query_summary": "Finds CFTR", "accept_query": true, "suggestion": ""}"#;
    const REJECT: &str = r#"{"query_summary": "Finds CFTR", "accept_query": false, "suggestion": "Use biolink_causes"}"#;

    #[tokio::test]
    async fn test_query_then_answer() {
        let model = ScriptedModel::new(&[
            "```cypher\nMATCH (g:biolink_Gene) RETURN g\n```",
            "CFTR causes cystic fibrosis.",
        ]);
        let mut agent = QueryAgent::new(model.clone(), orchestrator(ACCEPT));

        let turn = agent.ask("Which gene causes CF?").await.unwrap();

        assert_eq!(turn.answer, "CFTR causes cystic fibrosis.");
        assert_eq!(turn.tool_calls, 1);
        assert_eq!(turn.evaluations.len(), 1);
        assert!(turn.result.unwrap().is_graph());
        assert_eq!(agent.history().len(), 4);

        let calls = model.calls.lock().unwrap();
        let last = calls.last().unwrap();
        assert!(last.iter().any(|m| m.content.starts_with("Query result:")));
    }

    #[tokio::test]
    async fn test_rejections_exhaust_budget() {
        let query = "```cypher\nMATCH (g) RETURN g\n```";
        let model = ScriptedModel::new(&[query, query, query, "I could not find an answer."]);
        let mut agent = QueryAgent::new(model, orchestrator(REJECT)).with_max_attempts(2);

        let turn = agent.ask("Which gene causes CF?").await.unwrap();

        assert_eq!(turn.tool_calls, 2);
        assert_eq!(turn.evaluations.len(), 2);
        assert!(turn.evaluations.iter().all(|e| e.reason == Some(FailureReason::EvaluationRejected)));
        assert_eq!(turn.answer, "I could not find an answer.");
        assert!(turn.result.is_none());
        assert!(agent.history().iter().any(|m| m.content == BUDGET_EXHAUSTED));
    }

    #[tokio::test]
    async fn test_log_drained_once_per_turn() {
        let model = ScriptedModel::new(&[
            "```cypher\nMATCH (g) RETURN g\n```",
            "First answer.",
            "Just a chat reply.",
        ]);
        let mut agent = QueryAgent::new(model, orchestrator(ACCEPT));

        assert_eq!(agent.ask("first").await.unwrap().evaluations.len(), 1);
        assert!(agent.ask("thanks").await.unwrap().evaluations.is_empty());
    }

    #[tokio::test]
    async fn test_search_feeds_results_back() {
        let model = ScriptedModel::new(&["```search\ncystic fibrosis\n```", "Found it."]);
        let mut agent = QueryAgent::new(model.clone(), orchestrator(ACCEPT)).with_search(Arc::new(StubSearch));

        let turn = agent.ask("What is CF?").await.unwrap();

        assert_eq!(turn.tool_calls, 1);
        assert!(turn.evaluations.is_empty());
        assert!(agent.history()[2].content.contains("cystic fibrosis"));
    }

    #[tokio::test]
    async fn test_cancelled_question_removed() {
        let model = ScriptedModel::new(&["Hello."]);
        let mut agent = QueryAgent::new(model, orchestrator(ACCEPT));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = agent.ask_cancellable("hi", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::UserCancelled));
        assert!(agent.history().is_empty());
    }

    #[tokio::test]
    async fn test_failed_question_leaves_nothing_behind() {
        let model = ScriptedModel::new(&["```cypher\nMATCH (g) RETURN g\n```", "Hello"]);
        let mut agent = QueryAgent::new(model, reviewed_by(Arc::new(FailingReviewer)));

        let err = agent.ask("Which gene causes CF?").await.unwrap_err();
        assert!(matches!(err, Error::ReviewerFailed(_)));
        assert!(agent.history().is_empty());

        let turn = agent.ask("hi").await.unwrap();
        assert_eq!(turn.answer, "Hello");
        assert!(turn.evaluations.is_empty());
        let contents: Vec<&str> = agent.history().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "Hello"]);
    }

    #[tokio::test]
    async fn test_cancelled_mid_query_discards_evaluations() {
        let query = "```cypher\nMATCH (g) RETURN g\n```";
        let model = ScriptedModel::new(&[query, query, "Hello"]);
        let cancel = CancellationToken::new();
        let reviewer = Arc::new(CancellingReviewer {
            cancel: cancel.clone(),
            calls: AtomicUsize::new(0),
        });
        let mut agent = QueryAgent::new(model, reviewed_by(reviewer));

        let err = agent.ask_cancellable("Which gene causes CF?", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::UserCancelled));
        assert!(agent.history().is_empty());

        let turn = agent.ask("hi").await.unwrap();
        assert!(turn.evaluations.is_empty());
        assert_eq!(agent.history().len(), 2);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer question", 8), "a longer...");
    }
}
