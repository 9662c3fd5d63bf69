//! Query reviewer
//!
//! A second model judges each query against its (summarized) result and the
//! recent conversation before anything is shown to the user.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use super::history::render_turns;
use crate::error::Result;
use crate::llm::{ChatModel, ChatOptions, Message};

/// Everything the reviewer sees for one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRequest {
    pub query: String,
    pub summarized_result: Value,
    pub recent_turns: Vec<Message>,
}

/// External judge of query attempts
///
/// Returns the reviewer's raw reply; parsing into a verdict happens in the
/// orchestrator so malformed replies degrade to rejections.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> Result<String>;
}

pub const EVALUATOR_SYSTEM_PROMPT: &str = "\
You are the Phenomics Evaluator, designed to evaluate cypher queries against the biomedical knowledge graph known as Monarch.

# Instructions

- When asked, evaluate the given query and its results. Follow the instructions exactly.
- Respond with a single JSON object and nothing else, with these fields:
  - \"query_summary\": a summary of how the query works, allowing a non-technical user to understand the cypher syntax, and how it relates to the user question.
  - \"accept_query\": true if the query and results are acceptable, false otherwise.
  - \"suggestion\": suggestions for improving the query, if any.
  - \"return_type\": \"graph\" or \"table\", describing the result.
  - \"returns_edges\": true if the result contains relationships.
  - \"visualize\": true if the result is worth showing as a network.";

pub const EVALUATION_TEMPLATE: &str = "\
Please evaluate the following cypher query in the context of the conversation and query result:

Conversation context:
```
- ...
%MESSAGES_HISTORY%
```

Query:
```
%QUERY%
```

Result (possibly truncated):
```
%QUERY_RESULT%
```

Instructions given to the agent:
```
%INSTRUCTIONS%
```

Report your evaluation considering the following:
- Whether the result aligns with expectations based on the query.
- Whether an ORDER BY clause should be applied.
- Whether relationships are oriented correctly in the query.
- Whether the query should allow for OPTIONAL matches.
- Whether the query passes a 'sanity check' if the results are not as expected.

Think step-by-step.
";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"%([A-Z_]+)%").expect("placeholder pattern compiles")
});

/// Fill the evaluation template
pub fn render_evaluation_prompt(request: &ReviewRequest, instructions: &str) -> String {
    let result = serde_json::to_string_pretty(&request.summarized_result)
        .unwrap_or_else(|_| request.summarized_result.to_string());

    let history = render_turns(&request.recent_turns);

    // One pass over the template; substituted text is never rescanned
    PLACEHOLDER
        .replace_all(EVALUATION_TEMPLATE, |caps: &Captures| match &caps[1] {
            "QUERY" => request.query.clone(),
            "QUERY_RESULT" => result.clone(),
            "MESSAGES_HISTORY" => history.clone(),
            "INSTRUCTIONS" => instructions.to_string(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Reviewer backed by a chat model
pub struct LlmReviewer {
    model: Arc<dyn ChatModel>,
    model_override: Option<String>,
    system_prompt: String,
    instructions: String,
}

impl LlmReviewer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            model_override: None,
            system_prompt: EVALUATOR_SYSTEM_PROMPT.to_string(),
            instructions: String::new(),
        }
    }

    /// Replace the evaluator system prompt, e.g. to add graph background
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Use a specific model instead of the client's fallback chain
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        self
    }

    /// Instructions the query generator was given, shown to the reviewer
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}

#[async_trait]
impl Reviewer for LlmReviewer {
    async fn review(&self, request: &ReviewRequest) -> Result<String> {
        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(render_evaluation_prompt(request, &self.instructions)),
        ];
        let options = ChatOptions::json().with_model(self.model_override.clone());

        let response = self.model.chat(messages, &options).await?;
        debug!(
            model = %response.model,
            tokens = response.tokens_used,
            "Reviewer responded"
        );
        Ok(response.content)
    }
}
