//! Query evaluation
//!
//! Every generated query goes through [`EvaluationOrchestrator::evaluate`]:
//! execute under a deadline, summarize, review, check the size budget.
//! Anything short of acceptance comes back as a [`RetryableFailure`] for the
//! caller to feed into its next attempt. Decisions accumulate in a
//! per-conversation [`EvaluationLog`].

mod failure;
mod history;
mod log;
mod orchestrator;
mod reviewer;
mod state;
mod verdict;

pub use failure::{FailureReason, RetryableFailure};
pub use history::{HistoryWindow, TRIM_MARKER, render_turns};
pub use log::{EvaluationLog, EvaluationRecord};
pub use orchestrator::{EvaluationOrchestrator, EvaluationOutcome, OrchestratorConfig};
pub use reviewer::{
    EVALUATION_TEMPLATE, EVALUATOR_SYSTEM_PROMPT, LlmReviewer, ReviewRequest, Reviewer,
    render_evaluation_prompt,
};
pub use state::AttemptState;
pub use verdict::EvaluationVerdict;

use crate::graph::ClassifiedResult;

impl From<&RetryableFailure> for ClassifiedResult {
    fn from(failure: &RetryableFailure) -> Self {
        ClassifiedResult::error(failure.to_string())
    }
}
