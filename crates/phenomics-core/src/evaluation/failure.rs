//! Retryable query outcomes

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::verdict::EvaluationVerdict;

/// Why an attempt should be retried with a different query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    ExecutionError,
    EvaluationRejected,
    ResponseTooLarge,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ExecutionError => "execution_error",
            Self::EvaluationRejected => "evaluation_rejected",
            Self::ResponseTooLarge => "response_too_large",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed attempt the caller can recover from by generating another query
///
/// Returned as a value, never raised. [`Display`](fmt::Display) renders the
/// message meant to be fed back to the query generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryableFailure {
    pub reason: FailureReason,
    pub detail: String,
    pub suggestion: String,
}

impl RetryableFailure {
    pub fn new(
        reason: FailureReason,
        detail: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            reason,
            detail: detail.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Database execution exceeded its deadline
    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            FailureReason::Timeout,
            format!(
                "The query took longer than the allotted time of {} seconds and was terminated.",
                seconds(limit)
            ),
            "The query timed out. Try again, reducing query computation.",
        )
    }

    /// The reviewer did not answer in time
    pub fn reviewer_timeout(limit: Duration) -> Self {
        Self::new(
            FailureReason::Timeout,
            format!(
                "The query result could not be evaluated within the allotted time of {} seconds.",
                seconds(limit)
            ),
            "Try again with a query that returns a smaller, more focused result.",
        )
    }

    /// The database rejected the query; `message` is kept verbatim
    pub fn execution_error(message: impl Into<String>) -> Self {
        Self::new(
            FailureReason::ExecutionError,
            message,
            "Correct the query using the error message and try again.",
        )
    }

    /// The reviewer did not accept the query
    pub fn rejected(verdict: &EvaluationVerdict) -> Self {
        Self::new(
            FailureReason::EvaluationRejected,
            verdict.suggestion.clone(),
            "The query did not pass evaluation; please review the suggestions and try again.",
        )
    }

    /// Accepted, but too large to hand back
    pub fn too_large(tokens: usize, max_tokens: usize) -> Self {
        Self::new(
            FailureReason::ResponseTooLarge,
            format!(
                "The search result contained {} tokens, greater than the maximum allowable of {}.",
                tokens, max_tokens
            ),
            "Please try a smaller search.",
        )
    }

    pub fn is_timeout(&self) -> bool {
        self.reason == FailureReason::Timeout
    }
}

/// Whole seconds print as integers, anything finer as a decimal
fn seconds(limit: Duration) -> String {
    if limit.subsec_nanos() == 0 {
        limit.as_secs().to_string()
    } else {
        limit.as_secs_f64().to_string()
    }
}

impl fmt::Display for RetryableFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            FailureReason::ExecutionError => {
                write!(f, "The query generated an error:\n\n{}", self.detail)
            }
            FailureReason::EvaluationRejected => {
                write!(f, "{}\n\n{}", self.suggestion, self.detail)
            }
            FailureReason::Timeout | FailureReason::ResponseTooLarge => {
                write!(f, "{} {}", self.detail, self.suggestion)
            }
        }
    }
}
