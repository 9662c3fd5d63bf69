//! Per-conversation evaluation log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::failure::{FailureReason, RetryableFailure};
use super::verdict::EvaluationVerdict;

/// One evaluated attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Query as shown to users
    pub query: String,
    pub verdict: EvaluationVerdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    pub recorded_at: DateTime<Utc>,
}

impl EvaluationRecord {
    pub fn new(query: impl Into<String>, verdict: EvaluationVerdict) -> Self {
        Self {
            query: query.into(),
            verdict,
            reason: None,
            recorded_at: Utc::now(),
        }
    }

    /// Entry for a failure that never reached (or got past) the reviewer
    pub fn failure(query: impl Into<String>, failure: &RetryableFailure) -> Self {
        let verdict = match failure.reason {
            FailureReason::Timeout => EvaluationVerdict::rejection(failure.detail.clone()),
            _ => EvaluationVerdict::rejection(failure.to_string()),
        };
        Self {
            reason: Some(failure.reason),
            ..Self::new(query, verdict)
        }
    }

    pub fn with_reason(mut self, reason: FailureReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn is_accepted(&self) -> bool {
        self.verdict.accept_query && self.reason.is_none()
    }
}

/// Append-only record of attempts, drained once per completed turn
///
/// Evaluation borrows the log mutably, so it cannot be drained while an
/// attempt is in flight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationLog {
    entries: Vec<EvaluationRecord>,
}

impl EvaluationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EvaluationRecord) {
        self.entries.push(record);
    }

    pub fn entries(&self) -> &[EvaluationRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&EvaluationRecord> {
        self.entries.last()
    }

    /// Take every entry, leaving the log empty
    pub fn drain(&mut self) -> Vec<EvaluationRecord> {
        std::mem::take(&mut self.entries)
    }
}
