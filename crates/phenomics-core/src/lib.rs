//! Phenomics Explorer Core Library
//!
//! This crate provides the core functionality for Phenomics Explorer, including:
//! - Result normalization (graph/table classification, projection, summaries)
//! - Query execution against Neo4j with deadlines and retryable failures
//! - The query evaluation loop (reviewer verdicts, size budget, evaluation log)
//! - The conversational query agent
//! - LLM integration (OpenAI-compatible chat completions)
//! - Configuration

pub mod agent;
pub mod config;
pub mod database;
pub mod error;
pub mod evaluation;
pub mod graph;
pub mod llm;
pub mod query;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agent::{AgentTurn, QueryAgent};
    pub use crate::config::Config;
    pub use crate::database::{GraphBackend, Neo4jBackend, Params, ReplayBackend};
    pub use crate::error::{Error, Result};
    pub use crate::evaluation::{
        EvaluationLog, EvaluationOrchestrator, EvaluationOutcome, EvaluationRecord,
        EvaluationVerdict, FailureReason, RetryableFailure, Reviewer,
    };
    pub use crate::graph::{ClassifiedResult, GraphData, RawRecord, ResultShape};
    pub use crate::query::QueryExecutor;
}
