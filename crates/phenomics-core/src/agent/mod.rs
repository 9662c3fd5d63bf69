//! Conversational query agent
//!
//! Drives a chat model that writes Cypher for user questions, routing every
//! query through the [`EvaluationOrchestrator`](crate::evaluation::EvaluationOrchestrator)
//! and feeding failures back until the question is answered or the attempt
//! budget runs out.

pub mod prompts;
mod search;
mod session;

pub use search::{MONARCH_SEARCH_URL, MonarchSearch, TermMatches, TermSearch, extract_search_terms, slim_hits};
pub use session::{AgentTurn, QueryAgent};
