//! Query execution
//!
//! [`QueryExecutor`] runs one query under a deadline and hands back either
//! a classified, projected result or a [`RetryableFailure`](crate::evaluation::RetryableFailure).

mod executor;
mod vocabulary;

pub use executor::{DEFAULT_QUERY_TIMEOUT, ExecutionOutcome, QueryExecutor};
pub use vocabulary::{extract_cypher, fix_biolink_labels};
