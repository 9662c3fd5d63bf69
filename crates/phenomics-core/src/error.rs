//! Error types for Phenomics Explorer
//!
//! Retryable query outcomes (timeouts, rejected evaluations, oversized
//! results) are not errors; see [`crate::evaluation::RetryableFailure`].

use thiserror::Error;

/// Result type alias using Phenomics Explorer's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Phenomics Explorer error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Network errors (E100-E199)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check your API key with `phenomics config get llm.api_key`.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    #[error("No suitable model found: {0}")]
    NoSuitableModel(String),

    // Database errors (E400-E499)
    #[error("Database connection failed: {0}. Check `database.uri` and NEO4J_PASSWORD.")]
    DatabaseConnection(String),

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Unknown result shape '{0}'. Expected 'auto', 'graph' or 'table'.")]
    InvalidResultShape(String),

    // Reviewer errors (E500-E599)
    #[error("Reviewer failed: {0}")]
    ReviewerFailed(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // User errors (E700-E799)
    #[error("User cancelled operation")]
    UserCancelled,

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Fixture error: {0}")]
    FixtureError(String),

    // Generic errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::RateLimited(_) => "E102",
            Self::NoSuitableModel(_) => "E103",
            Self::DatabaseConnection(_) => "E400",
            Self::QueryExecution(_) => "E401",
            Self::InvalidResultShape(_) => "E402",
            Self::ReviewerFailed(_) => "E500",
            Self::ConfigError(_) => "E600",
            Self::UserCancelled => "E700",
            Self::InvalidInput(_) => "E800",
            Self::FixtureError(_) => "E801",
            Self::Json(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) => Some("phenomics config get llm.api_key".to_string()),
            Self::DatabaseConnection(_) => Some("phenomics doctor".to_string()),
            Self::InvalidResultShape(_) => Some("Use --shape auto, graph or table".to_string()),
            Self::ReviewerFailed(_) => {
                Some("phenomics config set evaluation.reviewer_enabled false".to_string())
            }
            Self::ConfigError(_) => Some("phenomics config list".to_string()),
            _ => None,
        }
    }

    /// Whether a retry of the same operation could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::RateLimited(_) | Self::DatabaseConnection(_)
        )
    }
}
