//! Attempt state machine

use serde::{Deserialize, Serialize};

/// Progress of a single query attempt
///
/// `Executing -> Classified -> Summarized -> Reviewing`, then one of the
/// four terminal states. Execution failures jump straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Executing,
    Classified,
    Summarized,
    Reviewing,
    Accepted,
    Rejected,
    TooLarge,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Rejected | Self::TooLarge | Self::Failed
        )
    }

    /// Whether moving to `next` follows the state machine
    pub fn can_transition_to(&self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Executing, Classified)
                | (Executing, Failed)
                | (Classified, Summarized)
                | (Summarized, Reviewing)
                | (Summarized, Accepted)
                | (Summarized, TooLarge)
                | (Reviewing, Accepted)
                | (Reviewing, Rejected)
                | (Reviewing, TooLarge)
                | (Reviewing, Failed)
        )
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Executing => write!(f, "executing"),
            Self::Classified => write!(f, "classified"),
            Self::Summarized => write!(f, "summarized"),
            Self::Reviewing => write!(f, "reviewing"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
            Self::TooLarge => write!(f, "too_large"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
