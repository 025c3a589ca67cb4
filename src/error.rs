//! Error types surfaced to callers.
//!
//! Recoverable problems (broken workflow files, odd plan markdown) are
//! logged and degraded locally and never show up here. These variants are
//! the failures that would otherwise corrupt persisted state.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for devflow operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors returned by conversation and transition operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// No conversation exists for this project and branch.
    #[error("No development conversation for '{}' on branch '{branch}'. Start one first.", project_path.display())]
    ConversationNotFound { project_path: PathBuf, branch: String },

    /// The requested phase is not part of the active workflow.
    #[error("Invalid target phase '{target}' for workflow '{workflow}'. Valid phases: {}", available.join(", "))]
    InvalidTargetPhase { target: String, workflow: String, available: Vec<String> },

    /// Reset was requested without confirmation.
    #[error("Reset requires explicit confirmation (confirm: true)")]
    ResetNotConfirmed,

    /// A review must be performed before this transition.
    #[error("Transition from '{from}' to '{to}' requires a review. Conduct the review, then proceed with review_state 'performed'.")]
    ReviewRequired { from: String, to: String },

    /// SQLite failure.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding of logged payloads.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    /// Stable machine-readable kind, used in protocol responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConversationNotFound { .. } => "ConversationNotFound",
            Self::InvalidTargetPhase { .. } => "InvalidTargetPhase",
            Self::ResetNotConfirmed => "ResetNotConfirmed",
            Self::ReviewRequired { .. } => "ReviewRequired",
            Self::Storage(_) => "Storage",
            Self::Io(_) => "Io",
            Self::Serialization(_) => "Serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_target_message_lists_phases() {
        let err = FlowError::InvalidTargetPhase {
            target: "deploy".to_string(),
            workflow: "waterfall".to_string(),
            available: vec!["requirements".to_string(), "design".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'deploy'"));
        assert!(msg.contains("requirements, design"));
        assert_eq!(err.kind(), "InvalidTargetPhase");
    }
}
