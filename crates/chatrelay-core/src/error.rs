//! Error types for the relay core

use thiserror::Error;

/// Apology sent to a conversation when a turn cannot be answered.
pub const APOLOGY: &str = "Sorry, there was an error processing your message.";

/// Relay error types
///
/// Every variant is scoped to a single conversation turn or a startup check;
/// none of them is meant to terminate the process.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Token counting is not implemented for model: {0}")]
    UnsupportedCountingModel(String),

    #[error("Token budget exhausted: behavior prefix uses {used} of {budget} tokens")]
    BudgetExhausted { used: usize, budget: usize },

    #[error("Completion failed: {0}")]
    CompletionFailed(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Invalid template name: {0:?}")]
    InvalidTemplateName(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Whether retrying the same turn can succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CompletionFailed(_))
    }

    /// Text reported back to the conversation for turn failures.
    pub fn user_message(&self) -> String {
        match self {
            Self::BudgetExhausted { .. } | Self::CompletionFailed(_) => APOLOGY.to_string(),
            Self::TemplateNotFound(name) => format!("File not found: {name}"),
            Self::InvalidTemplateName(name) => format!("Invalid behavior name: {name}"),
            other => other.to_string(),
        }
    }

    /// Collapse any error raised by a completion collaborator into
    /// [`RelayError::CompletionFailed`].
    pub(crate) fn into_completion_failure(self) -> Self {
        match self {
            Self::CompletionFailed(_) => self,
            other => Self::CompletionFailed(other.to_string()),
        }
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
