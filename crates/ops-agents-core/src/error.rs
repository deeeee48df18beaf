use thiserror::Error;

use crate::traits::llm::LLMError;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution failed: {0}")]
    Tool(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Llm(#[from] LLMError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AgentError {
    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        AgentError::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::Config(_) | AgentError::InvalidTransition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let err = AgentError::invalid_transition("idle", "evaluate");
        assert_eq!(err.to_string(), "Invalid phase transition: idle -> evaluate");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_transport_errors_not_fatal() {
        assert!(!AgentError::Tool("socket closed".into()).is_fatal());
        assert!(!AgentError::Timeout(30_000).is_fatal());
        assert!(!AgentError::UnknownTool("aws_metrics".into()).is_fatal());
    }
}
