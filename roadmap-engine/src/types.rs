//! Shared error type for the roadmap engine.

use milestone_graph::GraphError;

/// Error types for the roadmap engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Graph store rejected the operation
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Vote arrived after the voting session concluded
    #[error("Voting session concluded: {0}")]
    SessionConcluded(String),

    /// Strategy selector cannot move from its current state
    #[error("Invalid strategy transition: {0}")]
    InvalidTransition(String),

    /// Backing storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::Graph(GraphError::NotFound(what.into()))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Graph(GraphError::NotFound(_)))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
