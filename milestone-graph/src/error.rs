//! Error types for graph operations.

/// Error types for the milestone graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Unknown person, goal or milestone id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Removal would leave a non-empty goal without milestones
    #[error("Goal {0} must keep at least one milestone")]
    MinimumMilestonesViolation(String),

    /// Case-insensitive name collision within a goal
    #[error("Duplicate milestone name: {0}")]
    DuplicateMilestoneName(String),

    /// Second vote by the same voter on the same milestone
    #[error("Voter {voter_id} already voted on {milestone_id}")]
    AlreadyVoted {
        voter_id: String,
        milestone_id: String,
    },

    /// Internal desync; indicates a bug in the mutation layer
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Out-of-range argument (score, weight)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persisted document could not be parsed or written
    #[error("Persistence error: {0}")]
    Persistence(#[from] serde_json::Error),
}

impl GraphError {
    pub fn person_not_found(id: &str) -> Self {
        Self::NotFound(format!("person '{}'", id))
    }

    pub fn goal_not_found(id: &str) -> Self {
        Self::NotFound(format!("goal '{}'", id))
    }

    pub fn milestone_not_found(id: &str) -> Self {
        Self::NotFound(format!("milestone '{}'", id))
    }

    /// Recoverable errors leave state unchanged and can be shown to the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvariantViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
