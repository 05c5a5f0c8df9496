//! Consensus - folds milestone votes into approval decisions.
//!
//! 1. **Engine**: approval score, confidence and the decision rule
//! 2. **Session**: per-milestone voting windows with early conclusion

mod engine;
mod session;

pub use engine::{
    consensus_level, ApprovalDecision, ApprovalStatus, ConclusionReason, ConsensusEngine,
    ConsensusLevel, ConsensusMethod, ConsensusResult,
};
pub use session::{
    Conclusion, ConsensusDistribution, SessionState, SessionStatus, SessionTracker, VoteRecord,
    VoterHistory, VotingAnalytics, VotingSession,
};
