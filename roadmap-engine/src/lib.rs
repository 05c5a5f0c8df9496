//! Roadmap engine - consensus, group health and strategy over milestone graphs.
//!
//! Sits on top of `milestone-graph` and adds everything that depends on
//! people voting:
//!
//! - **Consensus**: weighted approval, confidence, voting sessions
//! - **Groups**: connected sub-roadmaps scored and classified from votes
//! - **Strategy**: which refinement approach the conversation should take next
//! - **Repository**: one exclusive session per person and goal, persisted
//!   through a pluggable [`RoadmapStorage`]
//!
//! # Example
//!
//! ```ignore
//! use roadmap_engine::{InMemoryStorage, RoadmapRepository};
//! use std::sync::Arc;
//!
//! let repo = RoadmapRepository::new(Arc::new(InMemoryStorage::new()));
//! let goal_id = repo.create_goal("alice", "Become a data scientist").await?;
//! let id = repo
//!     .mutate("alice", &goal_id, |g| g.add_milestone("Statistics", 8, None, None))
//!     .await?;
//! repo.record_vote("alice", &goal_id, &id, "mentor-1", true, 1.0).await?;
//! let analysis = repo.analyze("alice", &goal_id).await?;
//! repo.release("alice", &goal_id).await?;
//! ```

pub mod config;
pub mod consensus;
pub mod groups;
pub mod repository;
pub mod storage;
pub mod strategy;
pub mod types;

// Re-export main types
pub use config::{
    ClassificationConfig, ConsensusConfig, EngineConfig, GroupConfig, HealthConfig,
    RemovalConfig, StrategyConfig,
};
pub use consensus::{
    ApprovalDecision, ApprovalStatus, Conclusion, ConclusionReason, ConsensusEngine,
    ConsensusLevel, ConsensusMethod, ConsensusResult, SessionStatus, SessionTracker,
    VoterHistory, VotingAnalytics,
};
pub use groups::{GroupAnalyzer, GroupClassification, GroupReport, GroupScore, GroupSignals};
pub use repository::{Analyzers, GoalSnapshot, MilestoneConsensus, RoadmapAnalysis, RoadmapRepository};
pub use storage::{InMemoryStorage, JsonFileStorage, RoadmapStorage};
pub use strategy::{
    Delegation, DelegationTarget, SelectorState, Strategy, StrategyRecommendation,
    StrategySelector,
};
pub use types::{EngineError, Result};
