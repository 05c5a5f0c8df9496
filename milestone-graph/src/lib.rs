//! Causal milestone graph for career roadmaps.
//!
//! A person works toward goals; each goal owns milestones wired together by
//! typed causal relationships. This crate owns that graph and everything
//! that can be derived from its structure alone:
//!
//! - **Store**: all mutation, atomic and invariant-checked
//! - **Matrix**: dense adjacency view, goal at node 0, rebuilt after every mutation
//! - **Structure**: connectivity, cycles, centrality, critical paths, quality
//! - **Consistency**: contradictory, inconsistent or paradoxical relationships
//! - **Insights**: relationship mix and progression pattern
//! - **Persistence**: JSON document shape, including legacy migration
//!
//! # Example
//!
//! ```ignore
//! use milestone_graph::{AdjacencyView, Goal, StructureAnalyzer};
//!
//! let mut goal = Goal::new("goal-1", "Become a data scientist");
//! let stats = goal.add_milestone("Statistics", 8, None, None)?;
//! goal.insert_as_prerequisite(&stats, "Linear algebra", 6, None)?;
//!
//! let view = AdjacencyView::build(&goal);
//! let report = StructureAnalyzer::new().analyze(&view);
//! ```

pub mod consistency;
pub mod error;
pub mod insights;
pub mod matrix;
pub mod persistence;
pub mod store;
pub mod structure;
pub mod types;
pub mod verification;

// Re-export main types
pub use consistency::{ConsistencyChecker, ConsistencyRules, Inconsistency, InconsistencyKind};
pub use error::{GraphError, Result};
pub use insights::{CausalInsights, ProgressionPattern};
pub use matrix::{connect_orphaned_goal, AdjacencyView, ViewCache};
pub use persistence::{PersonDocument, StoreDocument};
pub use store::GraphStore;
pub use structure::{QualityWeights, Severity, StructureAnalyzer, StructureReport};
pub use types::*;
pub use verification::{StructureVerifier, VerificationReport};
