//! Groups - sub-roadmaps and their vote health.
//!
//! Partitions a goal's milestones into connected components, scores each
//! from its votes, classifies it and decides whether it should be removed
//! or focused on next.

mod analyzer;
mod types;

pub use analyzer::GroupAnalyzer;
pub use types::{
    FocusArea, FocusStrategy, GroupClassification, GroupReport, GroupScore, GroupSignals,
    GroupSummary, OverallHealth, RemovalAssessment, RemovalCriterion,
};
