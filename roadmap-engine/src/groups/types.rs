//! Group report data types.

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Health of a single group, from the classification ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum GroupClassification {
    Empty,
    Excellent,
    Good,
    NeedsAttention,
    Critical,
    Problematic,
}

impl GroupClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::NeedsAttention => "needs_attention",
            Self::Critical => "critical",
            Self::Problematic => "problematic",
        }
    }

    /// Whether the group counts toward strategy selection.
    pub fn is_problematic_region(&self) -> bool {
        matches!(self, Self::NeedsAttention | Self::Problematic | Self::Critical)
    }
}

impl std::fmt::Display for GroupClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vote-derived numbers for one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct GroupSignals {
    pub milestones: usize,
    /// Mean of `up - down` per milestone
    pub avg_vote_score: f64,
    /// Milestones with at least one downvote
    pub thumbs_down_count: usize,
    /// `avg_vote_score - penalty * thumbs_down_count`; lower is worse
    pub problematic_score: f64,
    /// Positive share of all votes, 0.5 when unvoted
    pub confidence: f64,
    pub total_votes: usize,
    pub positive_votes: usize,
    pub negative_votes: usize,
}

impl GroupSignals {
    pub fn thumbs_down_ratio(&self) -> f64 {
        if self.milestones == 0 {
            0.0
        } else {
            self.thumbs_down_count as f64 / self.milestones as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RemovalCriterion {
    HighThumbsDownRatio,
    VeryLowProblematicScore,
    LowConfidenceNegative,
    EngagedNegative,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RemovalAssessment {
    pub recommended: bool,
    pub criteria: Vec<RemovalCriterion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct GroupScore {
    pub id: String,
    /// Milestone ids in view order
    pub milestone_ids: Vec<String>,
    pub signals: GroupSignals,
    pub thumbs_down_ratio: f64,
    pub classification: GroupClassification,
    pub removal: RemovalAssessment,
    /// 0.0 - 1.0
    pub focus_priority: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Unknown,
    Critical,
    NeedsAttention,
    Good,
    Fair,
}

impl OverallHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Critical => "critical",
            Self::NeedsAttention => "needs_attention",
            Self::Good => "good",
            Self::Fair => "fair",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct GroupSummary {
    pub total_groups: usize,
    pub removal_candidates: usize,
    pub high_priority_groups: usize,
    pub removal_rate: f64,
    pub overall_health: OverallHealth,
}

/// What the conversation should do about the worst group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum FocusStrategy {
    /// Rework downvoted milestones
    Problematic,
    /// Look for missing steps around confirmed milestones
    Gaps,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct FocusArea {
    pub group_id: String,
    /// At least one upvote
    pub confirmed: Vec<String>,
    /// At least one downvote
    pub problematic: Vec<String>,
    pub unvoted: Vec<String>,
    /// Lowest-scored confirmed milestone, the natural place to look for gaps
    pub anchor: Option<String>,
    pub focus_strategy: FocusStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct GroupReport {
    /// Most problematic first
    pub groups: Vec<GroupScore>,
    pub summary: GroupSummary,
    pub focus: Option<FocusArea>,
}

impl GroupReport {
    pub fn problematic_regions(&self) -> impl Iterator<Item = &GroupScore> {
        self.groups
            .iter()
            .filter(|g| g.classification.is_problematic_region())
    }

    pub fn group(&self, id: &str) -> Option<&GroupScore> {
        self.groups.iter().find(|g| g.id == id)
    }
}
