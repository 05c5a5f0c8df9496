//! Vote aggregation and approval decisions.

use chrono::{DateTime, Duration, Utc};
use milestone_graph::Vote;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConsensusConfig;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// How votes are folded into an approval score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMethod {
    /// Every vote counts once, weights ignored
    SimpleMajority,
    #[default]
    WeightedAverage,
    /// Reserved for per-voter confidence; aggregates like `WeightedAverage` for now
    ConfidenceWeighted,
}

impl ConsensusMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleMajority => "simple_majority",
            Self::WeightedAverage => "weighted_average",
            Self::ConfidenceWeighted => "confidence_weighted",
        }
    }
}

/// Aggregate of one set of votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ConsensusResult {
    pub method: ConsensusMethod,
    /// Share of approving weight (0.0 - 1.0)
    pub approval_score: f64,
    /// Trust in the approval score (0.0 - 1.0)
    pub confidence: f64,
    pub total_votes: usize,
    pub positive_votes: usize,
    pub negative_votes: usize,
    pub total_weight: f64,
}

impl ConsensusResult {
    fn empty(method: ConsensusMethod) -> Self {
        Self {
            method,
            approval_score: 0.0,
            confidence: 0.0,
            total_votes: 0,
            positive_votes: 0,
            negative_votes: 0,
            total_weight: 0.0,
        }
    }

    pub fn level(&self) -> ConsensusLevel {
        consensus_level(self.confidence, self.total_votes)
    }
}

/// Outcome of applying the decision rule to a consensus result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    InsufficientVotes,
    Approved,
    ConditionallyApproved,
    Rejected,
    NeedsMoreVotes,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientVotes => "insufficient_votes",
            Self::Approved => "approved",
            Self::ConditionallyApproved => "conditionally_approved",
            Self::Rejected => "rejected",
            Self::NeedsMoreVotes => "needs_more_votes",
        }
    }

    pub fn is_approval(&self) -> bool {
        matches!(self, Self::Approved | Self::ConditionallyApproved)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ApprovalDecision {
    pub status: ApprovalStatus,
    pub final_approval: bool,
    pub reasoning: String,
}

/// Human-readable agreement band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ConsensusLevel {
    NoVotes,
    StrongConsensus,
    GoodConsensus,
    WeakConsensus,
    NoConsensus,
}

impl ConsensusLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoVotes => "no_votes",
            Self::StrongConsensus => "strong_consensus",
            Self::GoodConsensus => "good_consensus",
            Self::WeakConsensus => "weak_consensus",
            Self::NoConsensus => "no_consensus",
        }
    }
}

pub fn consensus_level(confidence: f64, total_votes: usize) -> ConsensusLevel {
    if total_votes == 0 {
        ConsensusLevel::NoVotes
    } else if confidence >= 0.9 {
        ConsensusLevel::StrongConsensus
    } else if confidence >= 0.7 {
        ConsensusLevel::GoodConsensus
    } else if confidence >= 0.5 {
        ConsensusLevel::WeakConsensus
    } else {
        ConsensusLevel::NoConsensus
    }
}

/// Why a voting session concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ConclusionReason {
    WindowElapsed,
    StrongConsensus,
    /// Closed explicitly by the caller
    Closed,
}

/// Turns votes into approval scores and decisions.
#[derive(Debug, Clone, Default)]
pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Aggregate with the configured method.
    pub fn calculate(&self, votes: &[Vote]) -> ConsensusResult {
        self.calculate_with(votes, self.config.method)
    }

    pub fn calculate_with(&self, votes: &[Vote], method: ConsensusMethod) -> ConsensusResult {
        if votes.is_empty() {
            return ConsensusResult::empty(method);
        }
        let positive_votes = votes.iter().filter(|v| v.up).count();
        let total_votes = votes.len();
        let total_weight: f64 = votes.iter().map(|v| v.weight).sum();

        let (approval_score, confidence) = match method {
            ConsensusMethod::SimpleMajority => {
                let approval = positive_votes as f64 / total_votes as f64;
                let volume = (total_votes as f64 / self.config.volume_saturation).min(1.0);
                (approval, (volume + margin(approval)) / 2.0)
            }
            ConsensusMethod::WeightedAverage | ConsensusMethod::ConfidenceWeighted => {
                if total_weight == 0.0 {
                    (0.0, 0.0)
                } else {
                    let approving: f64 = votes.iter().filter(|v| v.up).map(|v| v.weight).sum();
                    let approval = approving / total_weight;
                    let volume = (total_weight / self.config.volume_saturation).min(1.0);
                    let weights: Vec<f64> = votes.iter().map(|v| v.weight).collect();
                    let distribution = 1.0 / (1.0 + variance(&weights));
                    (approval, (volume + margin(approval) + distribution) / 3.0)
                }
            }
        };

        debug!(
            method = method.as_str(),
            total_votes,
            approval = approval_score,
            confidence,
            "Consensus calculated"
        );

        ConsensusResult {
            method,
            approval_score,
            confidence,
            total_votes,
            positive_votes,
            negative_votes: total_votes - positive_votes,
            total_weight,
        }
    }

    /// Apply the approval rule.
    pub fn decide(&self, result: &ConsensusResult) -> ApprovalDecision {
        let c = &self.config;
        let (status, reasoning) = if result.total_votes < c.minimum_votes {
            (
                ApprovalStatus::InsufficientVotes,
                format!(
                    "Only {} votes received, minimum {} required",
                    result.total_votes, c.minimum_votes
                ),
            )
        } else {
            let decisive = result.confidence >= c.decisive_confidence;
            let approved = result.approval_score >= c.approval_threshold;
            let status = match (approved, decisive) {
                (true, true) => ApprovalStatus::Approved,
                (true, false) => ApprovalStatus::ConditionallyApproved,
                (false, true) => ApprovalStatus::Rejected,
                (false, false) => ApprovalStatus::NeedsMoreVotes,
            };
            let reasoning = format!(
                "{} approval ({:.2}) with {} confidence ({:.2})",
                if approved { "High" } else { "Low" },
                result.approval_score,
                if decisive { "good" } else { "low" },
                result.confidence
            );
            (status, reasoning)
        };
        ApprovalDecision {
            status,
            final_approval: status.is_approval(),
            reasoning,
        }
    }

    /// Conclusion needs the minimum votes and either an elapsed window or strong consensus.
    pub fn should_conclude(
        &self,
        votes: &[Vote],
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<ConclusionReason> {
        if votes.len() < self.config.minimum_votes {
            return None;
        }
        if now - started_at >= self.window() {
            return Some(ConclusionReason::WindowElapsed);
        }
        if self.calculate(votes).confidence >= self.config.strong_consensus {
            return Some(ConclusionReason::StrongConsensus);
        }
        None
    }

    pub fn window(&self) -> Duration {
        Duration::hours(self.config.voting_window_hours)
    }
}

fn margin(approval: f64) -> f64 {
    (approval - 0.5).abs() * 2.0
}

/// Population variance; zero for fewer than two values.
fn variance(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n
}
