//! Configuration for the roadmap engine.
//!
//! Every threshold the engine applies lives here so that deployments can
//! retune it without touching code.

use milestone_graph::{ConsistencyRules, QualityWeights};
use serde::{Deserialize, Serialize};

use crate::consensus::ConsensusMethod;
use crate::types::{EngineError, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Vote aggregation and session conclusion
    pub consensus: ConsensusConfig,
    /// Group classification, removal and focus
    pub groups: GroupConfig,
    /// Structural quality heuristic
    pub structure: QualityWeights,
    /// Consistency check tables
    pub consistency: ConsistencyRules,
    /// Strategy selection
    pub strategy: StrategyConfig,
}

impl EngineConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| EngineError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| EngineError::ConfigError(e.to_string()))
    }

    /// Reject values outside their meaningful range.
    pub fn validate(&self) -> Result<()> {
        let c = &self.consensus;
        for (name, value) in [
            ("consensus.approval_threshold", c.approval_threshold),
            ("consensus.decisive_confidence", c.decisive_confidence),
            ("consensus.strong_consensus", c.strong_consensus),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::ConfigError(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if c.volume_saturation <= 0.0 {
            return Err(EngineError::ConfigError(
                "consensus.volume_saturation must be positive".into(),
            ));
        }
        if self.groups.removal.min_criteria == 0 {
            return Err(EngineError::ConfigError(
                "groups.removal.min_criteria must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Consensus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Aggregation method
    pub method: ConsensusMethod,
    /// Approval score needed to approve
    pub approval_threshold: f64,
    /// Votes needed before any decision
    pub minimum_votes: usize,
    /// Session length before it concludes on its own
    pub voting_window_hours: i64,
    /// Confidence separating decisive outcomes from tentative ones
    pub decisive_confidence: f64,
    /// Confidence that concludes a session early
    pub strong_consensus: f64,
    /// Total weight at which the volume signal saturates
    pub volume_saturation: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            method: ConsensusMethod::WeightedAverage,
            approval_threshold: 0.6,
            minimum_votes: 3,
            voting_window_hours: 24,
            decisive_confidence: 0.7,
            strong_consensus: 0.95,
            volume_saturation: 10.0,
        }
    }
}

/// Group configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub classification: ClassificationConfig,
    pub removal: RemovalConfig,
    pub health: HealthConfig,
    /// Each milestone with a downvote lowers the problematic score by this
    pub downvote_penalty: f64,
    /// Focus priority above which a group counts as high priority
    pub high_priority: f64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            classification: ClassificationConfig::default(),
            removal: RemovalConfig::default(),
            health: HealthConfig::default(),
            downvote_penalty: 0.5,
            high_priority: 0.7,
        }
    }
}

/// Cutoffs for the classification ladder, checked in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub excellent_min_avg: f64,
    pub excellent_min_confidence: f64,
    pub good_min_avg: f64,
    pub good_max_ratio: f64,
    pub attention_min_avg: f64,
    pub attention_max_ratio: f64,
    pub critical_min_ratio: f64,
    pub critical_max_avg: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            excellent_min_avg: 1.0,
            excellent_min_confidence: 0.7,
            good_min_avg: 0.0,
            good_max_ratio: 0.3,
            attention_min_avg: -1.0,
            attention_max_ratio: 0.5,
            critical_min_ratio: 0.7,
            critical_max_avg: -2.0,
        }
    }
}

/// Removal criteria; a group is a candidate once `min_criteria` hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    pub thumbs_down_ratio: f64,
    pub problematic_score: f64,
    pub low_confidence: f64,
    pub engaged_min_votes: usize,
    pub engaged_max_avg: f64,
    pub min_criteria: usize,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            thumbs_down_ratio: 0.8,
            problematic_score: -2.0,
            low_confidence: 0.3,
            engaged_min_votes: 3,
            engaged_max_avg: -1.0,
            min_criteria: 2,
        }
    }
}

/// Ratios for the overall health verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub critical_ratio: f64,
    pub problematic_ratio: f64,
    pub good_ratio: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            critical_ratio: 0.3,
            problematic_ratio: 0.5,
            good_ratio: 0.6,
        }
    }
}

/// Strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Most problematic regions still handled with a targeted pass
    pub targeted_max_regions: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            targeted_max_regions: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_round_trip() {
        let config = EngineConfig::default();
        let yaml = config.to_yaml().unwrap();
        let parsed = EngineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.consensus.minimum_votes, 3);
        assert_eq!(parsed.groups.removal.min_criteria, 2);
        assert_eq!(parsed.consistency.contradictory_pairs.len(), 4);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "consensus:\n  approval_threshold: 0.75\nstrategy:\n  targeted_max_regions: 3\n";
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.consensus.approval_threshold, 0.75);
        assert_eq!(config.consensus.strong_consensus, 0.95);
        assert_eq!(config.strategy.targeted_max_regions, 3);
        assert_eq!(config.groups.downvote_penalty, 0.5);
        assert_eq!(config.structure.cyclic_factor, 0.5);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let yaml = "consensus:\n  approval_threshold: 1.5\n";
        assert!(matches!(
            EngineConfig::from_yaml(yaml),
            Err(EngineError::ConfigError(_))
        ));
    }
}
