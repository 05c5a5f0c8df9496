//! Strategy selection from group health.
//!
//! The selector is a small state machine driven by the external
//! conversation. Its recommendation is a pure function of the latest group
//! report and is recomputed whenever votes change, so the strategy can shift
//! mid-session.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::StrategyConfig;
use crate::groups::GroupReport;
use crate::types::{EngineError, Result};

#[cfg(feature = "typescript")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Roadmap is sound; fill in detail
    Refinement,
    /// Work through the few problematic regions
    Targeted,
    /// Review the whole roadmap from the start
    Holistic,
    /// Too many regions for a targeted pass; take only the worst one
    TargetedOnWorst,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refinement => "refinement",
            Self::Targeted => "targeted",
            Self::Holistic => "holistic",
            Self::TargetedOnWorst => "targeted_on_worst",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct StrategyOption {
    pub strategy: Strategy,
    pub title: String,
    pub description: String,
    pub recommended: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct StrategyRecommendation {
    pub problematic_regions: usize,
    /// Problematic group ids, worst first
    pub region_ids: Vec<String>,
    pub recommended: Strategy,
    pub options: Vec<StrategyOption>,
}

impl StrategyRecommendation {
    pub fn offers(&self, strategy: Strategy) -> bool {
        self.options.iter().any(|o| o.strategy == strategy)
    }
}

/// Which collaborator takes over once a strategy is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum DelegationTarget {
    CausalityVerification,
    FocusedRefinement,
    GapFilling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Delegation {
    pub strategy: Strategy,
    pub target: DelegationTarget,
    /// Group ids in scope; empty means the whole roadmap
    pub scope: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum SelectorState {
    Preparation,
    Active,
    AwaitingChoice,
    Delegated(Strategy),
    Complete,
}

impl SelectorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparation => "preparation",
            Self::Active => "active",
            Self::AwaitingChoice => "awaiting_choice",
            Self::Delegated(_) => "delegated",
            Self::Complete => "complete",
        }
    }
}

/// Picks the next action for the conversation driver.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    config: StrategyConfig,
    state: SelectorState,
    latest: Option<StrategyRecommendation>,
    delegation: Option<Delegation>,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::with_config(StrategyConfig::default())
    }
}

impl StrategySelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StrategyConfig) -> Self {
        Self {
            config,
            state: SelectorState::Preparation,
            latest: None,
            delegation: None,
        }
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    pub fn latest(&self) -> Option<&StrategyRecommendation> {
        self.latest.as_ref()
    }

    pub fn delegation(&self) -> Option<&Delegation> {
        self.delegation.as_ref()
    }

    /// Recommendation for a group report, without touching state.
    pub fn recommend(&self, report: &GroupReport) -> StrategyRecommendation {
        let region_ids: Vec<String> = report.problematic_regions().map(|g| g.id.clone()).collect();
        let count = region_ids.len();

        let option = |strategy: Strategy, title: &str, description: String, recommended: bool| StrategyOption {
            strategy,
            title: title.to_string(),
            description,
            recommended,
        };
        let holistic_description =
            "Review the entire roadmap from the beginning to check its structure and logic";

        let (recommended, options) = if count == 0 {
            (
                Strategy::Refinement,
                vec![option(
                    Strategy::Refinement,
                    "Refinement",
                    "The roadmap looks solid; refine details and look for missing steps".into(),
                    true,
                )],
            )
        } else if count <= self.config.targeted_max_regions {
            (
                Strategy::Targeted,
                vec![
                    option(
                        Strategy::Targeted,
                        "Targeted",
                        format!("Focus on the {count} area(s) that drew negative feedback"),
                        true,
                    ),
                    option(
                        Strategy::Holistic,
                        "Holistic review",
                        holistic_description.into(),
                        false,
                    ),
                ],
            )
        } else {
            (
                Strategy::Holistic,
                vec![
                    option(
                        Strategy::Holistic,
                        "Holistic review",
                        holistic_description.into(),
                        true,
                    ),
                    option(
                        Strategy::TargetedOnWorst,
                        "Focus on worst areas",
                        format!("Address only the most problematic area of {count} identified"),
                        false,
                    ),
                ],
            )
        };

        StrategyRecommendation {
            problematic_regions: count,
            region_ids,
            recommended,
            options,
        }
    }

    /// Preparation -> Active.
    pub fn begin(&mut self) -> Result<()> {
        match self.state {
            SelectorState::Preparation => {
                self.transition(SelectorState::Active);
                Ok(())
            }
            other => Err(invalid("begin", other)),
        }
    }

    /// Recompute from fresh group health.
    ///
    /// From `Delegated` the selector returns to `AwaitingChoice` only when the
    /// recommended strategy changed; otherwise the delegation stands.
    pub fn evaluate(&mut self, report: &GroupReport) -> Result<&StrategyRecommendation> {
        let recommendation = self.recommend(report);
        match self.state {
            SelectorState::Active | SelectorState::AwaitingChoice => {
                self.transition(SelectorState::AwaitingChoice);
            }
            SelectorState::Delegated(current) => {
                let changed = self
                    .latest
                    .as_ref()
                    .map_or(true, |prev| prev.recommended != recommendation.recommended);
                if changed {
                    info!(
                        from = %current,
                        recommended = %recommendation.recommended,
                        "Recommended strategy changed mid-session"
                    );
                    self.delegation = None;
                    self.transition(SelectorState::AwaitingChoice);
                } else {
                    debug!(strategy = %current, "Delegation unchanged");
                }
            }
            other => return Err(invalid("evaluate", other)),
        }
        Ok(self.latest.insert(recommendation))
    }

    /// AwaitingChoice -> Delegated. The strategy must be one of the offered options.
    pub fn choose(&mut self, strategy: Strategy) -> Result<Delegation> {
        if self.state != SelectorState::AwaitingChoice {
            return Err(invalid("choose", self.state));
        }
        let latest = self
            .latest
            .as_ref()
            .ok_or_else(|| EngineError::InvalidTransition("no recommendation to choose from".into()))?;
        if !latest.offers(strategy) {
            return Err(EngineError::InvalidTransition(format!(
                "strategy '{strategy}' was not offered"
            )));
        }

        let (target, scope) = match strategy {
            Strategy::Holistic => (DelegationTarget::CausalityVerification, Vec::new()),
            Strategy::Targeted => (DelegationTarget::FocusedRefinement, latest.region_ids.clone()),
            Strategy::TargetedOnWorst => (
                DelegationTarget::FocusedRefinement,
                latest.region_ids.iter().take(1).cloned().collect(),
            ),
            Strategy::Refinement => (DelegationTarget::GapFilling, Vec::new()),
        };
        let delegation = Delegation {
            strategy,
            target,
            scope,
        };
        info!(strategy = %strategy, target = ?target, "Strategy chosen");
        self.delegation = Some(delegation.clone());
        self.transition(SelectorState::Delegated(strategy));
        Ok(delegation)
    }

    /// Any state -> Complete.
    pub fn complete(&mut self) -> Result<()> {
        if self.state == SelectorState::Complete {
            return Err(invalid("complete", self.state));
        }
        self.transition(SelectorState::Complete);
        Ok(())
    }

    fn transition(&mut self, next: SelectorState) {
        if self.state != next {
            debug!(from = self.state.as_str(), to = next.as_str(), "Strategy selector transition");
        }
        self.state = next;
    }
}

fn invalid(op: &str, state: SelectorState) -> EngineError {
    EngineError::InvalidTransition(format!("cannot {op} from {}", state.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::{
        GroupClassification, GroupScore, GroupSignals, GroupSummary, OverallHealth,
        RemovalAssessment,
    };

    fn report(classes: &[GroupClassification]) -> GroupReport {
        let groups: Vec<GroupScore> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| GroupScore {
                id: format!("group_{}", i + 1),
                milestone_ids: vec![format!("m{i}")],
                signals: GroupSignals::default(),
                thumbs_down_ratio: 0.0,
                classification: *c,
                removal: RemovalAssessment::default(),
                focus_priority: 0.0,
            })
            .collect();
        GroupReport {
            summary: GroupSummary {
                total_groups: groups.len(),
                removal_candidates: 0,
                high_priority_groups: 0,
                removal_rate: 0.0,
                overall_health: OverallHealth::Fair,
            },
            groups,
            focus: None,
        }
    }

    use GroupClassification::*;

    #[test]
    fn test_recommendation_by_region_count() {
        let s = StrategySelector::new();
        let none = s.recommend(&report(&[Good, Excellent]));
        assert_eq!(none.recommended, Strategy::Refinement);
        assert_eq!(none.options.len(), 1);

        let few = s.recommend(&report(&[NeedsAttention, Good, Critical]));
        assert_eq!(few.recommended, Strategy::Targeted);
        assert!(few.offers(Strategy::Holistic));
        assert_eq!(few.region_ids, vec!["group_1", "group_3"]);

        let many = s.recommend(&report(&[Problematic, Critical, NeedsAttention]));
        assert_eq!(many.recommended, Strategy::Holistic);
        assert!(many.offers(Strategy::TargetedOnWorst));
    }

    #[test]
    fn test_full_lifecycle() {
        let mut s = StrategySelector::new();
        assert!(matches!(
            s.evaluate(&report(&[Good])),
            Err(EngineError::InvalidTransition(_))
        ));
        s.begin().unwrap();
        s.evaluate(&report(&[Critical])).unwrap();
        assert_eq!(s.state(), SelectorState::AwaitingChoice);

        let delegation = s.choose(Strategy::Targeted).unwrap();
        assert_eq!(delegation.target, DelegationTarget::FocusedRefinement);
        assert_eq!(delegation.scope, vec!["group_1"]);
        assert_eq!(s.state(), SelectorState::Delegated(Strategy::Targeted));

        s.complete().unwrap();
        assert_eq!(s.state(), SelectorState::Complete);
        assert!(s.complete().is_err());
        assert!(s.begin().is_err());
    }

    #[test]
    fn test_choice_must_be_offered() {
        let mut s = StrategySelector::new();
        s.begin().unwrap();
        assert!(s.choose(Strategy::Holistic).is_err());
        s.evaluate(&report(&[Good])).unwrap();
        assert!(matches!(
            s.choose(Strategy::Holistic),
            Err(EngineError::InvalidTransition(_))
        ));
        let d = s.choose(Strategy::Refinement).unwrap();
        assert_eq!(d.target, DelegationTarget::GapFilling);
    }

    #[test]
    fn test_mid_session_change_reopens_choice() {
        let mut s = StrategySelector::new();
        s.begin().unwrap();
        s.evaluate(&report(&[Problematic, Critical, NeedsAttention])).unwrap();
        let d = s.choose(Strategy::TargetedOnWorst).unwrap();
        assert_eq!(d.scope, vec!["group_1"]);

        // still holistic: delegation stands
        s.evaluate(&report(&[Problematic, Critical, Critical, Good])).unwrap();
        assert_eq!(s.state(), SelectorState::Delegated(Strategy::TargetedOnWorst));

        // votes improved, only one region left
        let rec = s.evaluate(&report(&[Critical, Good, Good])).unwrap();
        assert_eq!(rec.recommended, Strategy::Targeted);
        assert_eq!(s.state(), SelectorState::AwaitingChoice);
        assert!(s.delegation().is_none());
    }
}
