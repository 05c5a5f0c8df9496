//! Summary insights about a goal's causal structure.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Goal, RelationshipType};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Overall shape of the roadmap's dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ProgressionPattern {
    IndependentMilestones,
    SequentialProgression,
    FlexibleProgression,
    SynergisticProgression,
    ComplexInterdependent,
}

impl ProgressionPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IndependentMilestones => "independent_milestones",
            Self::SequentialProgression => "sequential_progression",
            Self::FlexibleProgression => "flexible_progression",
            Self::SynergisticProgression => "synergistic_progression",
            Self::ComplexInterdependent => "complex_interdependent",
        }
    }

    /// Classify from the types of every milestone-to-milestone dependency.
    pub fn classify(types: &[RelationshipType]) -> Self {
        if types.is_empty() {
            return Self::IndependentMilestones;
        }
        let prerequisites = types
            .iter()
            .filter(|t| **t == RelationshipType::Prerequisite)
            .count();
        if prerequisites as f64 > types.len() as f64 * 0.5 {
            Self::SequentialProgression
        } else if types
            .iter()
            .any(|t| matches!(t, RelationshipType::Enables | RelationshipType::Supports))
        {
            Self::FlexibleProgression
        } else if types.contains(&RelationshipType::MutualReinforcement) {
            Self::SynergisticProgression
        } else {
            Self::ComplexInterdependent
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct MilestoneRef {
    pub id: String,
    pub name: String,
    pub score: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct StrongRelationship {
    pub from: String,
    pub to: String,
    pub relationship_type: RelationshipType,
    pub strength: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CausalInsights {
    pub total_milestones: usize,
    /// Milestone-to-milestone relationships
    pub total_dependencies: usize,
    /// Dependencies per milestone
    pub complexity_score: f64,
    pub relationship_types: BTreeMap<RelationshipType, usize>,
    pub average_confidence: f64,
    pub average_strength: f64,
    pub average_score: f64,
    pub strongest_relationships: Vec<StrongRelationship>,
    /// Milestones with no predecessor other than the goal
    pub foundational_milestones: Vec<MilestoneRef>,
    /// Milestones nothing else depends on
    pub terminal_milestones: Vec<MilestoneRef>,
    pub progression_pattern: ProgressionPattern,
}

impl CausalInsights {
    pub fn from_goal(goal: &Goal) -> Self {
        let deps: Vec<_> = goal.causal_relationships().collect();
        let total_milestones = goal.len();
        let mean = |sum: f64, n: usize| if n > 0 { sum / n as f64 } else { 0.0 };

        let mut relationship_types = BTreeMap::new();
        for d in &deps {
            *relationship_types.entry(d.relationship_type).or_insert(0) += 1;
        }

        let mut strongest = deps.clone();
        strongest.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        let strongest_relationships = strongest
            .into_iter()
            .take(3)
            .map(|r| StrongRelationship {
                from: r.prerequisite_id.clone(),
                to: r.dependent_id.clone(),
                relationship_type: r.relationship_type,
                strength: r.strength,
            })
            .collect();

        let depended_on: BTreeSet<&str> = deps.iter().map(|d| d.prerequisite_id.as_str()).collect();
        let reference = |m: &crate::types::Milestone| MilestoneRef {
            id: m.id.clone(),
            name: m.name.clone(),
            score: m.score,
        };
        let ordered = goal.milestones_ordered();
        let foundational_milestones = ordered
            .iter()
            .filter(|m| m.predecessors.iter().all(|p| *p == goal.id))
            .map(|m| reference(*m))
            .collect();
        let terminal_milestones = ordered
            .iter()
            .filter(|m| !depended_on.contains(m.id.as_str()))
            .map(|m| reference(*m))
            .collect();

        let types: Vec<RelationshipType> = deps.iter().map(|d| d.relationship_type).collect();

        Self {
            total_milestones,
            total_dependencies: deps.len(),
            complexity_score: mean(deps.len() as f64, total_milestones),
            relationship_types,
            average_confidence: mean(deps.iter().map(|d| d.confidence).sum(), deps.len()),
            average_strength: mean(deps.iter().map(|d| d.strength).sum(), deps.len()),
            average_score: mean(
                goal.milestones.values().map(|m| m.score as f64).sum(),
                total_milestones,
            ),
            strongest_relationships,
            foundational_milestones,
            terminal_milestones,
            progression_pattern: ProgressionPattern::classify(&types),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EdgeSpec;

    #[test]
    fn test_progression_classification() {
        use RelationshipType::*;
        assert_eq!(ProgressionPattern::classify(&[]), ProgressionPattern::IndependentMilestones);
        assert_eq!(
            ProgressionPattern::classify(&[Prerequisite, Prerequisite, Enables]),
            ProgressionPattern::SequentialProgression
        );
        assert_eq!(
            ProgressionPattern::classify(&[Prerequisite, Supports]),
            ProgressionPattern::FlexibleProgression
        );
        assert_eq!(
            ProgressionPattern::classify(&[MutualReinforcement, Temporal]),
            ProgressionPattern::SynergisticProgression
        );
        assert_eq!(
            ProgressionPattern::classify(&[Temporal, Conditional]),
            ProgressionPattern::ComplexInterdependent
        );
    }

    #[test]
    fn test_insights_for_small_roadmap() {
        let mut goal = Goal::new("g", "Data scientist");
        let stats = goal.add_milestone("Statistics", 8, None, None).unwrap();
        let python = goal.add_milestone("Python", 6, None, None).unwrap();
        let ml = goal
            .add_milestone("Machine learning", 10, Some(&stats), Some(EdgeSpec::new(RelationshipType::Prerequisite, 0.9)))
            .unwrap();
        goal.connect_milestones(&python, &ml, Some(EdgeSpec::new(RelationshipType::Enables, 0.5)))
            .unwrap();

        let insights = CausalInsights::from_goal(&goal);
        assert_eq!(insights.total_milestones, 3);
        assert_eq!(insights.total_dependencies, 2);
        assert!((insights.complexity_score - 2.0 / 3.0).abs() < 1e-9);
        assert!((insights.average_score - 8.0).abs() < 1e-9);
        assert!((insights.average_strength - 0.7).abs() < 1e-9);
        assert_eq!(insights.strongest_relationships[0].from, stats);
        assert_eq!(insights.foundational_milestones.len(), 2);
        assert_eq!(insights.terminal_milestones.len(), 1);
        assert_eq!(insights.terminal_milestones[0].id, ml);
        assert_eq!(insights.progression_pattern, ProgressionPattern::FlexibleProgression);
    }

    #[test]
    fn test_empty_goal_insights() {
        let goal = Goal::new("g", "Empty");
        let insights = CausalInsights::from_goal(&goal);
        assert_eq!(insights.complexity_score, 0.0);
        assert_eq!(insights.average_confidence, 0.0);
        assert!(insights.strongest_relationships.is_empty());
    }
}
