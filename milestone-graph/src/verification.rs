//! Causal-structure verification.
//!
//! Combines structure analysis, network validation and consistency checks
//! into a single verdict with recommendations and a confidence score.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consistency::{ConsistencyChecker, Inconsistency};
use crate::matrix::AdjacencyView;
use crate::structure::{
    ConnectivityReport, CriticalPathReport, FlowReport, Severity, StructureAnalyzer,
    StructureReport,
};
use crate::types::Goal;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Relationships below this stored confidence are flagged for review.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;
/// Verified structures must score above this.
pub const VALID_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    RelationshipVerification,
    Connectivity,
    CycleResolution,
    InconsistencyResolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub priority: Severity,
    pub description: String,
    /// Milestone ids, or `prerequisite->dependent` for relationships
    pub affected: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct VerificationReport {
    pub goal_id: String,
    pub structure: StructureReport,
    pub connectivity: ConnectivityReport,
    pub flow: FlowReport,
    pub critical_paths: CriticalPathReport,
    pub inconsistencies: Vec<Inconsistency>,
    pub low_confidence_relationships: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub confidence_score: f64,
    pub is_valid: bool,
}

/// Runs every structural and consistency check for one goal.
#[derive(Debug, Clone, Default)]
pub struct StructureVerifier {
    analyzer: StructureAnalyzer,
    checker: ConsistencyChecker,
}

impl StructureVerifier {
    pub fn new(analyzer: StructureAnalyzer, checker: ConsistencyChecker) -> Self {
        Self { analyzer, checker }
    }

    pub fn analyzer(&self) -> &StructureAnalyzer {
        &self.analyzer
    }

    pub fn checker(&self) -> &ConsistencyChecker {
        &self.checker
    }

    /// Verify `goal` using a view already built from it.
    pub fn verify(&self, goal: &Goal, view: &AdjacencyView) -> VerificationReport {
        let structure = self.analyzer.analyze(view);
        let connectivity = self.analyzer.check_connectivity(view);
        let flow = self.analyzer.validate_causal_flow(view);
        let critical_paths = self.analyzer.find_critical_paths(view, 5);
        let inconsistencies = self.checker.check(goal);

        let relationships: Vec<_> = goal.causal_relationships().collect();
        let low_confidence_relationships: Vec<String> = relationships
            .iter()
            .filter(|r| r.confidence < LOW_CONFIDENCE_THRESHOLD)
            .map(|r| format!("{}->{}", r.prerequisite_id, r.dependent_id))
            .collect();

        let mut recommendations = Vec::new();
        if !low_confidence_relationships.is_empty() {
            recommendations.push(Recommendation {
                kind: RecommendationKind::RelationshipVerification,
                priority: Severity::High,
                description: "Review and strengthen low-confidence causal relationships".into(),
                affected: low_confidence_relationships.clone(),
            });
        }
        if !structure.isolated_nodes.is_empty() {
            recommendations.push(Recommendation {
                kind: RecommendationKind::Connectivity,
                priority: Severity::Medium,
                description: "Connect isolated milestones to the main causal network".into(),
                affected: structure.isolated_nodes.clone(),
            });
        }
        if !flow.is_acyclic {
            recommendations.push(Recommendation {
                kind: RecommendationKind::CycleResolution,
                priority: Severity::High,
                description: format!("Break {} circular dependencies", flow.cycles.len()),
                affected: flow.cycles.iter().flatten().cloned().collect(),
            });
        }
        for inconsistency in &inconsistencies {
            recommendations.push(Recommendation {
                kind: RecommendationKind::InconsistencyResolution,
                priority: inconsistency.severity,
                description: format!(
                    "Resolve {}: {}",
                    inconsistency.kind.as_str(),
                    inconsistency.description
                ),
                affected: inconsistency.elements.clone(),
            });
        }

        let confidence_score = confidence_score(
            low_confidence_relationships.len(),
            relationships.len(),
            structure.quality_score,
            &inconsistencies,
        );
        let is_valid = confidence_score > VALID_CONFIDENCE;

        info!(
            goal_id = %goal.id,
            confidence = confidence_score,
            inconsistencies = inconsistencies.len(),
            valid = is_valid,
            "Causal structure verified"
        );

        VerificationReport {
            goal_id: goal.id.clone(),
            structure,
            connectivity,
            flow,
            critical_paths,
            inconsistencies,
            low_confidence_relationships,
            recommendations,
            confidence_score,
            is_valid,
        }
    }
}

/// `1 - relationship penalty - network penalty - severe inconsistency penalty`, floored at 0.
pub fn confidence_score(
    low_confidence: usize,
    total_relationships: usize,
    quality: f64,
    inconsistencies: &[Inconsistency],
) -> f64 {
    let relationship_penalty = if total_relationships > 0 {
        low_confidence as f64 / total_relationships as f64 * 0.3
    } else {
        0.0
    };
    let network_penalty = (1.0 - quality) * 0.3;
    let severe = inconsistencies
        .iter()
        .filter(|i| i.severity >= Severity::High)
        .count();
    (1.0 - relationship_penalty - network_penalty - severe as f64 * 0.2).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EdgeSpec, RelationshipType};

    #[test]
    fn test_clean_chain_is_valid() {
        let mut goal = Goal::new("g", "Goal");
        let a = goal.add_milestone("A", 5, None, None).unwrap();
        let b = goal.add_milestone("B", 5, Some(&a), None).unwrap();
        goal.add_milestone("C", 5, Some(&b), None).unwrap();

        let view = AdjacencyView::build(&goal);
        let report = StructureVerifier::default().verify(&goal, &view);
        assert!(report.inconsistencies.is_empty());
        assert!(report.recommendations.is_empty());
        assert!(report.is_valid);
        assert_eq!(report.confidence_score, 1.0);
    }

    #[test]
    fn test_cycle_and_contradiction_lower_confidence() {
        let mut goal = Goal::new("g", "Goal");
        let a = goal.add_milestone("A", 5, None, None).unwrap();
        let b = goal.add_milestone("B", 5, Some(&a), Some(EdgeSpec::new(RelationshipType::Enables, 0.8)))
            .unwrap();
        goal.connect_milestones(&b, &a, Some(EdgeSpec::new(RelationshipType::Inhibitory, 0.8).with_confidence(0.3)))
            .unwrap();

        let view = AdjacencyView::build(&goal);
        let report = StructureVerifier::default().verify(&goal, &view);
        assert!(!report.flow.is_acyclic);
        assert_eq!(report.low_confidence_relationships.len(), 1);
        let kinds: Vec<_> = report.recommendations.iter().map(|r| r.kind).collect();
        assert!(kinds.contains(&RecommendationKind::RelationshipVerification));
        assert!(kinds.contains(&RecommendationKind::CycleResolution));
        assert!(kinds.contains(&RecommendationKind::InconsistencyResolution));
        assert!(!report.is_valid);
    }

    #[test]
    fn test_dense_dag_verifies_without_cycles() {
        let mut goal = Goal::new("g", "Goal");
        let ids: Vec<String> = (0..24)
            .map(|i| goal.add_milestone(&format!("Step {i}"), 5, None, None).unwrap())
            .collect();
        for (i, prerequisite) in ids.iter().enumerate() {
            for dependent in &ids[i + 1..] {
                goal.connect_milestones(prerequisite, dependent, None).unwrap();
            }
        }

        let view = AdjacencyView::build(&goal);
        let report = StructureVerifier::default().verify(&goal, &view);
        assert!(report.flow.is_acyclic);
        assert!(report.flow.cycles.is_empty());
        assert!(report
            .recommendations
            .iter()
            .all(|r| r.kind != RecommendationKind::CycleResolution));
        assert!(!report.critical_paths.approximate);
        assert!(report.critical_paths.longest_paths[0].nodes.len() >= ids.len());
    }

    #[test]
    fn test_confidence_score_floor() {
        assert_eq!(confidence_score(0, 0, 1.0, &[]), 1.0);
        assert!((confidence_score(1, 2, 0.5, &[]) - 0.7).abs() < 1e-9);
    }
}
